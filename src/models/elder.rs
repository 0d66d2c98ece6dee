use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Elder {
    pub id: i64,
    pub center_id: i64,
    pub guardian_id: Option<i64>,
    pub name: String,
}

/// Everyone who follows an elder's reports: the guardian, the owner of the
/// elder's center and every protector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElderContacts {
    pub guardian_id: Option<i64>,
    pub center_owner_id: i64,
    pub protector_ids: Vec<i64>,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Guardian,
    Protector,
    Center,
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Guardian => "guardian",
            UserRole::Protector => "protector",
            UserRole::Center => "center",
            UserRole::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

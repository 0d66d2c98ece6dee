use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Comment row joined with its author's role.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommentRecord {
    pub id: i64,
    pub report_id: i64,
    pub user_id: i64,
    pub author_role: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body for POST /comments.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(required(message = "This field is required."))]
    pub report: Option<i64>,
    #[validate(
        required(message = "This field is required."),
        length(min = 1, max = 2000, message = "Message must be 1-2000 characters")
    )]
    pub message: Option<String>,
}

/// Query params for GET /comments.
#[derive(Debug, Default, Deserialize)]
pub struct CommentQuery {
    pub report: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentAuthor {
    pub id: i64,
    #[serde(rename = "type")]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub user: CommentAuthor,
    pub is_mine: bool,
}

impl CommentView {
    pub fn from_record(record: &CommentRecord, viewer_id: i64) -> Self {
        Self {
            id: record.id,
            message: record.message.clone(),
            created_at: record.created_at,
            user: CommentAuthor {
                id: record.user_id,
                role: record.author_role.clone(),
            },
            is_mine: record.user_id == viewer_id,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

use super::{comment::CommentView, health::HealthPayload, health::HealthView};
use crate::error::AppError;

/// Report row joined with its author and elder, as every read path needs them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportRecord {
    pub id: i64,
    pub user_id: i64,
    pub author_image: Option<String>,
    pub author_role: String,
    pub center_id: i64,
    pub elder_id: i64,
    pub elder_name: String,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An image together with one report it is linked to.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LinkedImage {
    pub report_id: i64,
    pub id: i64,
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ReadReceipt {
    pub report_id: i64,
    pub user_id: i64,
}

/// Body for POST /reports.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    #[validate(required(message = "This field is required."))]
    pub center: Option<i64>,
    /// Ignored for guardians, who always write about their own elder.
    pub elders: Option<Vec<i64>>,
    #[validate(length(max = 10000, message = "Content must not exceed 10000 characters"))]
    pub content: Option<String>,
    pub health: Option<HealthPayload>,
    /// Base64 payloads, optionally as `data:` URIs.
    pub images: Option<Vec<String>>,
}

/// Query params for GET /reports.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub center: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ReportQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateReportRequest {
    #[validate(length(max = 10000, message = "Content must not exceed 10000 characters"))]
    pub content: Option<String>,
}

/// PATCH /reports/{id} carries either a read confirmation or a field update.
#[derive(Debug)]
pub enum PatchReportRequest {
    MarkRead,
    Update(UpdateReportRequest),
}

impl PatchReportRequest {
    /// Any body with a `read_people` key is a read confirmation for the caller;
    /// the key's value is not consulted.
    pub fn from_body(body: Value) -> Result<Self, AppError> {
        let is_mark_read = body
            .as_object()
            .map(|o| o.contains_key("read_people"))
            .unwrap_or(false);
        if is_mark_read {
            return Ok(PatchReportRequest::MarkRead);
        }
        serde_json::from_value(body)
            .map(PatchReportRequest::Update)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON data: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportAuthor {
    pub id: i64,
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageView {
    pub id: i64,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportView {
    pub id: i64,
    pub user: ReportAuthor,
    pub center: i64,
    /// Elder display name.
    pub elder: String,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthView>,
    pub images: Vec<ImageView>,
    pub comments: Vec<CommentView>,
    pub is_read: bool,
    pub is_mine: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPage {
    pub count: i64,
    pub page: i64,
    pub per_page: i64,
    pub results: Vec<ReportView>,
}

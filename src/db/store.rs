use async_trait::async_trait;

use crate::models::{
    comment::CommentRecord,
    elder::{Elder, ElderContacts},
    health::{HealthPayload, ReportHealth},
    report::{LinkedImage, ReadReceipt, ReportRecord},
};

/// Which reports of a center a reader may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    /// Staff: every report of the center.
    Center,
    /// Reports about elders this user protects.
    ProtectedBy(i64),
    /// Reports about elders this user is guardian of.
    GuardedBy(i64),
}

#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub center_id: i64,
    pub scope: ReportScope,
    pub limit: i64,
    pub offset: i64,
}

/// Everything written by one POST /reports: one report per elder, the same
/// health values and the same stored images on each of them.
#[derive(Debug, Clone)]
pub struct NewReportBatch {
    pub author_id: i64,
    pub center_id: i64,
    pub elder_ids: Vec<i64>,
    pub content: Option<String>,
    pub health: Option<HealthPayload>,
    /// Storage paths of already written image files.
    pub image_files: Vec<String>,
}

#[async_trait]
pub trait ElderStore: Send + Sync {
    async fn find_elders(&self, ids: &[i64]) -> anyhow::Result<Vec<Elder>>;

    /// The elder a guardian looks after inside one center.
    async fn guardian_elder_in_center(
        &self,
        guardian_id: i64,
        center_id: i64,
    ) -> anyhow::Result<Option<Elder>>;

    async fn elder_contacts(&self, elder_id: i64) -> anyhow::Result<Option<ElderContacts>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Writes the whole batch atomically and returns the new report ids in elder order.
    async fn insert_batch(&self, batch: &NewReportBatch) -> anyhow::Result<Vec<i64>>;

    /// One page of reports, newest first, plus the total matching count.
    async fn list_reports(&self, filter: &ReportFilter)
        -> anyhow::Result<(Vec<ReportRecord>, i64)>;

    async fn find_report(&self, id: i64) -> anyhow::Result<Option<ReportRecord>>;

    async fn health_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<ReportHealth>>;

    async fn images_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<LinkedImage>>;

    async fn readers_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<ReadReceipt>>;

    /// Adds the user to the report's read set. Adding twice is a no-op.
    async fn mark_read(&self, report_id: i64, user_id: i64) -> anyhow::Result<()>;

    async fn update_content(&self, report_id: i64, content: Option<&str>)
        -> anyhow::Result<bool>;

    /// Deletes the report with its health row, comments, read receipts and
    /// image links. Images left without any report are deleted too and their
    /// storage paths returned. `None` when the report does not exist.
    async fn delete_report(&self, report_id: i64) -> anyhow::Result<Option<Vec<String>>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert_comment(
        &self,
        user_id: i64,
        report_id: i64,
        message: &str,
    ) -> anyhow::Result<CommentRecord>;

    /// Oldest first, optionally restricted to one report.
    async fn list_comments(&self, report_id: Option<i64>) -> anyhow::Result<Vec<CommentRecord>>;

    async fn comments_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<CommentRecord>>;

    async fn find_comment(&self, id: i64) -> anyhow::Result<Option<CommentRecord>>;

    async fn delete_comment(&self, id: i64) -> anyhow::Result<bool>;
}

pub trait Store: ElderStore + ReportStore + CommentStore {}

impl<T: ElderStore + ReportStore + CommentStore> Store for T {}

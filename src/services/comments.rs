use validator::Validate;

use crate::{
    db::store::Store,
    error::{AppError, Result},
    models::{
        auth::AuthenticatedUser,
        comment::{CommentView, CreateCommentRequest},
    },
    services::notifications::{
        recipients_for, NotificationService, COMMENT_CREATED_TITLE, REPORT_DEEP_LINK,
    },
};

pub struct CommentService;

impl CommentService {
    pub async fn list(
        store: &dyn Store,
        user: &AuthenticatedUser,
        report_id: Option<i64>,
    ) -> Result<Vec<CommentView>> {
        let comments = store.list_comments(report_id).await?;
        Ok(comments
            .iter()
            .map(|c| CommentView::from_record(c, user.user_id))
            .collect())
    }

    /// Stores the comment and notifies the contacts of the report's elder.
    pub async fn create(
        store: &dyn Store,
        notifications: &NotificationService,
        author: &AuthenticatedUser,
        req: CreateCommentRequest,
    ) -> Result<CommentView> {
        req.validate()?;
        let (Some(report_id), Some(message)) = (req.report, req.message) else {
            return Err(AppError::invalid("report", "This field is required."));
        };

        let report = store.find_report(report_id).await?.ok_or_else(|| {
            AppError::invalid("report", format!("Invalid pk \"{}\" - object does not exist.", report_id))
        })?;

        let comment = store.insert_comment(author.user_id, report.id, &message).await?;

        let recipients = match store.elder_contacts(report.elder_id).await {
            Ok(Some(contacts)) => recipients_for(&contacts, author.user_id),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(report_id, "Recipient lookup failed: {:#}", e);
                Vec::new()
            }
        };
        tracing::info!(
            comment_id = comment.id,
            report_id,
            author_id = author.user_id,
            recipients = recipients.len(),
            "Comment created"
        );
        notifications.send(recipients, COMMENT_CREATED_TITLE, &comment.message, REPORT_DEEP_LINK, report_id);

        Ok(CommentView::from_record(&comment, author.user_id))
    }

    pub async fn delete(store: &dyn Store, comment_id: i64) -> Result<()> {
        if !store.delete_comment(comment_id).await? {
            return Err(AppError::NotFound(format!("Comment {} not found", comment_id)));
        }
        tracing::info!(comment_id, "Comment deleted");
        Ok(())
    }
}

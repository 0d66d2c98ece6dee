use std::collections::{HashMap, HashSet};

use validator::Validate;

use crate::{
    db::store::{NewReportBatch, ReportFilter, ReportScope, Store},
    error::{AppError, FieldErrors, Result},
    models::{
        auth::AuthenticatedUser,
        elder::Elder,
        report::{CreateReportRequest, ReportPage, ReportQuery, ReportView, UpdateReportRequest},
        user::UserRole,
    },
    services::{
        images::ImageStorage,
        notifications::{recipients_for, NotificationService, REPORT_CREATED_TITLE, REPORT_DEEP_LINK},
        presenter::{present_report, present_reports},
    },
};

pub struct ReportService;

impl ReportService {
    pub async fn list(
        store: &dyn Store,
        images: &ImageStorage,
        user: &AuthenticatedUser,
        query: &ReportQuery,
    ) -> Result<ReportPage> {
        let center_id = query
            .center
            .ok_or_else(|| AppError::BadRequest("center query parameter is required".into()))?;

        let scope = match user.role {
            UserRole::Protector => ReportScope::ProtectedBy(user.user_id),
            UserRole::Guardian => ReportScope::GuardedBy(user.user_id),
            UserRole::Center | UserRole::Admin => ReportScope::Center,
        };
        let filter = ReportFilter {
            center_id,
            scope,
            limit: query.per_page(),
            offset: query.offset(),
        };

        let (records, count) = store.list_reports(&filter).await?;
        let results = present_reports(store, images, user.user_id, records).await?;

        Ok(ReportPage {
            count,
            page: query.page(),
            per_page: query.per_page(),
            results,
        })
    }

    /// Writes one report per target elder and notifies each elder's contacts.
    /// Returns the new report ids in elder order.
    pub async fn create(
        store: &dyn Store,
        images: &ImageStorage,
        notifications: &NotificationService,
        author: &AuthenticatedUser,
        req: CreateReportRequest,
    ) -> Result<Vec<i64>> {
        req.validate()?;
        let center_id = req
            .center
            .ok_or_else(|| AppError::invalid("center", "This field is required."))?;

        let mut errors = FieldErrors::new();

        let elders = if author.role == UserRole::Guardian {
            let elder = store
                .guardian_elder_in_center(author.user_id, center_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "No elder of this guardian in center {}",
                        center_id
                    ))
                })?;
            vec![elder]
        } else {
            Self::target_elders(store, center_id, req.elders.as_deref(), &mut errors).await?
        };

        let health = req.health.filter(|h| !h.is_empty());
        if let Some(health) = &health {
            errors.extend(health.code_errors());
        }

        let mut decoded = Vec::new();
        for (index, payload) in req.images.iter().flatten().enumerate() {
            match ImageStorage::decode(payload) {
                Ok(image) => decoded.push(image),
                Err(message) => errors
                    .entry("images".to_string())
                    .or_default()
                    .push(format!("{}: {}", index, message)),
            }
        }

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let mut image_files = Vec::with_capacity(decoded.len());
        for image in &decoded {
            match images.store(image).await {
                Ok(file) => image_files.push(file),
                Err(e) => {
                    images.remove(&image_files).await;
                    return Err(e.into());
                }
            }
        }

        let batch = NewReportBatch {
            author_id: author.user_id,
            center_id,
            elder_ids: elders.iter().map(|e| e.id).collect(),
            content: req.content,
            health,
            image_files,
        };
        let report_ids = match store.insert_batch(&batch).await {
            Ok(ids) => ids,
            Err(e) => {
                images.remove(&batch.image_files).await;
                return Err(e.into());
            }
        };

        let body = batch.content.as_deref().unwrap_or_default();
        for (&report_id, elder) in report_ids.iter().zip(&elders) {
            let recipients = match store.elder_contacts(elder.id).await {
                Ok(Some(contacts)) => recipients_for(&contacts, author.user_id),
                Ok(None) => Vec::new(),
                Err(e) => {
                    tracing::warn!(report_id, elder_id = elder.id, "Recipient lookup failed: {:#}", e);
                    continue;
                }
            };
            tracing::info!(
                report_id,
                elder_id = elder.id,
                author_id = author.user_id,
                recipients = recipients.len(),
                "Report created"
            );
            notifications.send(recipients, REPORT_CREATED_TITLE, body, REPORT_DEEP_LINK, report_id);
        }

        Ok(report_ids)
    }

    /// Resolves the requested elder ids, keeping request order and dropping
    /// repeats. Problems are collected under `elders`.
    async fn target_elders(
        store: &dyn Store,
        center_id: i64,
        requested: Option<&[i64]>,
        errors: &mut FieldErrors,
    ) -> Result<Vec<Elder>> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = requested
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if ids.is_empty() {
            errors.insert("elders".into(), vec!["This list may not be empty.".into()]);
            return Ok(Vec::new());
        }

        let mut found: HashMap<i64, Elder> = store
            .find_elders(&ids)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let mut elders = Vec::with_capacity(ids.len());
        for id in ids {
            match found.remove(&id) {
                Some(elder) if elder.center_id == center_id => elders.push(elder),
                Some(_) => errors
                    .entry("elders".into())
                    .or_default()
                    .push(format!("Elder {} does not belong to center {}.", id, center_id)),
                None => errors
                    .entry("elders".into())
                    .or_default()
                    .push(format!("Invalid pk \"{}\" - object does not exist.", id)),
            }
        }
        Ok(elders)
    }

    pub async fn mark_read(store: &dyn Store, user: &AuthenticatedUser, report_id: i64) -> Result<()> {
        if store.find_report(report_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Report {} not found", report_id)));
        }
        store.mark_read(report_id, user.user_id).await?;
        tracing::debug!(report_id, user_id = user.user_id, "Report marked read");
        Ok(())
    }

    pub async fn update(
        store: &dyn Store,
        images: &ImageStorage,
        user: &AuthenticatedUser,
        report_id: i64,
        req: UpdateReportRequest,
    ) -> Result<ReportView> {
        req.validate()?;
        if !store.update_content(report_id, req.content.as_deref()).await? {
            return Err(AppError::NotFound(format!("Report {} not found", report_id)));
        }
        let record = store
            .find_report(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", report_id)))?;
        Ok(present_report(store, images, user.user_id, record).await?)
    }

    pub async fn delete(store: &dyn Store, images: &ImageStorage, report_id: i64) -> Result<()> {
        let orphaned = store
            .delete_report(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", report_id)))?;
        images.remove(&orphaned).await;
        tracing::info!(report_id, removed_images = orphaned.len(), "Report deleted");
        Ok(())
    }
}

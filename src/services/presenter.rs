use std::collections::{HashMap, HashSet};

use crate::{
    db::store::Store,
    models::{
        comment::CommentView,
        health::HealthView,
        report::{ImageView, ReportAuthor, ReportRecord, ReportView},
    },
    services::images::ImageStorage,
};

/// Builds report views for one page. Nested rows are loaded with one query
/// per kind for the whole page, never per report.
pub async fn present_reports(
    store: &dyn Store,
    images: &ImageStorage,
    viewer_id: i64,
    records: Vec<ReportRecord>,
) -> anyhow::Result<Vec<ReportView>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

    let health: HashMap<i64, HealthView> = store
        .health_for(&ids)
        .await?
        .iter()
        .map(|h| (h.report_id, HealthView::from(h)))
        .collect();

    let mut linked: HashMap<i64, Vec<ImageView>> = HashMap::new();
    for image in store.images_for(&ids).await? {
        linked.entry(image.report_id).or_default().push(ImageView {
            id: image.id,
            file: images.url(&image.file),
        });
    }

    let mut comments: HashMap<i64, Vec<CommentView>> = HashMap::new();
    for comment in store.comments_for(&ids).await? {
        comments
            .entry(comment.report_id)
            .or_default()
            .push(CommentView::from_record(&comment, viewer_id));
    }

    let read_by_viewer: HashSet<i64> = store
        .readers_for(&ids)
        .await?
        .into_iter()
        .filter(|r| r.user_id == viewer_id)
        .map(|r| r.report_id)
        .collect();

    let views = records
        .into_iter()
        .map(|record| ReportView {
            id: record.id,
            user: ReportAuthor {
                id: record.user_id,
                image: record.author_image,
                role: record.author_role,
            },
            center: record.center_id,
            elder: record.elder_name,
            content: record.content,
            created_at: record.created_at,
            health: health.get(&record.id).cloned(),
            images: linked.remove(&record.id).unwrap_or_default(),
            comments: comments.remove(&record.id).unwrap_or_default(),
            is_read: read_by_viewer.contains(&record.id),
            is_mine: record.user_id == viewer_id,
        })
        .collect();

    Ok(views)
}

pub async fn present_report(
    store: &dyn Store,
    images: &ImageStorage,
    viewer_id: i64,
    record: ReportRecord,
) -> anyhow::Result<ReportView> {
    present_reports(store, images, viewer_id, vec![record])
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("report view missing after presentation"))
}

use async_trait::async_trait;
use sqlx::PgPool;

use super::store::{CommentStore, ElderStore, NewReportBatch, ReportFilter, ReportScope, ReportStore};
use crate::models::{
    comment::CommentRecord,
    elder::{Elder, ElderContacts},
    health::ReportHealth,
    report::{LinkedImage, ReadReceipt, ReportRecord},
};

/// Report columns joined with author and elder. Queries alias reports as `r`.
const REPORT_SELECT: &str = "SELECT r.id, r.user_id, u.image AS author_image, u.role AS author_role,
            r.center_id, r.elder_id, e.name AS elder_name, r.content, r.created_at, r.updated_at
     FROM reports r
     JOIN users u ON u.id = r.user_id
     JOIN elders e ON e.id = r.elder_id";

/// Visibility predicate driven by binds $2 (scope kind) and $3 (scoped user id).
const SCOPE_PREDICATE: &str = "CASE $2::TEXT
         WHEN 'protector' THEN r.elder_id IN (
             SELECT ep.elder_id FROM elder_protectors ep WHERE ep.user_id = $3)
         WHEN 'guardian' THEN e.guardian_id = $3
         ELSE TRUE
     END";

const COMMENT_SELECT: &str = "SELECT c.id, c.report_id, c.user_id, u.role AS author_role,
            c.message, c.created_at, c.updated_at
     FROM comments c
     JOIN users u ON u.id = c.user_id";

fn scope_binds(scope: ReportScope) -> (&'static str, i64) {
    match scope {
        ReportScope::Center => ("center", 0),
        ReportScope::ProtectedBy(user_id) => ("protector", user_id),
        ReportScope::GuardedBy(user_id) => ("guardian", user_id),
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ElderStore for PgStore {
    async fn find_elders(&self, ids: &[i64]) -> anyhow::Result<Vec<Elder>> {
        let elders = sqlx::query_as::<_, Elder>(
            "SELECT id, center_id, guardian_id, name FROM elders WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(elders)
    }

    async fn guardian_elder_in_center(
        &self,
        guardian_id: i64,
        center_id: i64,
    ) -> anyhow::Result<Option<Elder>> {
        let elder = sqlx::query_as::<_, Elder>(
            "SELECT id, center_id, guardian_id, name FROM elders
             WHERE guardian_id = $1 AND center_id = $2
             ORDER BY id
             LIMIT 1",
        )
        .bind(guardian_id)
        .bind(center_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(elder)
    }

    async fn elder_contacts(&self, elder_id: i64) -> anyhow::Result<Option<ElderContacts>> {
        let row: Option<(Option<i64>, i64)> = sqlx::query_as(
            "SELECT e.guardian_id, c.user_id
             FROM elders e
             JOIN centers c ON c.id = e.center_id
             WHERE e.id = $1",
        )
        .bind(elder_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((guardian_id, center_owner_id)) = row else {
            return Ok(None);
        };

        let protector_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM elder_protectors WHERE elder_id = $1 ORDER BY user_id",
        )
        .bind(elder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ElderContacts {
            guardian_id,
            center_owner_id,
            protector_ids,
        }))
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn insert_batch(&self, batch: &NewReportBatch) -> anyhow::Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut report_ids = Vec::with_capacity(batch.elder_ids.len());

        for elder_id in &batch.elder_ids {
            let report_id: i64 = sqlx::query_scalar(
                "INSERT INTO reports (user_id, center_id, elder_id, content)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id",
            )
            .bind(batch.author_id)
            .bind(batch.center_id)
            .bind(*elder_id)
            .bind(&batch.content)
            .fetch_one(&mut *tx)
            .await?;

            if let Some(health) = &batch.health {
                sqlx::query(
                    "INSERT INTO report_health
                         (report_id, mood, health, temperature, meal, feces, sleep)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(report_id)
                .bind(health.mood)
                .bind(health.health)
                .bind(health.temperature)
                .bind(health.meal)
                .bind(health.feces)
                .bind(health.sleep)
                .execute(&mut *tx)
                .await?;
            }

            report_ids.push(report_id);
        }

        for file in &batch.image_files {
            let image_id: i64 =
                sqlx::query_scalar("INSERT INTO report_images (file) VALUES ($1) RETURNING id")
                    .bind(file)
                    .fetch_one(&mut *tx)
                    .await?;

            sqlx::query(
                "INSERT INTO report_image_links (report_id, image_id)
                 SELECT UNNEST($1::BIGINT[]), $2",
            )
            .bind(&report_ids)
            .bind(image_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(report_ids)
    }

    async fn list_reports(
        &self,
        filter: &ReportFilter,
    ) -> anyhow::Result<(Vec<ReportRecord>, i64)> {
        let (kind, scoped_user) = scope_binds(filter.scope);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM reports r
             JOIN elders e ON e.id = r.elder_id
             WHERE r.center_id = $1 AND {SCOPE_PREDICATE}"
        ))
        .bind(filter.center_id)
        .bind(kind)
        .bind(scoped_user)
        .fetch_one(&self.pool)
        .await?;

        let reports = sqlx::query_as::<_, ReportRecord>(&format!(
            "{REPORT_SELECT}
             WHERE r.center_id = $1 AND {SCOPE_PREDICATE}
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.center_id)
        .bind(kind)
        .bind(scoped_user)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((reports, total))
    }

    async fn find_report(&self, id: i64) -> anyhow::Result<Option<ReportRecord>> {
        let report = sqlx::query_as::<_, ReportRecord>(&format!("{REPORT_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(report)
    }

    async fn health_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<ReportHealth>> {
        let rows = sqlx::query_as::<_, ReportHealth>(
            "SELECT report_id, mood, health, temperature, meal, feces, sleep
             FROM report_health
             WHERE report_id = ANY($1)",
        )
        .bind(report_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn images_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<LinkedImage>> {
        let rows = sqlx::query_as::<_, LinkedImage>(
            "SELECT l.report_id, i.id, i.file
             FROM report_image_links l
             JOIN report_images i ON i.id = l.image_id
             WHERE l.report_id = ANY($1)
             ORDER BY i.id",
        )
        .bind(report_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn readers_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<ReadReceipt>> {
        let rows = sqlx::query_as::<_, ReadReceipt>(
            "SELECT report_id, user_id FROM report_reads WHERE report_id = ANY($1)",
        )
        .bind(report_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_read(&self, report_id: i64, user_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO report_reads (report_id, user_id)
             VALUES ($1, $2)
             ON CONFLICT (report_id, user_id) DO NOTHING",
        )
        .bind(report_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_content(
        &self,
        report_id: i64,
        content: Option<&str>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE reports
             SET content = COALESCE($1, content),
                 updated_at = NOW()
             WHERE id = $2",
        )
        .bind(content)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_report(&self, report_id: i64) -> anyhow::Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let image_ids: Vec<i64> =
            sqlx::query_scalar("SELECT image_id FROM report_image_links WHERE report_id = $1")
                .bind(report_id)
                .fetch_all(&mut *tx)
                .await?;

        // Shared images stay locked until commit so a concurrent delete of
        // another report linking them sweeps after this one's links are gone.
        sqlx::query("SELECT id FROM report_images WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&image_ids)
            .execute(&mut *tx)
            .await?;

        // FK cascades remove health, comments, read receipts and image links.
        let deleted = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(report_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let orphaned_files: Vec<String> = sqlx::query_scalar(
            "DELETE FROM report_images i
             WHERE i.id = ANY($1)
               AND NOT EXISTS (SELECT 1 FROM report_image_links l WHERE l.image_id = i.id)
             RETURNING i.file",
        )
        .bind(&image_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(orphaned_files))
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn insert_comment(
        &self,
        user_id: i64,
        report_id: i64,
        message: &str,
    ) -> anyhow::Result<CommentRecord> {
        let comment = sqlx::query_as::<_, CommentRecord>(
            "WITH inserted AS (
                 INSERT INTO comments (user_id, report_id, message)
                 VALUES ($1, $2, $3)
                 RETURNING *
             )
             SELECT i.id, i.report_id, i.user_id, u.role AS author_role,
                    i.message, i.created_at, i.updated_at
             FROM inserted i
             JOIN users u ON u.id = i.user_id",
        )
        .bind(user_id)
        .bind(report_id)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn list_comments(&self, report_id: Option<i64>) -> anyhow::Result<Vec<CommentRecord>> {
        let comments = sqlx::query_as::<_, CommentRecord>(&format!(
            "{COMMENT_SELECT}
             WHERE ($1::BIGINT IS NULL OR c.report_id = $1)
             ORDER BY c.created_at, c.id"
        ))
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn comments_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<CommentRecord>> {
        let comments = sqlx::query_as::<_, CommentRecord>(&format!(
            "{COMMENT_SELECT}
             WHERE c.report_id = ANY($1)
             ORDER BY c.created_at, c.id"
        ))
        .bind(report_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn find_comment(&self, id: i64) -> anyhow::Result<Option<CommentRecord>> {
        let comment =
            sqlx::query_as::<_, CommentRecord>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

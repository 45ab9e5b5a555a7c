//! Delivery history repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::HistoryDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// History repository trait.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn create_record(&self, record: &HistoryDbModel) -> Result<()>;
    async fn get_record(&self, id: &str) -> Result<HistoryDbModel>;
    /// Newest first, optionally restricted to one queue item.
    async fn list_records(
        &self,
        queue_item_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<HistoryDbModel>>;
    async fn mark_sent(&self, id: &str, sent_at: i64) -> Result<()>;
    async fn mark_failed(&self, id: &str, error: &str, now: i64) -> Result<()>;
    /// Bump the click counter of one CTA. Returns false when the index does not exist.
    async fn increment_click(&self, id: &str, cta_index: usize) -> Result<bool>;
}

/// SQLx implementation of HistoryRepository.
pub struct SqlxHistoryRepository {
    pool: SqlitePool,
}

impl SqlxHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqlxHistoryRepository {
    async fn create_record(&self, record: &HistoryDbModel) -> Result<()> {
        retry_on_sqlite_busy("create_history_record", || async {
            sqlx::query(
                r#"
                INSERT INTO notification_history
                    (id, queue_item_id, event_type, owner_organization_id, channel_id, channel_type,
                     recipient, status, subject, content, cta_clicks, retry_count, tracking_token_hash,
                     sent_at, error, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.queue_item_id)
            .bind(&record.event_type)
            .bind(&record.owner_organization_id)
            .bind(&record.channel_id)
            .bind(record.channel_type)
            .bind(&record.recipient)
            .bind(record.status)
            .bind(&record.subject)
            .bind(&record.content)
            .bind(&record.cta_clicks)
            .bind(record.retry_count)
            .bind(&record.tracking_token_hash)
            .bind(record.sent_at)
            .bind(&record.error)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_record(&self, id: &str) -> Result<HistoryDbModel> {
        sqlx::query_as::<_, HistoryDbModel>("SELECT * FROM notification_history WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("NotificationHistory", id))
    }

    async fn list_records(
        &self,
        queue_item_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<HistoryDbModel>> {
        let records = sqlx::query_as::<_, HistoryDbModel>(
            r#"
            SELECT * FROM notification_history
            WHERE (?1 IS NULL OR queue_item_id = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(queue_item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn mark_sent(&self, id: &str, sent_at: i64) -> Result<()> {
        retry_on_sqlite_busy("mark_history_sent", || async {
            sqlx::query(
                r#"
                UPDATE notification_history
                SET status = 'sent', sent_at = ?, error = NULL, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(sent_at)
            .bind(sent_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, id: &str, error: &str, now: i64) -> Result<()> {
        retry_on_sqlite_busy("mark_history_failed", || async {
            sqlx::query(
                r#"
                UPDATE notification_history
                SET status = 'failed', sent_at = NULL, error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn increment_click(&self, id: &str, cta_index: usize) -> Result<bool> {
        let path = format!("$[{cta_index}].clickCount");
        retry_on_sqlite_busy("increment_history_click", || async {
            let result = sqlx::query(
                r#"
                UPDATE notification_history
                SET cta_clicks = json_set(cta_clicks, ?1, json_extract(cta_clicks, ?1) + 1)
                WHERE id = ?2 AND json_extract(cta_clicks, ?1) IS NOT NULL
                "#,
            )
            .bind(&path)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }
}

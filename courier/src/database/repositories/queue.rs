//! Notification queue repository.
//!
//! Every state change is a single-row conditional update guarded by the
//! expected current status, so a terminal item can never be moved again and
//! two processors racing on the same item cannot both claim it.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{QueueItemDbModel, QueueStatus};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Queue repository trait.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn enqueue(&self, item: &QueueItemDbModel) -> Result<()>;
    async fn get_item(&self, id: &str) -> Result<QueueItemDbModel>;
    /// Newest first, optionally filtered by status.
    async fn list_items(
        &self,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> Result<Vec<QueueItemDbModel>>;
    /// Pending items whose retry time has come, oldest created first.
    async fn fetch_eligible(&self, now: i64, limit: i64) -> Result<Vec<QueueItemDbModel>>;
    /// `pending -> processing`. Returns false when the item was no longer pending.
    async fn claim(&self, id: &str, now: i64) -> Result<bool>;
    /// `processing -> completed`.
    async fn mark_completed(&self, id: &str, now: i64) -> Result<bool>;
    /// `processing -> pending` with a new retry count and eligibility time.
    async fn schedule_retry(
        &self,
        id: &str,
        retry_count: i32,
        next_retry_at: i64,
        error: &str,
        now: i64,
    ) -> Result<bool>;
    /// `processing -> failed`.
    async fn mark_failed(&self, id: &str, error: &str, now: i64) -> Result<bool>;
    /// Reset `processing` items last touched before `stale_before` to `pending`.
    async fn reclaim_stale(&self, stale_before: i64, now: i64) -> Result<u64>;
}

/// SQLx implementation of QueueRepository.
pub struct SqlxQueueRepository {
    pool: SqlitePool,
}

impl SqlxQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        op_name: &'static str,
        id: &str,
        from: QueueStatus,
        to: QueueStatus,
        now: i64,
    ) -> Result<bool> {
        retry_on_sqlite_busy(op_name, || async {
            let result = sqlx::query(
                "UPDATE notification_queue SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(to)
            .bind(now)
            .bind(id)
            .bind(from)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }
}

#[async_trait]
impl QueueRepository for SqlxQueueRepository {
    async fn enqueue(&self, item: &QueueItemDbModel) -> Result<()> {
        if item.status != QueueStatus::Pending {
            return Err(Error::InvalidStateTransition {
                from: "new".to_string(),
                to: item.status.to_string(),
            });
        }

        retry_on_sqlite_busy("enqueue", || async {
            sqlx::query(
                r#"
                INSERT INTO notification_queue
                    (id, event_type, owner_organization_id, channel_id, recipient, payload, status,
                     retry_count, max_retries, next_retry_at, error, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.event_type)
            .bind(&item.owner_organization_id)
            .bind(&item.channel_id)
            .bind(&item.recipient)
            .bind(&item.payload)
            .bind(item.status)
            .bind(item.retry_count)
            .bind(item.max_retries)
            .bind(item.next_retry_at)
            .bind(&item.error)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_item(&self, id: &str) -> Result<QueueItemDbModel> {
        sqlx::query_as::<_, QueueItemDbModel>("SELECT * FROM notification_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("QueueItem", id))
    }

    async fn list_items(
        &self,
        status: Option<QueueStatus>,
        limit: i64,
    ) -> Result<Vec<QueueItemDbModel>> {
        let items = sqlx::query_as::<_, QueueItemDbModel>(
            r#"
            SELECT * FROM notification_queue
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn fetch_eligible(&self, now: i64, limit: i64) -> Result<Vec<QueueItemDbModel>> {
        let items = sqlx::query_as::<_, QueueItemDbModel>(
            r#"
            SELECT * FROM notification_queue
            WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?)
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn claim(&self, id: &str, now: i64) -> Result<bool> {
        self.transition("claim_queue_item", id, QueueStatus::Pending, QueueStatus::Processing, now)
            .await
    }

    async fn mark_completed(&self, id: &str, now: i64) -> Result<bool> {
        self.transition(
            "complete_queue_item",
            id,
            QueueStatus::Processing,
            QueueStatus::Completed,
            now,
        )
        .await
    }

    async fn schedule_retry(
        &self,
        id: &str,
        retry_count: i32,
        next_retry_at: i64,
        error: &str,
        now: i64,
    ) -> Result<bool> {
        retry_on_sqlite_busy("schedule_queue_retry", || async {
            let result = sqlx::query(
                r#"
                UPDATE notification_queue
                SET status = 'pending', retry_count = ?, next_retry_at = ?, error = ?, updated_at = ?
                WHERE id = ? AND status = 'processing'
                "#,
            )
            .bind(retry_count)
            .bind(next_retry_at)
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn mark_failed(&self, id: &str, error: &str, now: i64) -> Result<bool> {
        retry_on_sqlite_busy("fail_queue_item", || async {
            let result = sqlx::query(
                r#"
                UPDATE notification_queue
                SET status = 'failed', error = ?, updated_at = ?
                WHERE id = ? AND status = 'processing'
                "#,
            )
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn reclaim_stale(&self, stale_before: i64, now: i64) -> Result<u64> {
        retry_on_sqlite_busy("reclaim_stale_queue_items", || async {
            let result = sqlx::query(
                r#"
                UPDATE notification_queue
                SET status = 'pending', updated_at = ?
                WHERE status = 'processing' AND updated_at < ?
                "#,
            )
            .bind(now)
            .bind(stale_before)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    fn item(recipient: &str, created_at: i64) -> QueueItemDbModel {
        QueueItemDbModel::new(
            "e",
            "org",
            "ch",
            recipient,
            serde_json::json!({}),
            created_at,
        )
    }

    #[tokio::test]
    async fn test_fetch_eligible_orders_and_filters() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let newer = item("newer", 200);
        let older = item("older", 100);
        let mut later = item("later", 50);
        later.next_retry_at = Some(1_000);
        let mut due = item("due", 150);
        due.next_retry_at = Some(500);
        for i in [&newer, &older, &later, &due] {
            repo.enqueue(i).await.unwrap();
        }

        let eligible = repo.fetch_eligible(500, 10).await.unwrap();
        let recipients: Vec<_> = eligible.iter().map(|i| i.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["older", "due", "newer"]);

        let limited = repo.fetch_eligible(500, 1).await.unwrap();
        assert_eq!(limited[0].recipient, "older");

        assert!(repo.claim(&older.id, 500).await.unwrap());
        let eligible = repo.fetch_eligible(500, 10).await.unwrap();
        assert_eq!(eligible.len(), 2);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let i = item("r", 1);
        repo.enqueue(&i).await.unwrap();

        assert!(repo.claim(&i.id, 2).await.unwrap());
        assert!(!repo.claim(&i.id, 3).await.unwrap());
        assert_eq!(
            repo.get_item(&i.id).await.unwrap().status,
            QueueStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_retry_then_fail() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let i = item("r", 1);
        repo.enqueue(&i).await.unwrap();

        repo.claim(&i.id, 10).await.unwrap();
        assert!(repo.schedule_retry(&i.id, 1, 12, "boom", 10).await.unwrap());
        let loaded = repo.get_item(&i.id).await.unwrap();
        assert_eq!(loaded.status, QueueStatus::Pending);
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.next_retry_at, Some(12));
        assert_eq!(loaded.error.as_deref(), Some("boom"));

        repo.claim(&i.id, 12).await.unwrap();
        assert!(repo.mark_failed(&i.id, "still boom", 12).await.unwrap());
        let loaded = repo.get_item(&i.id).await.unwrap();
        assert_eq!(loaded.status, QueueStatus::Failed);
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.error.as_deref(), Some("still boom"));
    }

    #[tokio::test]
    async fn test_terminal_items_do_not_move() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let i = item("r", 1);
        repo.enqueue(&i).await.unwrap();
        repo.claim(&i.id, 2).await.unwrap();
        assert!(repo.mark_completed(&i.id, 3).await.unwrap());

        assert!(!repo.claim(&i.id, 4).await.unwrap());
        assert!(!repo.mark_failed(&i.id, "late", 4).await.unwrap());
        assert!(!repo.schedule_retry(&i.id, 1, 9, "late", 4).await.unwrap());
        assert_eq!(repo.reclaim_stale(100, 100).await.unwrap(), 0);

        let loaded = repo.get_item(&i.id).await.unwrap();
        assert_eq!(loaded.status, QueueStatus::Completed);
        assert_eq!(loaded.retry_count, 0);
        assert_eq!(loaded.error, None);
    }

    #[tokio::test]
    async fn test_reclaim_stale() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let stale = item("stale", 1);
        let fresh = item("fresh", 1);
        repo.enqueue(&stale).await.unwrap();
        repo.enqueue(&fresh).await.unwrap();
        repo.claim(&stale.id, 10).await.unwrap();
        repo.claim(&fresh.id, 100).await.unwrap();

        assert_eq!(repo.reclaim_stale(50, 120).await.unwrap(), 1);
        assert_eq!(
            repo.get_item(&stale.id).await.unwrap().status,
            QueueStatus::Pending
        );
        assert_eq!(
            repo.get_item(&fresh.id).await.unwrap().status,
            QueueStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_list_items_by_status() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let a = item("a", 1);
        let b = item("b", 2);
        repo.enqueue(&a).await.unwrap();
        repo.enqueue(&b).await.unwrap();
        repo.claim(&a.id, 3).await.unwrap();

        let all = repo.list_items(None, 10).await.unwrap();
        assert_eq!(all[0].recipient, "b");
        assert_eq!(all.len(), 2);

        let processing = repo
            .list_items(Some(QueueStatus::Processing), 10)
            .await
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, a.id);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_non_pending() {
        let repo = SqlxQueueRepository::new(test_pool().await);
        let mut i = item("r", 1);
        i.status = QueueStatus::Completed;
        assert!(matches!(
            repo.enqueue(&i).await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }
}

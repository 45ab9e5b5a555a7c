//! Sender repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{ChannelType, SenderDbModel};
use crate::{Error, Result};

/// Sender repository trait.
#[async_trait]
pub trait SenderRepository: Send + Sync {
    async fn get_sender(&self, id: &str) -> Result<SenderDbModel>;
    async fn find_sender(&self, id: &str) -> Result<Option<SenderDbModel>>;
    async fn list_senders(&self) -> Result<Vec<SenderDbModel>>;
    /// First active sender of `channel_type` scoped exactly to
    /// `organization_id`, or to the global scope when `None`.
    async fn find_active_by_scope(
        &self,
        channel_type: ChannelType,
        organization_id: Option<&str>,
    ) -> Result<Option<SenderDbModel>>;
    async fn create_sender(&self, sender: &SenderDbModel) -> Result<()>;
}

/// SQLx implementation of SenderRepository.
pub struct SqlxSenderRepository {
    pool: SqlitePool,
}

impl SqlxSenderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SenderRepository for SqlxSenderRepository {
    async fn get_sender(&self, id: &str) -> Result<SenderDbModel> {
        self.find_sender(id)
            .await?
            .ok_or_else(|| Error::not_found("NotificationSender", id))
    }

    async fn find_sender(&self, id: &str) -> Result<Option<SenderDbModel>> {
        let sender =
            sqlx::query_as::<_, SenderDbModel>("SELECT * FROM notification_sender WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(sender)
    }

    async fn list_senders(&self) -> Result<Vec<SenderDbModel>> {
        let senders = sqlx::query_as::<_, SenderDbModel>(
            "SELECT * FROM notification_sender ORDER BY channel_type, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(senders)
    }

    async fn find_active_by_scope(
        &self,
        channel_type: ChannelType,
        organization_id: Option<&str>,
    ) -> Result<Option<SenderDbModel>> {
        // `IS` matches NULL against NULL, so one statement covers both scopes.
        let sender = sqlx::query_as::<_, SenderDbModel>(
            r#"
            SELECT * FROM notification_sender
            WHERE channel_type = ? AND organization_id IS ? AND is_active = 1
            ORDER BY created_at, rowid
            LIMIT 1
            "#,
        )
        .bind(channel_type)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sender)
    }

    async fn create_sender(&self, sender: &SenderDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_sender
                (id, channel_type, name, organization_id, is_active, credentials, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sender.id)
        .bind(sender.channel_type)
        .bind(&sender.name)
        .bind(&sender.organization_id)
        .bind(sender.is_active)
        .bind(&sender.credentials)
        .bind(sender.created_at)
        .bind(sender.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

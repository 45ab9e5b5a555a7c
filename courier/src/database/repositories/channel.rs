//! Notification channel repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ChannelDbModel;
use crate::{Error, Result};

/// Channel repository trait.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel>;
    async fn list_channels(&self) -> Result<Vec<ChannelDbModel>>;
    /// Active channels of one organization.
    async fn list_active_by_organization(&self, organization_id: &str)
    -> Result<Vec<ChannelDbModel>>;
    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()>;
    async fn delete_channel(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of ChannelRepository.
pub struct SqlxChannelRepository {
    pool: SqlitePool,
}

impl SqlxChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqlxChannelRepository {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel> {
        sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM notification_channel WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("NotificationChannel", id))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelDbModel>> {
        let channels = sqlx::query_as::<_, ChannelDbModel>(
            "SELECT * FROM notification_channel ORDER BY organization_id, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn list_active_by_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<ChannelDbModel>> {
        let channels = sqlx::query_as::<_, ChannelDbModel>(
            r#"
            SELECT * FROM notification_channel
            WHERE organization_id = ? AND is_active = 1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()> {
        if channel.settings.channel_type() != channel.channel_type {
            return Err(Error::validation(format!(
                "settings of type {} do not match channel type {}",
                channel.settings.channel_type(),
                channel.channel_type
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO notification_channel
                (id, organization_id, channel_type, name, is_active, sender_ids, settings, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.organization_id)
        .bind(channel.channel_type)
        .bind(&channel.name)
        .bind(channel.is_active)
        .bind(&channel.sender_ids)
        .bind(&channel.settings)
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_channel(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM notification_channel WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("NotificationChannel", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ChannelSettings, ChannelType};
    use crate::database::test_pool;

    fn email_channel(org: &str, recipients: &[&str]) -> ChannelDbModel {
        ChannelDbModel::new(
            org,
            "mail",
            ChannelSettings::Email {
                recipients: recipients.iter().map(|r| r.to_string()).collect(),
            },
            vec!["s1".into()],
        )
    }

    #[tokio::test]
    async fn test_channel_crud() {
        let repo = SqlxChannelRepository::new(test_pool().await);
        let channel = email_channel("org-a", &["a@x.io"]);
        repo.create_channel(&channel).await.unwrap();

        let loaded = repo.get_channel(&channel.id).await.unwrap();
        assert_eq!(loaded.channel_type, ChannelType::Email);
        assert_eq!(loaded.sender_ids.0, vec!["s1"]);
        assert_eq!(loaded.settings.0, channel.settings.0);

        repo.delete_channel(&channel.id).await.unwrap();
        assert!(matches!(
            repo.get_channel(&channel.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(repo.delete_channel(&channel.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_active_by_organization() {
        let repo = SqlxChannelRepository::new(test_pool().await);
        let active = email_channel("org-a", &["a@x.io"]);
        let mut inactive = email_channel("org-a", &["b@x.io"]);
        inactive.is_active = false;
        let elsewhere = email_channel("org-b", &["c@x.io"]);
        for c in [&active, &inactive, &elsewhere] {
            repo.create_channel(c).await.unwrap();
        }

        let found = repo.list_active_by_organization("org-a").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, active.id);
    }

    #[tokio::test]
    async fn test_rejects_mismatched_settings() {
        let repo = SqlxChannelRepository::new(test_pool().await);
        let mut channel = email_channel("org-a", &["a@x.io"]);
        channel.channel_type = ChannelType::Telegram;
        assert!(matches!(
            repo.create_channel(&channel).await,
            Err(Error::Validation(_))
        ));
    }
}

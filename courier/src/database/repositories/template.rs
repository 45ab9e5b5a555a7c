//! Template repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{ChannelType, TemplateDbModel};

/// Template repository trait.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Active template for the triple, scoped exactly to `organization_id`
    /// (global scope when `None`).
    async fn find_active(
        &self,
        event_type: &str,
        channel_type: ChannelType,
        organization_id: Option<&str>,
    ) -> Result<Option<TemplateDbModel>>;
    async fn list_templates(&self) -> Result<Vec<TemplateDbModel>>;
    async fn create_template(&self, template: &TemplateDbModel) -> Result<()>;
}

/// SQLx implementation of TemplateRepository.
pub struct SqlxTemplateRepository {
    pool: SqlitePool,
}

impl SqlxTemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for SqlxTemplateRepository {
    async fn find_active(
        &self,
        event_type: &str,
        channel_type: ChannelType,
        organization_id: Option<&str>,
    ) -> Result<Option<TemplateDbModel>> {
        let template = sqlx::query_as::<_, TemplateDbModel>(
            r#"
            SELECT * FROM notification_template
            WHERE event_type = ? AND channel_type = ? AND organization_id IS ? AND is_active = 1
            ORDER BY updated_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(event_type)
        .bind(channel_type)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn list_templates(&self) -> Result<Vec<TemplateDbModel>> {
        let templates = sqlx::query_as::<_, TemplateDbModel>(
            "SELECT * FROM notification_template ORDER BY event_type, channel_type, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn create_template(&self, template: &TemplateDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_template
                (id, event_type, channel_type, organization_id, name, is_active, subject, content,
                 variables, ctas, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.id)
        .bind(&template.event_type)
        .bind(template.channel_type)
        .bind(&template.organization_id)
        .bind(&template.name)
        .bind(template.is_active)
        .bind(&template.subject)
        .bind(&template.content)
        .bind(&template.variables)
        .bind(&template.ctas)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

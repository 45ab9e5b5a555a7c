//! Organization repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::OrganizationDbModel;
use crate::{Error, Result};

/// Read access to the organization tree.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn get_organization(&self, id: &str) -> Result<OrganizationDbModel>;
    async fn find_organization(&self, id: &str) -> Result<Option<OrganizationDbModel>>;
    async fn create_organization(&self, org: &OrganizationDbModel) -> Result<()>;
}

/// SQLx implementation of OrganizationRepository.
pub struct SqlxOrganizationRepository {
    pool: SqlitePool,
}

impl SqlxOrganizationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for SqlxOrganizationRepository {
    async fn get_organization(&self, id: &str) -> Result<OrganizationDbModel> {
        self.find_organization(id)
            .await?
            .ok_or_else(|| Error::not_found("Organization", id))
    }

    async fn find_organization(&self, id: &str) -> Result<Option<OrganizationDbModel>> {
        let org = sqlx::query_as::<_, OrganizationDbModel>(
            "SELECT * FROM organization WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(org)
    }

    async fn create_organization(&self, org: &OrganizationDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organization (id, name, org_type, parent_id, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&org.id)
        .bind(&org.name)
        .bind(org.org_type)
        .bind(&org.parent_id)
        .bind(org.is_active)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! Organization tree model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_secs;

/// Organization database model.
///
/// The tree is owned by the administration side of the platform; the
/// notification pipeline only reads it to walk up to the owning company.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDbModel {
    pub id: String,
    pub name: String,
    pub org_type: OrgType,
    pub parent_id: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OrganizationDbModel {
    pub fn new(name: impl Into<String>, org_type: OrgType, parent_id: Option<String>) -> Self {
        let now = now_secs();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            org_type,
            parent_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Level of a node in the organization tree.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
    System,
    Group,
    Company,
    Department,
    Division,
    Team,
}

//! Message template model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use super::ChannelType;
use crate::database::time::now_secs;

/// Message template for one (event type, channel type) pair.
///
/// `organization_id = None` marks the global template used when no
/// organization-specific one exists.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDbModel {
    pub id: String,
    pub event_type: String,
    pub channel_type: ChannelType,
    pub organization_id: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub subject: String,
    pub content: String,
    /// Declared placeholder names; only these are substituted.
    #[schema(value_type = Vec<String>)]
    pub variables: Json<Vec<String>>,
    #[schema(value_type = Vec<Cta>)]
    pub ctas: Json<Vec<Cta>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TemplateDbModel {
    pub fn new(
        event_type: impl Into<String>,
        channel_type: ChannelType,
        organization_id: Option<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
        variables: Vec<String>,
    ) -> Self {
        let now = now_secs();
        let event_type = event_type.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("{event_type}/{channel_type}"),
            event_type,
            channel_type,
            organization_id,
            is_active: true,
            subject: subject.into(),
            content: content.into(),
            variables: Json(variables),
            ctas: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_ctas(mut self, ctas: Vec<Cta>) -> Self {
        self.ctas = Json(ctas);
        self
    }
}

/// Call-to-action link declared on a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Cta {
    pub label: String,
    /// Target URL, may contain placeholders.
    pub action: String,
    #[serde(default)]
    pub style: String,
}

impl Cta {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
            style: String::new(),
        }
    }
}

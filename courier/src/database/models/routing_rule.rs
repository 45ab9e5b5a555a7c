//! Routing rule model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use super::ChannelType;
use crate::database::time::now_secs;

/// Maps one event type to the organizations that should be notified.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRuleDbModel {
    pub id: String,
    pub event_type: String,
    #[schema(value_type = Vec<String>)]
    pub organization_ids: Json<Vec<String>>,
    /// Optional restriction on the channel types used within the organizations.
    #[schema(value_type = Option<Vec<ChannelType>>)]
    pub channel_types: Option<Json<Vec<ChannelType>>>,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_system: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RoutingRuleDbModel {
    pub fn new(
        event_type: impl Into<String>,
        organization_ids: Vec<String>,
        channel_types: Option<Vec<ChannelType>>,
    ) -> Self {
        let now = now_secs();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            organization_ids: Json(organization_ids),
            channel_types: channel_types.map(Json),
            description: None,
            is_active: true,
            is_system: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the rule lets channels of `channel_type` through.
    ///
    /// A missing or empty restriction admits every type.
    pub fn admits(&self, channel_type: ChannelType) -> bool {
        match &self.channel_types {
            Some(types) if !types.is_empty() => types.contains(&channel_type),
            _ => true,
        }
    }
}

//! Queue item model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Default number of queue-level retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Durable work item: one delivery of one event to one recipient.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemDbModel {
    pub id: String,
    pub event_type: String,
    pub owner_organization_id: String,
    pub channel_id: String,
    pub recipient: String,
    #[schema(value_type = Object)]
    pub payload: Json<serde_json::Value>,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Unix seconds before which the item is not eligible.
    pub next_retry_at: Option<i64>,
    /// Last failure message.
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QueueItemDbModel {
    pub fn new(
        event_type: impl Into<String>,
        owner_organization_id: impl Into<String>,
        channel_id: impl Into<String>,
        recipient: impl Into<String>,
        payload: serde_json::Value,
        now: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            owner_organization_id: owner_organization_id.into(),
            channel_id: channel_id.into(),
            recipient: recipient.into(),
            payload: Json(payload),
            status: QueueStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Queue item status values.
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
pub enum QueueStatus {
    /// Waiting for its first attempt or a scheduled retry.
    Pending,
    /// Claimed by a processor.
    Processing,
    /// Delivered.
    Completed,
    /// Retries exhausted.
    Failed,
}

impl QueueStatus {
    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

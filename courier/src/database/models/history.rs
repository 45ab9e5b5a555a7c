//! Delivery history model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use super::{ChannelType, QueueItemDbModel};

/// Audit record of one delivery attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDbModel {
    pub id: String,
    pub queue_item_id: String,
    pub event_type: String,
    pub owner_organization_id: String,
    pub channel_id: String,
    pub channel_type: ChannelType,
    pub recipient: String,
    pub status: HistoryStatus,
    pub subject: String,
    pub content: String,
    #[schema(value_type = Vec<CtaClick>)]
    pub cta_clicks: Json<Vec<CtaClick>>,
    pub retry_count: i32,
    /// SHA-256 of the click-tracking token. Never leaves the database layer.
    #[serde(skip)]
    pub tracking_token_hash: String,
    pub sent_at: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl HistoryDbModel {
    /// Pending record for an attempt on `item`, created before the send.
    pub fn pending(
        item: &QueueItemDbModel,
        channel_type: ChannelType,
        subject: impl Into<String>,
        content: impl Into<String>,
        ctas: impl IntoIterator<Item = (String, String)>,
        tracking_token_hash: impl Into<String>,
        now: i64,
    ) -> Self {
        let cta_clicks = ctas
            .into_iter()
            .enumerate()
            .map(|(cta_index, (label, url))| CtaClick {
                cta_index: cta_index as i64,
                label,
                url,
                click_count: 0,
            })
            .collect();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue_item_id: item.id.clone(),
            event_type: item.event_type.clone(),
            owner_organization_id: item.owner_organization_id.clone(),
            channel_id: item.channel_id.clone(),
            channel_type,
            recipient: item.recipient.clone(),
            status: HistoryStatus::Pending,
            subject: subject.into(),
            content: content.into(),
            cta_clicks: Json(cta_clicks),
            retry_count: item.retry_count,
            tracking_token_hash: tracking_token_hash.into(),
            sent_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Click counter for one CTA of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CtaClick {
    pub cta_index: i64,
    pub label: String,
    /// Rendered target before tracking; the redirect only goes here.
    #[serde(default)]
    pub url: String,
    pub click_count: i64,
}

/// History record status values.
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
pub enum HistoryStatus {
    Pending,
    Sent,
    Failed,
}

//! Notification channel models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::database::time::now_secs;

/// Notification channel database model.
///
/// One channel is one configured delivery target belonging to exactly one
/// organization. The recipient list lives in `settings` and its shape
/// depends on the channel type.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDbModel {
    pub id: String,
    pub organization_id: String,
    pub channel_type: ChannelType,
    pub name: String,
    pub is_active: bool,
    /// Ordered sender preference list.
    #[schema(value_type = Vec<String>)]
    pub sender_ids: Json<Vec<String>>,
    #[schema(value_type = ChannelSettings)]
    pub settings: Json<ChannelSettings>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChannelDbModel {
    /// Create an active channel. The channel type follows the settings variant.
    pub fn new(
        organization_id: impl Into<String>,
        name: impl Into<String>,
        settings: ChannelSettings,
        sender_ids: Vec<String>,
    ) -> Self {
        let now = now_secs();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.into(),
            channel_type: settings.channel_type(),
            name: name.into(),
            is_active: true,
            sender_ids: Json(sender_ids),
            settings: Json(settings),
            created_at: now,
            updated_at: now,
        }
    }

    /// Concrete recipient addresses for this channel.
    ///
    /// Email yields its recipient list, telegram its chat ids and webhook a
    /// single-element list holding the URL. Blank entries are dropped.
    pub fn recipients(&self) -> Vec<String> {
        let raw: Vec<&String> = match &self.settings.0 {
            ChannelSettings::Email { recipients } => recipients.iter().collect(),
            ChannelSettings::Telegram { chat_ids } => chat_ids.iter().collect(),
            ChannelSettings::Webhook { webhook_url, .. } => vec![webhook_url],
        };
        raw.into_iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Notification channel types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum ChannelType {
    Email,
    Telegram,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Telegram => "telegram",
            Self::Webhook => "webhook",
        }
    }

    /// Whether deliveries on this channel type need a resolved sender.
    pub fn requires_sender(&self) -> bool {
        !matches!(self, Self::Webhook)
    }
}

/// Channel-specific delivery settings, tagged by channel type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelSettings {
    Email {
        #[serde(default)]
        recipients: Vec<String>,
    },
    Telegram {
        #[serde(default, rename = "chatIds")]
        chat_ids: Vec<String>,
    },
    Webhook {
        #[serde(rename = "webhookUrl")]
        webhook_url: String,
        #[serde(default, rename = "webhookHeaders")]
        webhook_headers: BTreeMap<String, String>,
    },
}

impl ChannelSettings {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            Self::Email { .. } => ChannelType::Email,
            Self::Telegram { .. } => ChannelType::Telegram,
            Self::Webhook { .. } => ChannelType::Webhook,
        }
    }
}

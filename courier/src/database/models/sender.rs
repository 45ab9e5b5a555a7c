//! Sender (outbound credential) model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use super::ChannelType;
use crate::database::time::now_secs;

const REDACTED: &str = "********";

/// Outbound credential bound to a channel type and an organizational scope.
///
/// `organization_id = None` marks a global fallback sender.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SenderDbModel {
    pub id: String,
    pub channel_type: ChannelType,
    pub name: String,
    pub organization_id: Option<String>,
    pub is_active: bool,
    #[schema(value_type = SenderCredentials)]
    pub credentials: Json<SenderCredentials>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SenderDbModel {
    /// Create an active sender. The channel type follows the credential kind.
    pub fn new(
        name: impl Into<String>,
        organization_id: Option<String>,
        credentials: SenderCredentials,
    ) -> Self {
        let now = now_secs();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type: credentials.channel_type(),
            name: name.into(),
            organization_id,
            is_active: true,
            credentials: Json(credentials),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this sender may deliver on a channel of `channel_type`.
    pub fn usable_for(&self, channel_type: ChannelType) -> bool {
        self.is_active && self.channel_type == channel_type
    }

    /// Copy with secrets masked, for API responses.
    pub fn redacted(mut self) -> Self {
        match &mut self.credentials.0 {
            SenderCredentials::Smtp { smtp_password, .. } => *smtp_password = REDACTED.to_string(),
            SenderCredentials::TelegramBot { bot_token, .. } => *bot_token = REDACTED.to_string(),
        }
        self
    }
}

/// Channel-type specific credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SenderCredentials {
    Smtp {
        #[serde(rename = "smtpHost")]
        smtp_host: String,
        #[serde(rename = "smtpPort")]
        smtp_port: u16,
        #[serde(default, rename = "smtpUsername")]
        smtp_username: String,
        #[serde(default, rename = "smtpPassword")]
        smtp_password: String,
        #[serde(rename = "fromEmail")]
        from_email: String,
        #[serde(default, rename = "fromName", skip_serializing_if = "Option::is_none")]
        from_name: Option<String>,
        #[serde(default, rename = "useTls")]
        use_tls: bool,
    },
    TelegramBot {
        #[serde(rename = "botToken")]
        bot_token: String,
        #[serde(default, rename = "botUsername", skip_serializing_if = "Option::is_none")]
        bot_username: Option<String>,
    },
}

impl SenderCredentials {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            Self::Smtp { .. } => ChannelType::Email,
            Self::TelegramBot { .. } => ChannelType::Telegram,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> SenderCredentials {
        SenderCredentials::TelegramBot {
            bot_token: "123:abc".to_string(),
            bot_username: None,
        }
    }

    #[test]
    fn test_credentials_wire_format() {
        let creds: SenderCredentials = serde_json::from_str(
            r#"{"type":"smtp","smtpHost":"mail.x.io","smtpPort":587,"fromEmail":"no-reply@x.io","useTls":true}"#,
        )
        .unwrap();
        assert_eq!(creds.channel_type(), ChannelType::Email);

        let json = serde_json::to_value(bot()).unwrap();
        assert_eq!(json["type"], "telegramBot");
        assert_eq!(json["botToken"], "123:abc");
    }

    #[test]
    fn test_usable_for() {
        let mut sender = SenderDbModel::new("bot", None, bot());
        assert!(sender.usable_for(ChannelType::Telegram));
        assert!(!sender.usable_for(ChannelType::Email));

        sender.is_active = false;
        assert!(!sender.usable_for(ChannelType::Telegram));
    }

    #[test]
    fn test_redacted_masks_secret() {
        let sender = SenderDbModel::new("bot", Some("org".into()), bot()).redacted();
        assert_eq!(
            sender.credentials.0,
            SenderCredentials::TelegramBot {
                bot_token: REDACTED.to_string(),
                bot_username: None,
            }
        );
    }
}

//! Telegram Bot API transport.
//!
//! Sends messages via `POST /bot<token>/sendMessage`, one chat id per
//! delivery. CTAs become an inline keyboard of at most three buttons per row.
//! Each send is a single request: only HTTP 200 counts as delivered.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ChannelTransport, Delivery, TransportConfig, http_client};
use crate::database::models::{ChannelType, SenderCredentials};
use crate::notification::template::RenderedCta;
use crate::{Error, Result};

pub(super) const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const BUTTONS_PER_ROW: usize = 3;

/// Telegram Bot API transport.
pub struct TelegramTransport {
    client: Client,
    api_base: String,
}

impl TelegramTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            api_base: config.telegram_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn build_payload(chat_id: &str, content: &str, ctas: &[RenderedCta]) -> Value {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": truncate_message(content, TELEGRAM_MESSAGE_LIMIT),
        });

        let keyboard = inline_keyboard(ctas);
        if !keyboard.is_empty() {
            payload["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }
        payload
    }

    /// One `sendMessage` call. A 429 fails the attempt with the server's
    /// `retry_after` hint so sender fallback and queue backoff take over.
    async fn send_message(&self, bot_token: &str, payload: &Value) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, bot_token);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::transport("telegram", format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body: Value = response.json().await.unwrap_or_default();
            let retry_after = body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(Value::as_u64);
            warn!(?retry_after, "Telegram rate limited the bot");
            return Err(Error::transport(
                "telegram",
                match retry_after {
                    Some(secs) => format!("rate limited, retry after {secs}s"),
                    None => "rate limited".to_string(),
                },
            ));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::transport(
            "telegram",
            format!("telegram API returned status {status}: {body}"),
        ))
    }
}

#[async_trait]
impl ChannelTransport for TelegramTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    async fn send(&self, delivery: Delivery<'_>) -> Result<()> {
        let Some(SenderCredentials::TelegramBot { bot_token, .. }) =
            delivery.sender.map(|s| &s.credentials.0)
        else {
            return Err(Error::transport(
                "telegram",
                "delivery requires a telegram bot sender",
            ));
        };

        let payload = Self::build_payload(
            delivery.recipient,
            &delivery.rendered.content,
            &delivery.rendered.ctas,
        );
        self.send_message(bot_token, &payload).await?;

        debug!(history_id = delivery.history_id, "Telegram message sent");
        Ok(())
    }
}

/// Rows of URL buttons, at most [`BUTTONS_PER_ROW`] per row.
fn inline_keyboard(ctas: &[RenderedCta]) -> Vec<Vec<Value>> {
    ctas.chunks(BUTTONS_PER_ROW)
        .map(|row| {
            row.iter()
                .map(|cta| json!({ "text": cta.label, "url": cta.action }))
                .collect()
        })
        .collect()
}

/// Truncate a message to fit within the Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

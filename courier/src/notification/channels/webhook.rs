//! Generic webhook transport.
//!
//! POSTs `{content, timestamp, actions[]}` to the channel URL with the
//! channel's custom headers merged in. Any 2xx counts as delivered.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ChannelTransport, Delivery, http_client};
use crate::database::models::{ChannelSettings, ChannelType};
use crate::database::time::now_secs;
use crate::notification::template::RenderedTemplate;
use crate::{Error, Result};

#[derive(Debug, Serialize)]
struct WebhookAction<'a> {
    label: &'a str,
    url: &'a str,
    style: &'a str,
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    content: &'a str,
    timestamp: i64,
    actions: Vec<WebhookAction<'a>>,
}

/// Generic webhook transport.
pub struct WebhookTransport {
    client: Client,
}

impl WebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    fn build_body(rendered: &RenderedTemplate, timestamp: i64) -> WebhookBody<'_> {
        WebhookBody {
            content: &rendered.content,
            timestamp,
            actions: rendered
                .ctas
                .iter()
                .map(|cta| WebhookAction {
                    label: &cta.label,
                    url: &cta.action,
                    style: &cta.style,
                })
                .collect(),
        }
    }

    /// JSON content type plus the channel's custom headers, which win on conflict.
    fn build_headers(custom: &BTreeMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in custom {
            match (
                name.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid webhook header"),
            }
        }

        headers
    }
}

#[async_trait]
impl ChannelTransport for WebhookTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, delivery: Delivery<'_>) -> Result<()> {
        let ChannelSettings::Webhook {
            webhook_headers, ..
        } = &delivery.channel.settings.0
        else {
            return Err(Error::transport(
                "webhook",
                format!("channel {} has no webhook settings", delivery.channel.id),
            ));
        };

        let body = Self::build_body(delivery.rendered, now_secs());
        let response = self
            .client
            .post(delivery.recipient)
            .headers(Self::build_headers(webhook_headers))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport("webhook", format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(history_id = delivery.history_id, %status, "Webhook delivery rejected");
            return Err(Error::transport(
                "webhook",
                format!("webhook returned status {status}: {body}"),
            ));
        }

        debug!(history_id = delivery.history_id, "Webhook delivered");
        Ok(())
    }
}

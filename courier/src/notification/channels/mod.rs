//! Channel transports.
//!
//! One transport per channel type:
//! - Email (SMTP via `lettre`)
//! - Telegram Bot API
//! - Generic webhooks (HTTP POST)
//!
//! [`Transports`] holds one of each and picks by [`ChannelType`], so a new
//! channel type fails to compile until it has a transport.

mod email;
mod telegram;
mod webhook;

pub use email::EmailTransport;
pub use telegram::TelegramTransport;
pub use webhook::WebhookTransport;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::template::RenderedTemplate;
use crate::{Error, Result};
use crate::database::models::{ChannelDbModel, ChannelType, SenderDbModel};

/// Default client-side timeout for every outbound send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a transport needs for one send.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// `None` for channel types that need no credentials.
    pub sender: Option<&'a SenderDbModel>,
    pub channel: &'a ChannelDbModel,
    pub recipient: &'a str,
    /// Rendered message with CTA links already pointing at the tracker.
    pub rendered: &'a RenderedTemplate,
    pub history_id: &'a str,
}

impl<'a> Delivery<'a> {
    /// Same delivery through a different sender.
    pub fn with_sender(self, sender: &'a SenderDbModel) -> Self {
        Self {
            sender: Some(sender),
            ..self
        }
    }
}

/// Performs the network send for one channel type.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Channel type this transport serves.
    fn channel_type(&self) -> ChannelType;

    /// Send one message. Any error counts as a failed attempt.
    async fn send(&self, delivery: Delivery<'_>) -> Result<()>;
}

/// Transport settings shared by the HTTP-based transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    /// Telegram Bot API root, without trailing slash.
    pub telegram_api_base: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SEND_TIMEOUT,
            telegram_api_base: telegram::TELEGRAM_API_BASE.to_string(),
        }
    }
}

/// One transport per channel type.
#[derive(Clone)]
pub struct Transports {
    email: Arc<dyn ChannelTransport>,
    telegram: Arc<dyn ChannelTransport>,
    webhook: Arc<dyn ChannelTransport>,
}

impl Transports {
    pub fn new(
        email: Arc<dyn ChannelTransport>,
        telegram: Arc<dyn ChannelTransport>,
        webhook: Arc<dyn ChannelTransport>,
    ) -> Self {
        Self {
            email,
            telegram,
            webhook,
        }
    }

    /// The real network transports.
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        install_rustls_provider();
        Ok(Self::new(
            Arc::new(EmailTransport::new(config.timeout)),
            Arc::new(TelegramTransport::new(config)?),
            Arc::new(WebhookTransport::new(config.timeout)?),
        ))
    }

    pub fn get(&self, channel_type: ChannelType) -> &Arc<dyn ChannelTransport> {
        match channel_type {
            ChannelType::Email => &self.email,
            ChannelType::Telegram => &self.telegram,
            ChannelType::Webhook => &self.webhook,
        }
    }
}

/// Install the aws-lc rustls provider once per process.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Shared reqwest client with a fixed timeout.
///
/// Fails instead of falling back to a client without the timeout.
fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    install_rustls_provider();
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transports_dispatch_by_type() {
        let transports = Transports::from_config(&TransportConfig::default()).unwrap();
        for channel_type in [ChannelType::Email, ChannelType::Telegram, ChannelType::Webhook] {
            assert_eq!(transports.get(channel_type).channel_type(), channel_type);
        }
    }
}

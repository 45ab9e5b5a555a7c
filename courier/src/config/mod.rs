//! Environment-driven application configuration.
//!
//! Every value has a default; `.env` files are loaded by `main` through
//! `dotenvy` before [`AppConfig::from_env_or_default`] runs. Values that fail
//! to parse are logged and replaced by their default.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::notification::{ProcessorConfig, TransportConfig};

/// Default SQLite location, created on first start.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:courier.db?mode=rwc";

/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    pub api: ApiServerConfig,
    pub processor: ProcessorConfig,
    pub transport: TransportConfig,
    /// Run the queue processor in this process.
    pub processor_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let api = ApiServerConfig::default();
        let processor = ProcessorConfig {
            base_url: format!("http://localhost:{}", api.port),
            ..Default::default()
        };
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            api,
            processor,
            transport: TransportConfig::default(),
            processor_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Supported env vars:
    /// - `DATABASE_URL`, `LOG_DIR`
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `BASE_URL` (defaults to `http://localhost:<API_PORT>`)
    /// - `NOTIFY_POLL_INTERVAL_SECS`, `NOTIFY_BATCH_SIZE`,
    ///   `NOTIFY_SEND_TIMEOUT_SECS`, `NOTIFY_PROCESSING_TIMEOUT_SECS`,
    ///   `NOTIFY_PROCESSOR_ENABLED`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env_or_default`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut api = defaults.api;
        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            api.bind_address = bind_address;
        }
        api.port = parse_or(get("API_PORT"), "API_PORT", api.port);

        let base_url = get("BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", api.port));

        let processor = ProcessorConfig {
            poll_interval: Duration::from_secs(
                parse_or(
                    get("NOTIFY_POLL_INTERVAL_SECS"),
                    "NOTIFY_POLL_INTERVAL_SECS",
                    defaults.processor.poll_interval.as_secs(),
                )
                .max(1),
            ),
            batch_size: parse_or(
                get("NOTIFY_BATCH_SIZE"),
                "NOTIFY_BATCH_SIZE",
                defaults.processor.batch_size,
            )
            .max(1),
            processing_timeout: get("NOTIFY_PROCESSING_TIMEOUT_SECS")
                .and_then(|v| parse_value::<u64>(&v, "NOTIFY_PROCESSING_TIMEOUT_SECS"))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            base_url,
        };

        let transport = TransportConfig {
            timeout: Duration::from_secs(
                parse_or(
                    get("NOTIFY_SEND_TIMEOUT_SECS"),
                    "NOTIFY_SEND_TIMEOUT_SECS",
                    defaults.transport.timeout.as_secs(),
                )
                .max(1),
            ),
            ..defaults.transport
        };

        Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            log_dir: get("LOG_DIR").unwrap_or(defaults.log_dir),
            api,
            processor,
            transport,
            processor_enabled: parse_or(
                get("NOTIFY_PROCESSOR_ENABLED"),
                "NOTIFY_PROCESSOR_ENABLED",
                defaults.processor_enabled,
            ),
        }
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Option<T> {
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = raw, "Ignoring invalid configuration value");
            None
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    raw.and_then(|v| parse_value(&v, key)).unwrap_or(default)
}

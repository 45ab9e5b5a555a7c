//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use courier::database::models::ChannelType;
use courier::database::repositories::Repositories;
use courier::database::{DbPool, init_pool_with_size, run_migrations};
use courier::notification::{ChannelTransport, Delivery, Transports};
use courier::{Error, Result};

/// In-memory database with the schema applied.
pub async fn setup_test_db() -> (DbPool, Repositories) {
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    let repositories = Repositories::sqlx(pool.clone());
    (pool, repositories)
}

/// One send seen by a [`CapturingTransport`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub sender_id: Option<String>,
    pub recipient: String,
    pub content: String,
    pub cta_links: Vec<String>,
}

/// Records sends and fails for selected senders or everything.
pub struct CapturingTransport {
    channel_type: ChannelType,
    sent: Mutex<Vec<Captured>>,
    failing_senders: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl CapturingTransport {
    pub fn new(channel_type: ChannelType) -> Arc<Self> {
        Arc::new(Self {
            channel_type,
            sent: Mutex::new(Vec::new()),
            failing_senders: Mutex::new(HashSet::new()),
            fail_all: Mutex::new(false),
        })
    }

    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    pub fn fail_sender(&self, sender_id: &str) {
        self.failing_senders
            .lock()
            .unwrap()
            .insert(sender_id.to_string());
    }

    pub fn sent(&self) -> Vec<Captured> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for CapturingTransport {
    fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    async fn send(&self, delivery: Delivery<'_>) -> Result<()> {
        let sender_id = delivery.sender.map(|s| s.id.clone());
        self.sent.lock().unwrap().push(Captured {
            sender_id: sender_id.clone(),
            recipient: delivery.recipient.to_string(),
            content: delivery.rendered.content.clone(),
            cta_links: delivery
                .rendered
                .ctas
                .iter()
                .map(|cta| cta.action.clone())
                .collect(),
        });

        let sender_fails = sender_id
            .as_ref()
            .is_some_and(|id| self.failing_senders.lock().unwrap().contains(id));
        if *self.fail_all.lock().unwrap() || sender_fails {
            return Err(Error::transport(self.channel_type.as_str(), "forced failure"));
        }
        Ok(())
    }
}

/// Capturing transports for every channel type.
pub struct TestTransports {
    pub email: Arc<CapturingTransport>,
    pub telegram: Arc<CapturingTransport>,
    pub webhook: Arc<CapturingTransport>,
}

impl TestTransports {
    pub fn new() -> Self {
        Self {
            email: CapturingTransport::new(ChannelType::Email),
            telegram: CapturingTransport::new(ChannelType::Telegram),
            webhook: CapturingTransport::new(ChannelType::Webhook),
        }
    }

    pub fn transports(&self) -> Transports {
        Transports::new(
            self.email.clone(),
            self.telegram.clone(),
            self.webhook.clone(),
        )
    }
}

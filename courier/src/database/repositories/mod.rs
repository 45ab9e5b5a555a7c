//! Repository layer for database access.
//!
//! One trait per store, each with a `Sqlx*` implementation. The notification
//! pipeline only ever holds `Arc<dyn ...Repository>`.

pub mod channel;
pub mod history;
pub mod organization;
pub mod queue;
pub mod routing_rule;
pub mod sender;
pub mod template;

pub use channel::*;
pub use history::*;
pub use organization::*;
pub use queue::*;
pub use routing_rule::*;
pub use sender::*;
pub use template::*;

use std::sync::Arc;

use crate::database::DbPool;

/// Every store the notification pipeline touches, behind its trait.
#[derive(Clone)]
pub struct Repositories {
    pub organizations: Arc<dyn OrganizationRepository>,
    pub routing_rules: Arc<dyn RoutingRuleRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub senders: Arc<dyn SenderRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub history: Arc<dyn HistoryRepository>,
}

impl Repositories {
    /// SQLite-backed repositories sharing one pool.
    pub fn sqlx(pool: DbPool) -> Self {
        Self {
            organizations: Arc::new(SqlxOrganizationRepository::new(pool.clone())),
            routing_rules: Arc::new(SqlxRoutingRuleRepository::new(pool.clone())),
            channels: Arc::new(SqlxChannelRepository::new(pool.clone())),
            senders: Arc::new(SqlxSenderRepository::new(pool.clone())),
            templates: Arc::new(SqlxTemplateRepository::new(pool.clone())),
            queue: Arc::new(SqlxQueueRepository::new(pool.clone())),
            history: Arc::new(SqlxHistoryRepository::new(pool)),
        }
    }
}

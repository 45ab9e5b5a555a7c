//! Event trigger: route an event and enqueue its deliveries.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::clock::Clock;
use super::queue::enqueue_routes;
use super::router::{EventRouter, OrganizationFailure};
use crate::database::repositories::QueueRepository;
use crate::{Error, Result};

/// Result of one trigger call.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    /// Set to `"no routing rule"` when nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub event_type: String,
    pub queued: usize,
    /// Queue item ids, in creation order.
    #[serde(skip)]
    pub queue_item_ids: Vec<String>,
    /// Organizations skipped during routing.
    #[serde(skip)]
    pub skipped: Vec<OrganizationFailure>,
}

/// Accepts events and turns them into pending queue items.
pub struct TriggerService {
    router: EventRouter,
    queue: Arc<dyn QueueRepository>,
    clock: Arc<dyn Clock>,
}

impl TriggerService {
    pub fn new(router: EventRouter, queue: Arc<dyn QueueRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            router,
            queue,
            clock,
        }
    }

    /// Route `event_type` and enqueue one item per resolved recipient.
    ///
    /// `payload` must be a JSON object. Delivery happens later, so the
    /// outcome only reports how many items were queued.
    pub async fn trigger(&self, event_type: &str, payload: Value) -> Result<TriggerOutcome> {
        let event_type = event_type.trim();
        if event_type.is_empty() {
            return Err(Error::validation("eventType must not be empty"));
        }
        if !payload.is_object() {
            return Err(Error::validation("payload must be a JSON object"));
        }

        let routes = self.router.find_routes(event_type).await?;
        if routes.is_empty() {
            info!(event_type, "No routing rule matched event");
            return Ok(TriggerOutcome {
                message: Some("no routing rule".to_string()),
                event_type: event_type.to_string(),
                queued: 0,
                queue_item_ids: Vec::new(),
                skipped: routes.failures,
            });
        }

        let items = enqueue_routes(
            self.queue.as_ref(),
            &routes.routes,
            event_type,
            &payload,
            self.clock.now(),
        )
        .await?;

        info!(
            event_type,
            routes = routes.routes.len(),
            queued = items.len(),
            "Event triggered"
        );

        Ok(TriggerOutcome {
            message: None,
            event_type: event_type.to_string(),
            queued: items.len(),
            queue_item_ids: items.into_iter().map(|i| i.id).collect(),
            skipped: routes.failures,
        })
    }
}

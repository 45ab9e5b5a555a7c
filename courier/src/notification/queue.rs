//! Queue fan-out and retry scheduling.
//!
//! Routes expand into one queue item per recipient. After a failed attempt
//! an item either goes back to `pending` with an exponential delay or ends
//! in `failed` once its retries are used up.

use serde_json::Value;
use tracing::debug;

use super::router::Route;
use crate::Result;
use crate::database::models::QueueItemDbModel;
use crate::database::repositories::QueueRepository;

/// Delay in seconds before retry number `retry_count` becomes eligible: `2^retry_count`.
pub fn backoff_delay(retry_count: i32) -> i64 {
    1i64 << retry_count.clamp(0, 62)
}

/// What happens to a processing item after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Back to `pending`, eligible again at `next_retry_at`.
    Retry { retry_count: i32, next_retry_at: i64 },
    /// Retries exhausted; `failed` is terminal.
    Fail,
}

/// Next state for `item` after a failure at `now`.
pub fn on_failure(item: &QueueItemDbModel, now: i64) -> FailureAction {
    if item.retry_count < item.max_retries {
        let retry_count = item.retry_count + 1;
        FailureAction::Retry {
            retry_count,
            next_retry_at: now + backoff_delay(retry_count),
        }
    } else {
        FailureAction::Fail
    }
}

/// Pending items for every `(route, recipient)` pair, in route order.
///
/// Channels without recipients contribute nothing.
pub fn expand_routes(
    routes: &[Route],
    event_type: &str,
    payload: &Value,
    now: i64,
) -> Vec<QueueItemDbModel> {
    routes
        .iter()
        .flat_map(|route| {
            route.channel.recipients().into_iter().map(move |recipient| {
                QueueItemDbModel::new(
                    event_type,
                    route.organization_id.as_str(),
                    route.channel.id.as_str(),
                    recipient,
                    payload.clone(),
                    now,
                )
            })
        })
        .collect()
}

/// Expand `routes` and persist the resulting items.
pub async fn enqueue_routes(
    queue: &dyn QueueRepository,
    routes: &[Route],
    event_type: &str,
    payload: &Value,
    now: i64,
) -> Result<Vec<QueueItemDbModel>> {
    let items = expand_routes(routes, event_type, payload, now);
    for item in &items {
        queue.enqueue(item).await?;
        debug!(
            queue_item_id = %item.id,
            channel_id = %item.channel_id,
            event_type,
            "Queued notification"
        );
    }
    Ok(items)
}

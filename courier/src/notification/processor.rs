//! Queue processor.
//!
//! Polls the queue on a fixed interval and works through each batch one item
//! at a time:
//!
//! 1. claim the item (`pending -> processing`)
//! 2. load the channel, resolve the sender and render the template
//! 3. record a pending history entry and point CTAs at the click tracker
//! 4. send, falling back through the channel's remaining senders
//! 5. record the outcome on the history entry and advance the queue item
//!
//! Any failure in steps 2-4 counts as a failed attempt and goes through the
//! retry schedule in [`super::queue`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channels::{Delivery, Transports};
use super::clock::Clock;
use super::queue::{FailureAction, on_failure};
use super::sender::SenderResolver;
use super::template::{TemplateResolver, render};
use super::tracking::{generate_token, hash_token, rewrite_ctas};
use crate::database::models::{ChannelDbModel, HistoryDbModel, QueueItemDbModel, SenderDbModel};
use crate::database::repositories::{
    ChannelRepository, HistoryRepository, QueueRepository, Repositories,
};
use crate::database::time::secs_to_datetime;
use crate::{Error, Result};

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of items pulled per poll.
pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// Reset `processing` items untouched for this long back to `pending`
    /// before each poll. `None` leaves them alone.
    pub processing_timeout: Option<Duration>,
    /// Public origin used to build click-tracking links.
    pub base_url: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            processing_timeout: None,
            base_url: "http://localhost:12580".to_string(),
        }
    }
}

/// What happened to one queue item during a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ItemOutcome {
    Completed,
    #[serde(rename_all = "camelCase")]
    Retrying {
        retry_count: i32,
        next_retry_at: i64,
    },
    Failed,
    /// Not processed: the claim was lost or the outcome could not be stored.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub queue_item_id: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
    /// Failure message of the attempt, if any.
    pub error: Option<String>,
}

/// Per-item results of one poll.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    /// Stale `processing` items returned to `pending` before the fetch.
    pub reclaimed: u64,
    pub fetch_error: Option<String>,
}

impl BatchReport {
    pub fn count(&self, outcome: fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| outcome(&i.outcome)).count()
    }
}

/// Delivers queued notifications.
pub struct Processor {
    queue: Arc<dyn QueueRepository>,
    history: Arc<dyn HistoryRepository>,
    channels: Arc<dyn ChannelRepository>,
    senders: SenderResolver,
    templates: TemplateResolver,
    transports: Transports,
    clock: Arc<dyn Clock>,
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(
        repos: &Repositories,
        transports: Transports,
        clock: Arc<dyn Clock>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue: repos.queue.clone(),
            history: repos.history.clone(),
            channels: repos.channels.clone(),
            senders: SenderResolver::new(repos.senders.clone(), repos.organizations.clone()),
            templates: TemplateResolver::new(repos.templates.clone()),
            transports,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run the poll loop until `cancel` fires.
    ///
    /// The first batch runs one interval after start. Cancellation stops
    /// scheduling new batches; a batch in flight finishes first.
    pub async fn start(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            poll_interval = ?self.config.poll_interval,
            batch_size = self.config.batch_size,
            "Notification processor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.process_batch().await;
                    if !report.items.is_empty() {
                        debug!(
                            processed = report.items.len(),
                            completed = report.count(|o| matches!(o, ItemOutcome::Completed)),
                            retrying = report.count(|o| matches!(o, ItemOutcome::Retrying { .. })),
                            failed = report.count(|o| matches!(o, ItemOutcome::Failed)),
                            "Processed notification batch"
                        );
                    }
                }
            }
        }

        info!("Notification processor stopped");
    }

    /// Spawn [`Self::start`] on the runtime.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.start(cancel).await })
    }

    /// Fetch one batch of eligible items and process them in order.
    pub async fn process_batch(&self) -> BatchReport {
        let mut report = BatchReport::default();
        let now = self.clock.now();

        if let Some(timeout) = self.config.processing_timeout {
            let stale_before = now.saturating_sub(i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX));
            match self.queue.reclaim_stale(stale_before, now).await {
                Ok(0) => {}
                Ok(n) => {
                    warn!(reclaimed = n, "Returned stale processing items to pending");
                    report.reclaimed = n;
                }
                Err(e) => warn!(error = %e, "Failed to reclaim stale processing items"),
            }
        }

        let items = match self.queue.fetch_eligible(now, self.config.batch_size).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to fetch pending notifications");
                report.fetch_error = Some(e.to_string());
                return report;
            }
        };

        for item in items {
            report.items.push(self.process_item(item).await);
        }
        report
    }

    /// Claim, attempt and advance a single item.
    pub async fn process_item(&self, item: QueueItemDbModel) -> ItemReport {
        let queue_item_id = item.id.clone();
        match self.try_process(item).await {
            Ok((outcome, error)) => ItemReport {
                queue_item_id,
                outcome,
                error,
            },
            Err(e) => {
                error!(queue_item_id = %queue_item_id, error = %e, "Failed to process queue item");
                ItemReport {
                    queue_item_id,
                    outcome: ItemOutcome::Skipped,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_process(&self, item: QueueItemDbModel) -> Result<(ItemOutcome, Option<String>)> {
        if !self.queue.claim(&item.id, self.clock.now()).await? {
            debug!(queue_item_id = %item.id, "Queue item already claimed, skipping");
            return Ok((ItemOutcome::Skipped, None));
        }

        match self.attempt(&item).await {
            Ok(()) => {
                if !self.queue.mark_completed(&item.id, self.clock.now()).await? {
                    return Ok(transition_lost(&item, "completed"));
                }
                info!(
                    queue_item_id = %item.id,
                    event_type = %item.event_type,
                    channel_id = %item.channel_id,
                    "Notification delivered"
                );
                Ok((ItemOutcome::Completed, None))
            }
            Err(e) => {
                let message = e.to_string();
                let now = self.clock.now();
                let outcome = match on_failure(&item, now) {
                    FailureAction::Retry {
                        retry_count,
                        next_retry_at,
                    } => {
                        if !self
                            .queue
                            .schedule_retry(&item.id, retry_count, next_retry_at, &message, now)
                            .await?
                        {
                            return Ok(transition_lost(&item, "retry"));
                        }
                        warn!(
                            queue_item_id = %item.id,
                            retry_count,
                            next_retry_at = %secs_to_datetime(next_retry_at),
                            error = %message,
                            "Notification attempt failed, retry scheduled"
                        );
                        ItemOutcome::Retrying {
                            retry_count,
                            next_retry_at,
                        }
                    }
                    FailureAction::Fail => {
                        if !self.queue.mark_failed(&item.id, &message, now).await? {
                            return Ok(transition_lost(&item, "failed"));
                        }
                        error!(
                            queue_item_id = %item.id,
                            retry_count = item.retry_count,
                            error = %message,
                            "Notification failed permanently"
                        );
                        ItemOutcome::Failed
                    }
                };
                Ok((outcome, Some(message)))
            }
        }
    }

    /// One delivery attempt. Resolution failures come back as errors before
    /// any history is written.
    async fn attempt(&self, item: &QueueItemDbModel) -> Result<()> {
        let channel = self.channels.get_channel(&item.channel_id).await?;
        let channel_type = channel.channel_type;

        let sender = if channel_type.requires_sender() {
            Some(
                self.senders
                    .find_sender(&channel, &item.owner_organization_id)
                    .await?,
            )
        } else {
            None
        };

        let template = self
            .templates
            .find_template(&item.event_type, channel_type, &item.owner_organization_id)
            .await?;
        let mut rendered = render(&template, &item.payload);

        let token = generate_token();
        let record = HistoryDbModel::pending(
            item,
            channel_type,
            rendered.subject.clone(),
            rendered.content.clone(),
            rendered
                .ctas
                .iter()
                .map(|cta| (cta.label.clone(), cta.original_url.clone())),
            hash_token(&token),
            self.clock.now(),
        );
        self.history.create_record(&record).await?;
        rewrite_ctas(&mut rendered.ctas, &self.config.base_url, &record.id, &token);

        let delivery = Delivery {
            sender: sender.as_ref(),
            channel: &channel,
            recipient: &item.recipient,
            rendered: &rendered,
            history_id: &record.id,
        };

        match self.send_with_fallback(delivery, &channel).await {
            Ok(()) => {
                self.history.mark_sent(&record.id, self.clock.now()).await?;
                Ok(())
            }
            Err(e) => {
                self.history
                    .mark_failed(&record.id, &e.to_string(), self.clock.now())
                    .await?;
                Err(e)
            }
        }
    }

    /// Send through the resolved sender, then through each remaining usable
    /// sender on the channel until one succeeds.
    async fn send_with_fallback(&self, delivery: Delivery<'_>, channel: &ChannelDbModel) -> Result<()> {
        let transport = self.transports.get(channel.channel_type);

        let primary_err = match transport.send(delivery).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        let Some(primary) = delivery.sender else {
            return Err(primary_err);
        };

        let fallbacks: Vec<SenderDbModel> = match self.senders.fallback_senders(channel, primary).await {
            Ok(fallbacks) => fallbacks,
            Err(e) => {
                warn!(channel_id = %channel.id, error = %e, "Failed to load fallback senders");
                return Err(primary_err);
            }
        };

        if fallbacks.is_empty() {
            return Err(primary_err);
        }

        let mut last_err = primary_err;
        for sender in &fallbacks {
            warn!(
                channel_id = %channel.id,
                history_id = delivery.history_id,
                failed_error = %last_err,
                sender_id = %sender.id,
                "Send failed, trying fallback sender"
            );
            match transport.send(delivery.with_sender(sender)).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = e,
            }
        }

        Err(Error::transport(
            channel.channel_type.as_str(),
            format!("all {} senders failed, last error: {last_err}", fallbacks.len() + 1),
        ))
    }
}

/// The item left `processing` mid-attempt (stale reclaim or another poller),
/// so the outcome was not stored.
fn transition_lost(item: &QueueItemDbModel, outcome: &str) -> (ItemOutcome, Option<String>) {
    warn!(
        queue_item_id = %item.id,
        outcome,
        "Queue item no longer processing, outcome not stored"
    );
    (
        ItemOutcome::Skipped,
        Some(format!("transition lost: {outcome} not stored, item no longer processing")),
    )
}

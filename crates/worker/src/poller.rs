use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use shepherd_core::WorkItem;

use crate::dedup::DedupSet;
use crate::error::WorkerError;
use crate::source::DueWorkSource;

/// What a failed due-work query does to the poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerCriticality {
    /// Stop the poller and surface the error to the host.
    Fatal,
    /// Log and try again on the next tick.
    #[default]
    BestEffort,
}

/// Configuration for a [`Poller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Period between polls. The first poll runs immediately.
    pub interval: Duration,
    /// How long to wait for channel space before dropping an item.
    pub push_timeout: Duration,
    pub criticality: ProducerCriticality,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            push_timeout: Duration::from_secs(5),
            criticality: ProducerCriticality::default(),
        }
    }
}

/// Counts from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Items returned by the source.
    pub discovered: usize,
    /// Items pushed onto the channel.
    pub enqueued: usize,
    /// Items skipped because their key was already queued or in flight.
    pub already_queued: usize,
    /// Items dropped because the channel stayed full or the dedup set was full.
    pub dropped: usize,
}

/// Periodic producer for one work class.
pub struct Poller<P> {
    name: String,
    config: PollerConfig,
    source: Arc<dyn DueWorkSource<P>>,
    dedup: Arc<DedupSet>,
    tx: mpsc::Sender<WorkItem<P>>,
}

impl<P: Send + 'static> Poller<P> {
    pub fn new(
        name: impl Into<String>,
        config: PollerConfig,
        source: Arc<dyn DueWorkSource<P>>,
        dedup: Arc<DedupSet>,
        tx: mpsc::Sender<WorkItem<P>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            source,
            dedup,
            tx,
        }
    }

    /// Query the source once and enqueue every item not already held.
    ///
    /// Returns [`WorkerError::Source`] if the query fails and
    /// [`WorkerError::ChannelClosed`] if the workers are gone.
    pub async fn poll_once(&self) -> Result<PollStats, WorkerError> {
        let items = self.source.due_items().await?;
        let mut stats = PollStats {
            discovered: items.len(),
            ..PollStats::default()
        };

        for item in items {
            if self.dedup.contains(&item.key) {
                debug!(work_class = %self.name, item.key = %item.key, "already queued, skipping");
                stats.already_queued += 1;
                continue;
            }
            if !self.dedup.try_insert(item.key.clone()) {
                if self.dedup.is_full() {
                    warn!(work_class = %self.name, item.key = %item.key, capacity = self.dedup.capacity(), "dedup set full, dropping item");
                    stats.dropped += 1;
                } else {
                    stats.already_queued += 1;
                }
                continue;
            }

            match self.tx.send_timeout(item, self.config.push_timeout).await {
                Ok(()) => stats.enqueued += 1,
                Err(SendTimeoutError::Timeout(item)) => {
                    self.dedup.remove(&item.key);
                    warn!(
                        work_class = %self.name,
                        item.key = %item.key,
                        timeout_ms = %self.config.push_timeout.as_millis(),
                        "work channel full, dropping item"
                    );
                    stats.dropped += 1;
                }
                Err(SendTimeoutError::Closed(item)) => {
                    self.dedup.remove(&item.key);
                    return Err(WorkerError::ChannelClosed);
                }
            }
        }

        debug!(
            work_class = %self.name,
            discovered = stats.discovered,
            enqueued = stats.enqueued,
            already_queued = stats.already_queued,
            dropped = stats.dropped,
            "poll complete"
        );
        Ok(stats)
    }

    /// Poll until `shutdown` fires, the channel closes, or a fatal source
    /// error occurs.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        info!(work_class = %self.name, interval_ms = %self.config.interval.as_millis(), "poller starting");
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(work_class = %self.name, "poller received shutdown signal");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(work_class = %self.name, "poller received shutdown signal");
                    return Ok(());
                }
                result = self.poll_once() => result,
            };

            match result {
                Ok(_) => {}
                Err(WorkerError::ChannelClosed) => {
                    info!(work_class = %self.name, "work channel closed, poller stopping");
                    return Ok(());
                }
                Err(e) if self.config.criticality == ProducerCriticality::Fatal => {
                    error!(work_class = %self.name, error = %e, "due-work query failed, stopping poller");
                    return Err(e);
                }
                Err(e) => {
                    error!(work_class = %self.name, error = %e, "due-work query failed, will retry next tick");
                }
            }
        }
    }
}

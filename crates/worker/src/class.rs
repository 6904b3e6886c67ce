use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shepherd_executor::{RetryExecutor, RetryPolicy};

use crate::dedup::{DEFAULT_DEDUP_CAPACITY, DedupSet};
use crate::error::WorkerError;
use crate::gate::Gate;
use crate::metrics::MetricsSnapshot;
use crate::poller::{Poller, PollerConfig};
use crate::pool::{ItemProcessor, PoolConfig, WorkerPool};
use crate::source::{DueWorkSource, TaskBody};

/// One kind of periodic work: where due items come from, what to do with
/// each, and how they are gated.
pub struct WorkClass<P> {
    name: String,
    source: Arc<dyn DueWorkSource<P>>,
    body: Arc<dyn TaskBody<P>>,
    gate: Gate,
    executor: Arc<RetryExecutor>,
    poller: PollerConfig,
    pool: PoolConfig,
    dedup_capacity: usize,
}

impl<P: Send + Sync + 'static> WorkClass<P> {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn DueWorkSource<P>>,
        body: Arc<dyn TaskBody<P>>,
        gate: Gate,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            body,
            gate,
            executor: Arc::new(RetryExecutor::new(RetryPolicy::default())),
            poller: PollerConfig::default(),
            pool: PoolConfig::default(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Arc<RetryExecutor>) -> Self {
        self.executor = executor;
        self
    }

    #[must_use]
    pub fn with_poller_config(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    #[must_use]
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    #[must_use]
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the poller and the worker pool.
    ///
    /// Both stop when `shutdown` (or the returned handle's own token, a child
    /// of it) is cancelled.
    pub fn spawn(self, shutdown: &CancellationToken) -> RunningWorkClass {
        let shutdown = shutdown.child_token();
        let dedup = Arc::new(DedupSet::with_capacity(self.dedup_capacity));
        let (tx, rx) = mpsc::channel(self.pool.channel_buffer.max(1));

        let processor = Arc::new(ItemProcessor::new(
            self.name.clone(),
            Arc::clone(&dedup),
            self.gate,
            Arc::clone(&self.executor),
            self.body,
        ));
        let pool = WorkerPool::spawn(self.pool.workers, processor, rx, shutdown.clone());

        let poller = Poller::new(self.name.clone(), self.poller, self.source, Arc::clone(&dedup), tx);
        let poller = tokio::spawn(poller.run(shutdown.clone()));

        info!(work_class = %self.name, workers = self.pool.workers, "work class started");
        RunningWorkClass {
            name: self.name,
            shutdown,
            poller: Some(poller),
            pool,
            dedup,
            executor: self.executor,
        }
    }
}

/// Handle to a started [`WorkClass`].
pub struct RunningWorkClass {
    name: String,
    shutdown: CancellationToken,
    poller: Option<JoinHandle<Result<(), WorkerError>>>,
    pool: WorkerPool,
    dedup: Arc<DedupSet>,
    executor: Arc<RetryExecutor>,
}

impl RunningWorkClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys currently queued or in flight.
    pub fn dedup(&self) -> &Arc<DedupSet> {
        &self.dedup
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.pool.metrics()
    }

    /// Wait for the poller to stop on its own, i.e. after a fatal source
    /// error or cancellation. Returns the poller's result.
    pub async fn wait_poller(&mut self) -> Result<(), WorkerError> {
        match self.poller.take() {
            Some(handle) => handle.await.map_err(|e| WorkerError::Join(e.to_string()))?,
            None => Ok(()),
        }
    }

    /// Stop polling, let workers finish their current items, and flush
    /// pending failure notifications.
    pub async fn shutdown(mut self) -> Result<(), WorkerError> {
        info!(work_class = %self.name, "shutting down work class");
        self.shutdown.cancel();
        let poller = self.wait_poller().await;
        self.pool.shutdown().await;
        self.executor.wait_for_notifications().await;
        if let Err(e) = &poller {
            warn!(work_class = %self.name, error = %e, "poller exited with error");
        }
        info!(work_class = %self.name, "work class stopped");
        poller
    }
}

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span};

use shepherd_core::{ItemKey, WorkItem};
use shepherd_executor::{ExecutionOutcome, RetryExecutor};

use crate::dedup::DedupSet;
use crate::gate::{Gate, GateGuard};
use crate::metrics::{MetricsSnapshot, WorkerMetrics};
use crate::source::TaskBody;

/// Sizing for a [`WorkerPool`] and its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Capacity of the channel between the poller and the workers.
    pub channel_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_buffer: 100,
        }
    }
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The task body succeeded.
    Completed,
    /// The task body failed terminally or ran out of attempts.
    Failed,
    /// Another worker already holds the item's scope.
    AlreadyRunning,
    /// The gate was taken or at capacity when we tried to enter.
    NotAcquired,
    /// The state store could not be reached; retried next poll.
    GateError,
}

/// Removes the item's key from the dedup set on every exit path.
struct DedupGuard<'a> {
    set: &'a DedupSet,
    key: ItemKey,
}

impl Drop for DedupGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Runs a single item through gate, retry executor and cleanup.
pub struct ItemProcessor<P> {
    name: String,
    dedup: Arc<DedupSet>,
    gate: Gate,
    executor: Arc<RetryExecutor>,
    body: Arc<dyn TaskBody<P>>,
    metrics: Arc<WorkerMetrics>,
}

impl<P: Send + Sync + 'static> ItemProcessor<P> {
    pub fn new(
        name: impl Into<String>,
        dedup: Arc<DedupSet>,
        gate: Gate,
        executor: Arc<RetryExecutor>,
        body: Arc<dyn TaskBody<P>>,
    ) -> Self {
        Self {
            name: name.into(),
            dedup,
            gate,
            executor,
            body,
            metrics: Arc::new(WorkerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Process `item` to a final outcome.
    ///
    /// The key leaves the dedup set and the gate is released no matter how
    /// this returns. Task failures are reported by the executor, never
    /// propagated.
    pub async fn process(&self, item: WorkItem<P>) -> ItemOutcome {
        let _dedup = DedupGuard {
            set: &self.dedup,
            key: item.key.clone(),
        };
        self.metrics.increment_received();

        match self.gate.is_running(&item.scope).await {
            Ok(true) => {
                debug!(work_class = %self.name, item.key = %item.key, "already running elsewhere, skipping");
                self.metrics.increment_already_running();
                return ItemOutcome::AlreadyRunning;
            }
            Ok(false) => {}
            Err(e) => {
                error!(work_class = %self.name, item.key = %item.key, error = %e, "running check failed, skipping");
                self.metrics.increment_gate_errors();
                return ItemOutcome::GateError;
            }
        }

        let guard = match self.gate.try_enter(&item.scope).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(work_class = %self.name, item.key = %item.key, scope = %item.scope, "gate not acquired, skipping");
                self.metrics.increment_not_acquired();
                return ItemOutcome::NotAcquired;
            }
            Err(e) => {
                error!(work_class = %self.name, item.key = %item.key, error = %e, "gate acquisition failed, skipping");
                self.metrics.increment_gate_errors();
                return ItemOutcome::GateError;
            }
        };

        let outcome = self.execute_held(&item, &guard).await;
        guard.release().await;

        if outcome.is_success() {
            self.metrics.increment_completed();
            ItemOutcome::Completed
        } else {
            self.metrics.increment_failed();
            ItemOutcome::Failed
        }
    }

    /// Run the body under the executor, renewing `guard` while it runs.
    ///
    /// Renewal stops once the lock or slot has passed to someone else; the
    /// body itself is never interrupted.
    async fn execute_held(&self, item: &WorkItem<P>, guard: &GateGuard) -> ExecutionOutcome {
        let body = self.body.as_ref();
        let execution = self.executor.execute(&item.key, || body.run(item));
        tokio::pin!(execution);

        let period = self.gate.keep_alive_interval(&item.scope);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut renewing = true;

        loop {
            tokio::select! {
                outcome = &mut execution => return outcome,
                _ = ticker.tick(), if renewing => match guard.keep_alive().await {
                    Ok(()) => {}
                    Err(e) if e.is_lost() => {
                        error!(work_class = %self.name, item.key = %item.key, scope = %item.scope, error = %e, "exclusion lost while running");
                        self.metrics.increment_exclusion_lost();
                        renewing = false;
                    }
                    Err(e) => {
                        error!(work_class = %self.name, item.key = %item.key, error = %e, "keep-alive failed");
                    }
                },
            }
        }
    }
}

/// A fixed set of workers draining one work channel.
pub struct WorkerPool {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    metrics: Arc<WorkerMetrics>,
}

impl WorkerPool {
    /// Start `workers` tasks pulling from `rx`.
    ///
    /// Workers stop when `shutdown` fires or the channel is closed and
    /// empty. An item already taken off the channel is always finished.
    pub fn spawn<P: Send + Sync + 'static>(
        workers: usize,
        processor: Arc<ItemProcessor<P>>,
        rx: mpsc::Receiver<WorkItem<P>>,
        shutdown: CancellationToken,
    ) -> Self {
        let tracker = TaskTracker::new();
        let rx = Arc::new(Mutex::new(rx));
        let metrics = Arc::clone(processor.metrics());

        for worker_id in 0..workers.max(1) {
            let processor = Arc::clone(&processor);
            let rx = Arc::clone(&rx);
            let shutdown = shutdown.clone();
            let span = info_span!("worker", work_class = %processor.name, worker_id);
            tracker.spawn(
                async move {
                    debug!("worker started");
                    loop {
                        let next = tokio::select! {
                            biased;
                            () = shutdown.cancelled() => break,
                            next = async { rx.lock().await.recv().await } => next,
                        };
                        let Some(item) = next else {
                            break;
                        };
                        let key = item.key.clone();
                        if AssertUnwindSafe(processor.process(item)).catch_unwind().await.is_err() {
                            error!(item.key = %key, "item processing panicked");
                            processor.metrics().increment_panicked();
                        }
                    }
                    debug!("worker stopped");
                }
                .instrument(span),
            );
        }
        tracker.close();
        info!(workers = workers.max(1), "worker pool started");

        Self {
            tracker,
            shutdown,
            metrics,
        }
    }

    /// Wait until every worker has exited.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Stop taking new items and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.wait().await;
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use shepherd_coordination::{ExclusionLock, TrackerSemaphore};
    use shepherd_executor::{RetryPolicy, TaskError};
    use shepherd_state::{
        Keyspace, RefreshOutcome, SemaphoreOutcome, StateError, StateKey, StateStore,
    };
    use shepherd_state_memory::MemoryStateStore;

    use super::*;

    struct CountingBody {
        calls: AtomicU32,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl TaskBody<()> for CountingBody {
        async fn run(&self, _item: &WorkItem<()>) -> Result<(), TaskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(TaskError::new("upstream 502"))
            } else {
                Ok(())
            }
        }
    }

    /// Memory store whose liveness check panics for keys containing "poison"
    /// and fails for keys containing "broken".
    #[derive(Default)]
    struct PoisonedStore {
        inner: MemoryStateStore,
    }

    #[async_trait]
    impl StateStore for PoisonedStore {
        async fn check_and_set(
            &self,
            key: &StateKey,
            value: &str,
            ttl: Option<Duration>,
        ) -> Result<bool, StateError> {
            self.inner.check_and_set(key, value, ttl).await
        }

        async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
            self.inner.get(key).await
        }

        async fn set(
            &self,
            key: &StateKey,
            value: &str,
            ttl: Option<Duration>,
        ) -> Result<(), StateError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
            self.inner.delete(key).await
        }

        async fn delete_if_value(&self, key: &StateKey, expected: &str) -> Result<bool, StateError> {
            self.inner.delete_if_value(key, expected).await
        }

        async fn refresh_if_value(
            &self,
            key: &StateKey,
            expected: &str,
            ttl: Duration,
        ) -> Result<RefreshOutcome, StateError> {
            self.inner.refresh_if_value(key, expected, ttl).await
        }

        async fn exists(&self, key: &StateKey) -> Result<bool, StateError> {
            assert!(!key.canonical().contains("poison"), "corrupt key {key}");
            if key.canonical().contains("broken") {
                return Err(StateError::Backend("connection reset".into()));
            }
            self.inner.exists(key).await
        }

        async fn increment_with_expiry(
            &self,
            key: &StateKey,
            ttl: Duration,
        ) -> Result<i64, StateError> {
            self.inner.increment_with_expiry(key, ttl).await
        }

        async fn expire_if_unset(&self, key: &StateKey, ttl: Duration) -> Result<bool, StateError> {
            self.inner.expire_if_unset(key, ttl).await
        }

        async fn set_members(&self, key: &StateKey) -> Result<Vec<String>, StateError> {
            self.inner.set_members(key).await
        }

        async fn set_remove(&self, key: &StateKey, member: &str) -> Result<bool, StateError> {
            self.inner.set_remove(key, member).await
        }

        async fn semaphore_acquire(
            &self,
            set_key: &StateKey,
            heartbeat_key: &StateKey,
            member: &str,
            max: u64,
            ttl: Duration,
        ) -> Result<SemaphoreOutcome, StateError> {
            self.inner
                .semaphore_acquire(set_key, heartbeat_key, member, max, ttl)
                .await
        }

        async fn semaphore_keep_alive(
            &self,
            set_key: &StateKey,
            heartbeat_key: &StateKey,
            member: &str,
            ttl: Duration,
        ) -> Result<bool, StateError> {
            self.inner
                .semaphore_keep_alive(set_key, heartbeat_key, member, ttl)
                .await
        }

        async fn semaphore_remove_stale(
            &self,
            set_key: &StateKey,
            heartbeat_key: &StateKey,
            member: &str,
        ) -> Result<bool, StateError> {
            self.inner
                .semaphore_remove_stale(set_key, heartbeat_key, member)
                .await
        }

        async fn hash_get(&self, key: &StateKey, field: &str) -> Result<Option<i64>, StateError> {
            self.inner.hash_get(key, field).await
        }

        async fn hash_increment(
            &self,
            key: &StateKey,
            field: &str,
            delta: i64,
        ) -> Result<i64, StateError> {
            self.inner.hash_increment(key, field, delta).await
        }

        async fn hash_check_and_increment(
            &self,
            key: &StateKey,
            field: &str,
            limit: i64,
        ) -> Result<bool, StateError> {
            self.inner.hash_check_and_increment(key, field, limit).await
        }
    }

    fn body(fail: bool, delay: Duration) -> Arc<CountingBody> {
        Arc::new(CountingBody {
            calls: AtomicU32::new(0),
            fail,
            delay,
        })
    }

    fn processor(
        store: Arc<dyn StateStore>,
        body: Arc<CountingBody>,
        lock_ttl: Duration,
    ) -> (ItemProcessor<()>, Arc<DedupSet>, Arc<ExclusionLock>) {
        let lock = Arc::new(ExclusionLock::new(Arc::clone(&store), Keyspace::default(), lock_ttl));
        let semaphore = Arc::new(TrackerSemaphore::new(store, Keyspace::default(), lock_ttl));
        let dedup = Arc::new(DedupSet::new());
        let executor = Arc::new(RetryExecutor::new(RetryPolicy::new(2, Duration::from_secs(1))));
        let processor = ItemProcessor::new(
            "posts",
            Arc::clone(&dedup),
            Gate::new(Arc::clone(&lock), semaphore, 2),
            executor,
            body,
        );
        (processor, dedup, lock)
    }

    #[tokio::test(start_paused = true)]
    async fn completed_item_clears_dedup_and_lock() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(false, Duration::ZERO);
        let (processor, dedup, lock) = processor(store, body.clone(), Duration::from_secs(60));
        let item = WorkItem::post("p1", ());
        dedup.insert(item.key.clone());

        assert_eq!(processor.process(item).await, ItemOutcome::Completed);
        assert!(dedup.is_empty());
        assert!(!lock.is_running("post", "p1").await.unwrap());
        assert_eq!(body.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_item_is_cleaned_up() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(true, Duration::ZERO);
        let (processor, dedup, lock) = processor(store, body.clone(), Duration::from_secs(60));
        let item = WorkItem::post("p1", ());
        dedup.insert(item.key.clone());

        assert_eq!(processor.process(item).await, ItemOutcome::Failed);
        assert_eq!(body.calls.load(Ordering::SeqCst), 2);
        assert!(dedup.is_empty());
        assert!(!lock.is_running("post", "p1").await.unwrap());
        assert_eq!(processor.metrics().snapshot().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn held_scope_is_skipped() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(false, Duration::ZERO);
        let (processor, dedup, lock) = processor(store, body.clone(), Duration::from_secs(60));
        lock.acquire("other-instance", "post", "p1").await.unwrap();
        let item = WorkItem::post("p1", ());
        dedup.insert(item.key.clone());

        assert_eq!(processor.process(item).await, ItemOutcome::AlreadyRunning);
        assert_eq!(body.calls.load(Ordering::SeqCst), 0);
        assert!(dedup.is_empty());
        // Someone else's lock is left alone.
        assert!(lock.is_running("post", "p1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn long_task_keeps_lock_alive() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(false, Duration::from_secs(10));
        let (processor, _dedup, lock) = processor(store, body, Duration::from_secs(3));
        let processor = Arc::new(processor);

        let task = {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.process(WorkItem::post("p1", ())).await })
        };

        // Well past the TTL, the lock is still held because of renewals.
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(lock.is_running("post", "p1").await.unwrap());

        assert_eq!(task.await.unwrap(), ItemOutcome::Completed);
        assert!(!lock.is_running("post", "p1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_tracker_slot_is_not_renewed() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(false, Duration::from_secs(10));
        let (processor, _dedup, _lock) =
            processor(Arc::clone(&store), body, Duration::from_secs(3));
        let processor = Arc::new(processor);
        let keyspace = Keyspace::default();
        let heartbeat = keyspace.heartbeat("org", "t1");

        let task = {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.process(WorkItem::tracker("org", "t1", ())).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.exists(&heartbeat).await.unwrap());
        // Reclaimed out from under the running item.
        store
            .set_remove(&keyspace.active_trackers("org"), "t1")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(
            !store.exists(&heartbeat).await.unwrap(),
            "a reclaimed slot must not get its heartbeat back"
        );

        assert_eq!(task.await.unwrap(), ItemOutcome::Completed);
        let metrics = processor.metrics().snapshot();
        assert_eq!(metrics.exclusion_lost, 1);
        assert_eq!(metrics.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_at_the_gate_skips_the_item() {
        let store: Arc<dyn StateStore> = Arc::new(PoisonedStore::default());
        let body = body(false, Duration::ZERO);
        let (processor, dedup, _lock) = processor(store, body.clone(), Duration::from_secs(60));
        let item = WorkItem::post("broken", ());
        dedup.insert(item.key.clone());

        assert_eq!(processor.process(item).await, ItemOutcome::GateError);
        assert_eq!(body.calls.load(Ordering::SeqCst), 0);
        assert!(dedup.is_empty());
        let metrics = processor.metrics().snapshot();
        assert_eq!(metrics.gate_errors, 1);
        assert_eq!(metrics.finished(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_survives_a_panic_outside_the_body() {
        let store: Arc<dyn StateStore> = Arc::new(PoisonedStore::default());
        let body = body(false, Duration::ZERO);
        let (processor, dedup, _lock) = processor(store, body.clone(), Duration::from_secs(60));
        let (tx, rx) = mpsc::channel(10);

        for id in ["poison", "p2", "p3"] {
            let item = WorkItem::post(id, ());
            dedup.insert(item.key.clone());
            tx.send(item).await.unwrap();
        }
        drop(tx);

        let pool = WorkerPool::spawn(1, Arc::new(processor), rx, CancellationToken::new());
        pool.wait().await;

        let metrics = pool.metrics();
        assert_eq!(metrics.panicked, 1);
        assert_eq!(metrics.completed, 2);
        assert_eq!(body.calls.load(Ordering::SeqCst), 2);
        assert!(dedup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pool_drains_channel_and_stops_when_closed() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(false, Duration::from_millis(100));
        let (processor, dedup, _lock) = processor(store, body.clone(), Duration::from_secs(60));
        let (tx, rx) = mpsc::channel(10);

        for id in ["p1", "p2", "p3", "p4"] {
            let item = WorkItem::post(id, ());
            dedup.insert(item.key.clone());
            tx.send(item).await.unwrap();
        }
        drop(tx);

        let pool = WorkerPool::spawn(2, Arc::new(processor), rx, CancellationToken::new());
        pool.wait().await;

        assert_eq!(body.calls.load(Ordering::SeqCst), 4);
        assert_eq!(pool.metrics().completed, 4);
        assert!(dedup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_finishes_in_flight_item() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let body = body(false, Duration::from_secs(5));
        let (processor, _dedup, _lock) = processor(store, body.clone(), Duration::from_secs(60));
        let (tx, rx) = mpsc::channel(10);
        tx.send(WorkItem::post("p1", ())).await.unwrap();

        let pool = WorkerPool::spawn(1, Arc::new(processor), rx, CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(1)).await;
        pool.shutdown().await;

        assert_eq!(pool.metrics().completed, 1);
        drop(tx);
    }
}

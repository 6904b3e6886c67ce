//! End-to-end behaviour of a work class against the in-memory state store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use shepherd_coordination::{ExclusionLock, TrackerSemaphore};
use shepherd_core::{ItemKey, WorkItem};
use shepherd_executor::{FailureKind, RecordingNotifier, RetryExecutor, RetryPolicy, TaskError};
use shepherd_state::{Keyspace, StateStore};
use shepherd_state_memory::MemoryStateStore;
use shepherd_worker::{
    DueWorkSource, Gate, PollerConfig, PoolConfig, ProducerCriticality, TaskBody, WorkClass,
    WorkerError,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Returns the same rows on every poll.
struct StaticSource {
    items: Vec<WorkItem<()>>,
    polls: AtomicUsize,
}

impl StaticSource {
    fn new(items: Vec<WorkItem<()>>) -> Arc<Self> {
        Arc::new(Self {
            items,
            polls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DueWorkSource<()> for StaticSource {
    async fn due_items(&self) -> Result<Vec<WorkItem<()>>, WorkerError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
}

/// Returns the rows whose task has not yet succeeded.
struct PendingSource {
    items: Vec<WorkItem<()>>,
    body: Arc<RecordingBody>,
}

#[async_trait]
impl DueWorkSource<()> for PendingSource {
    async fn due_items(&self) -> Result<Vec<WorkItem<()>>, WorkerError> {
        let done = self.body.completed.lock();
        Ok(self
            .items
            .iter()
            .filter(|item| !done.contains(&item.key))
            .cloned()
            .collect())
    }
}

struct BrokenSource {
    polls: AtomicUsize,
}

#[async_trait]
impl DueWorkSource<()> for BrokenSource {
    async fn due_items(&self) -> Result<Vec<WorkItem<()>>, WorkerError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Err(WorkerError::Source("connection refused".into()))
    }
}

/// Records invocations per key, sleeps, then fails with `error` if set.
struct RecordingBody {
    calls: Mutex<HashMap<ItemKey, u32>>,
    completed: Mutex<HashSet<ItemKey>>,
    running: AtomicU32,
    peak: AtomicU32,
    work: Duration,
    error: Option<&'static str>,
}

impl RecordingBody {
    fn new(work: Duration, error: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashSet::new()),
            running: AtomicU32::new(0),
            peak: AtomicU32::new(0),
            work,
            error,
        })
    }

    fn calls_for(&self, key: &str) -> u32 {
        self.calls.lock().get(&ItemKey::new(key)).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl TaskBody<()> for RecordingBody {
    async fn run(&self, item: &WorkItem<()>) -> Result<(), TaskError> {
        *self.calls.lock().entry(item.key.clone()).or_default() += 1;
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        match self.error {
            Some(message) => Err(TaskError::new(message)),
            None => {
                self.completed.lock().insert(item.key.clone());
                Ok(())
            }
        }
    }
}

struct PanickingBody;

#[async_trait]
impl TaskBody<()> for PanickingBody {
    async fn run(&self, item: &WorkItem<()>) -> Result<(), TaskError> {
        if item.key.as_str().starts_with("org-1") {
            panic!("renderer crashed");
        }
        Ok(())
    }
}

struct Harness {
    store: Arc<dyn StateStore>,
    lock: Arc<ExclusionLock>,
    semaphore: Arc<TrackerSemaphore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(Arc::new(MemoryStateStore::new()))
    }

    fn with_store(store: Arc<dyn StateStore>) -> Self {
        Self {
            lock: Arc::new(ExclusionLock::new(
                Arc::clone(&store),
                Keyspace::default(),
                Duration::from_secs(120),
            )),
            semaphore: Arc::new(TrackerSemaphore::new(
                Arc::clone(&store),
                Keyspace::default(),
                Duration::from_secs(30),
            )),
            store,
        }
    }

    fn gate(&self, max_trackers: u64) -> Gate {
        Gate::new(Arc::clone(&self.lock), Arc::clone(&self.semaphore), max_trackers)
    }
}

fn poller_config(criticality: ProducerCriticality) -> PollerConfig {
    PollerConfig {
        interval: Duration::from_secs(10),
        push_timeout: Duration::from_secs(1),
        criticality,
    }
}

fn executor(max_attempts: u32, notifier: Arc<RecordingNotifier>) -> Arc<RetryExecutor> {
    Arc::new(
        RetryExecutor::new(
            RetryPolicy::new(max_attempts, Duration::from_secs(2))
                .with_terminal_substrings(["banned", "suspended"]),
        )
        .with_notifier(notifier),
    )
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn repeated_polls_run_each_key_once_while_in_flight() {
    let harness = Harness::new();
    let source = StaticSource::new(vec![WorkItem::post("p1", ()), WorkItem::post("p2", ())]);
    // Work outlasts several poll intervals.
    let body = RecordingBody::new(Duration::from_secs(35), None);

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("posts", source.clone(), body.clone(), harness.gate(5))
        .with_poller_config(poller_config(ProducerCriticality::BestEffort))
        .with_pool_config(PoolConfig {
            workers: 4,
            channel_buffer: 10,
        })
        .spawn(&shutdown);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(source.polls.load(Ordering::SeqCst) >= 4);
    assert_eq!(body.calls_for("p1"), 1);
    assert_eq!(body.calls_for("p2"), 1);

    running.shutdown().await.unwrap();
    assert_eq!(body.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn tracker_capacity_admits_at_most_max_per_org() {
    let harness = Harness::new();
    let body = RecordingBody::new(Duration::from_secs(5), None);
    let source = Arc::new(PendingSource {
        items: (0..5)
            .map(|i| WorkItem::tracker("org-1", &format!("trk-{i}"), ()))
            .collect(),
        body: body.clone(),
    });

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("trackers", source, body.clone(), harness.gate(2))
        .with_poller_config(poller_config(ProducerCriticality::BestEffort))
        .with_pool_config(PoolConfig {
            workers: 5,
            channel_buffer: 10,
        })
        .spawn(&shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(body.running.load(Ordering::SeqCst), 2);
    assert_eq!(harness.semaphore.active_trackers("org-1").await.unwrap().len(), 2);
    assert_eq!(running.metrics().not_acquired, 3);

    // Later polls pick up the rest as slots free up.
    tokio::time::sleep(Duration::from_secs(30)).await;
    running.shutdown().await.unwrap();

    assert_eq!(body.peak.load(Ordering::SeqCst), 2);
    for i in 0..5 {
        assert_eq!(body.calls_for(&format!("org-1:trk-{i}")), 1);
    }
    assert!(harness.semaphore.active_trackers("org-1").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn two_instances_sharing_a_store_do_not_overlap() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let first = Harness::with_store(Arc::clone(&store));
    let second = Harness::with_store(Arc::clone(&store));
    let body = RecordingBody::new(Duration::from_secs(15), None);

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();
    for harness in [&first, &second] {
        let source = StaticSource::new(vec![WorkItem::post("shared", ())]);
        handles.push(
            WorkClass::new("posts", source, body.clone(), harness.gate(1))
                .with_poller_config(poller_config(ProducerCriticality::BestEffort))
                .spawn(&shutdown),
        );
    }

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert_eq!(body.peak.load(Ordering::SeqCst), 1);
    assert_eq!(body.calls_for("shared"), 1);

    let skipped: u64 = handles.iter().map(|h| h.metrics().already_running).sum();
    assert!(skipped >= 1);

    for handle in handles {
        handle.shutdown().await.unwrap();
    }
    assert_eq!(body.peak.load(Ordering::SeqCst), 1);
    assert!(!first.store.exists(&first.lock.key("post", "shared")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn transient_failure_retries_then_notifies_and_cleans_up() {
    let harness = Harness::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let source = StaticSource::new(vec![WorkItem::post("p1", ())]);
    let body = RecordingBody::new(Duration::ZERO, Some("upstream timeout"));

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("posts", source, body.clone(), harness.gate(1))
        .with_executor(executor(3, Arc::clone(&notifier)))
        .with_poller_config(PollerConfig {
            interval: Duration::from_secs(3600),
            ..poller_config(ProducerCriticality::BestEffort)
        })
        .spawn(&shutdown);

    // Three attempts with two delays of two seconds.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(body.calls_for("p1"), 3);
    assert!(running.dedup().is_empty());
    assert!(!harness.lock.is_running("post", "p1").await.unwrap());

    running.shutdown().await.unwrap();
    let reports = notifier.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, FailureKind::Exhausted);
    assert_eq!(reports[0].attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn terminal_failure_runs_once() {
    let harness = Harness::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let source = StaticSource::new(vec![WorkItem::post("p1", ())]);
    let body = RecordingBody::new(Duration::ZERO, Some("account BANNED by platform"));

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("posts", source, body.clone(), harness.gate(1))
        .with_executor(executor(5, Arc::clone(&notifier)))
        .with_poller_config(PollerConfig {
            interval: Duration::from_secs(3600),
            ..poller_config(ProducerCriticality::BestEffort)
        })
        .spawn(&shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    running.shutdown().await.unwrap();

    assert_eq!(body.calls_for("p1"), 1);
    let reports = notifier.reports();
    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].kind, FailureKind::Terminal { .. }));
}

#[tokio::test(start_paused = true)]
async fn panicking_body_releases_everything() {
    let harness = Harness::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let source = StaticSource::new(vec![WorkItem::tracker("org-1", "trk-1", ())]);

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("trackers", source, Arc::new(PanickingBody), harness.gate(1))
        .with_executor(executor(2, Arc::clone(&notifier)))
        .with_poller_config(PollerConfig {
            interval: Duration::from_secs(3600),
            ..poller_config(ProducerCriticality::BestEffort)
        })
        .spawn(&shutdown);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(running.dedup().is_empty());
    assert!(harness.semaphore.active_trackers("org-1").await.unwrap().is_empty());
    assert!(!harness.semaphore.is_running_tracker("org-1", "trk-1").await.unwrap());
    assert_eq!(running.metrics().failed, 1);

    running.shutdown().await.unwrap();
    assert!(notifier.reports()[0].error.contains("renderer crashed"));
}

#[tokio::test(start_paused = true)]
async fn full_channel_drops_items_for_next_poll() {
    let harness = Harness::new();
    let items = (0..6).map(|i| WorkItem::post(&format!("p{i}"), ())).collect();
    let source = StaticSource::new(items);
    let body = RecordingBody::new(Duration::from_secs(30), None);

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("posts", source, body.clone(), harness.gate(1))
        .with_poller_config(poller_config(ProducerCriticality::BestEffort))
        .with_pool_config(PoolConfig {
            workers: 1,
            channel_buffer: 1,
        })
        .spawn(&shutdown);

    // One item in flight, one buffered; the rest timed out and were dropped.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(running.dedup().len(), 2);
    assert_eq!(body.total_calls(), 1);

    shutdown.cancel();
    running.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn fatal_producer_error_stops_the_poller() {
    let harness = Harness::new();
    let source = Arc::new(BrokenSource {
        polls: AtomicUsize::new(0),
    });
    let body = RecordingBody::new(Duration::ZERO, None);

    let shutdown = CancellationToken::new();
    let mut running = WorkClass::new("posts", source.clone(), body, harness.gate(1))
        .with_poller_config(poller_config(ProducerCriticality::Fatal))
        .spawn(&shutdown);

    let result = running.wait_poller().await;
    assert!(matches!(result, Err(WorkerError::Source(_))));
    assert_eq!(source.polls.load(Ordering::SeqCst), 1);
    running.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn best_effort_producer_error_is_retried() {
    let harness = Harness::new();
    let source = Arc::new(BrokenSource {
        polls: AtomicUsize::new(0),
    });
    let body = RecordingBody::new(Duration::ZERO, None);

    let shutdown = CancellationToken::new();
    let running = WorkClass::new("posts", source.clone(), body, harness.gate(1))
        .with_poller_config(poller_config(ProducerCriticality::BestEffort))
        .spawn(&shutdown);

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(source.polls.load(Ordering::SeqCst), 4);

    running.shutdown().await.unwrap();
}

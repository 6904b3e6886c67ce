//! Runtime wiring from [`ShepherdConfig`] to the coordination primitives.
//!
//! A host binary builds one [`Coordinator`] per process and asks it for a
//! [`WorkClass`] per configured `[[work_class]]`, supplying its own
//! [`DueWorkSource`] and [`TaskBody`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use shepherd_coordination::{
    ExclusionLock, LocalRateLimiter, QuotaCounter, RateLimiter, SharedRateLimiter,
    TrackerSemaphore,
};
use shepherd_executor::{FailureNotifier, LogNotifier, RetryExecutor, WebhookNotifier};
use shepherd_state::{Keyspace, StateStore};
use shepherd_worker::{DueWorkSource, Gate, PoolConfig, TaskBody, WorkClass};

use crate::config::{
    NotifierConfig, NotifierKind, RateLimitMode, RateLimitSection, ShepherdConfig,
    WorkClassConfig,
};
use crate::error::ServerError;

/// Lock TTL for scopes that have no `[[work_class]]` entry.
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(120);

/// Shared coordination state for one process.
pub struct Coordinator {
    store: Arc<dyn StateStore>,
    keyspace: Keyspace,
    semaphore: Arc<TrackerSemaphore>,
    max_trackers_per_org: u64,
    executor: Arc<RetryExecutor>,
    rate_limiter: Arc<dyn RateLimiter>,
    quota: Arc<QuotaCounter>,
    pool: PoolConfig,
    push_timeout: Duration,
    dedup_capacity: usize,
    work_classes: HashMap<String, WorkClassConfig>,
}

impl Coordinator {
    /// Build every primitive from `config` on top of `store`.
    pub fn from_config(
        config: &ShepherdConfig,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let keyspace = config.keyspace.to_keyspace();

        let semaphore = Arc::new(TrackerSemaphore::new(
            Arc::clone(&store),
            keyspace.clone(),
            config.semaphore.heartbeat_ttl(),
        ));
        let executor = Arc::new(
            RetryExecutor::new(config.retry.to_policy())
                .with_notifier(build_notifier(&config.notifier)?)
                .with_notify_timeout(config.notifier.timeout()),
        );
        let rate_limiter = build_rate_limiter(&config.rate_limit, Arc::clone(&store), &keyspace);
        let quota = Arc::new(QuotaCounter::new(Arc::clone(&store), keyspace.clone()));

        info!(
            namespace = %keyspace.namespace,
            work_classes = config.work_classes.len(),
            rate_limit_mode = ?config.rate_limit.mode,
            "coordinator ready"
        );

        Ok(Self {
            store,
            keyspace,
            semaphore,
            max_trackers_per_org: config.semaphore.max_trackers_per_org,
            executor,
            rate_limiter,
            quota,
            pool: config.worker.pool_config(),
            push_timeout: config.worker.push_timeout(),
            dedup_capacity: config.worker.dedup_capacity,
            work_classes: config
                .work_classes
                .iter()
                .map(|wc| (wc.name.clone(), wc.clone()))
                .collect(),
        })
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn semaphore(&self) -> &Arc<TrackerSemaphore> {
        &self.semaphore
    }

    pub fn executor(&self) -> &Arc<RetryExecutor> {
        &self.executor
    }

    /// The limiter task bodies consult before each outbound action.
    pub fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    pub fn quota(&self) -> &Arc<QuotaCounter> {
        &self.quota
    }

    /// Exclusion lock for `scope`, using its work class's TTL if there is one.
    pub fn lock_for(&self, scope: &str) -> ExclusionLock {
        let ttl = self
            .work_classes
            .get(scope)
            .map_or(DEFAULT_LOCK_TTL, WorkClassConfig::lock_ttl);
        ExclusionLock::new(Arc::clone(&self.store), self.keyspace.clone(), ttl)
    }

    /// Gate for the named work class.
    pub fn gate_for(&self, name: &str) -> Result<Gate, ServerError> {
        let class = self.class_config(name)?;
        let lock = ExclusionLock::new(
            Arc::clone(&self.store),
            self.keyspace.clone(),
            class.lock_ttl(),
        );
        Ok(Gate::new(
            Arc::new(lock),
            Arc::clone(&self.semaphore),
            self.max_trackers_per_org,
        ))
    }

    /// Assemble the configured work class `name` around `source` and `body`.
    pub fn work_class<P: Send + Sync + 'static>(
        &self,
        name: &str,
        source: Arc<dyn DueWorkSource<P>>,
        body: Arc<dyn TaskBody<P>>,
    ) -> Result<WorkClass<P>, ServerError> {
        let class = self.class_config(name)?;
        let pool = PoolConfig {
            workers: class.workers.unwrap_or(self.pool.workers),
            ..self.pool
        };
        Ok(WorkClass::new(name, source, body, self.gate_for(name)?)
            .with_executor(Arc::clone(&self.executor))
            .with_poller_config(class.poller_config(self.push_timeout))
            .with_pool_config(pool)
            .with_dedup_capacity(self.dedup_capacity))
    }

    fn class_config(&self, name: &str) -> Result<&WorkClassConfig, ServerError> {
        self.work_classes
            .get(name)
            .ok_or_else(|| ServerError::Config(format!("no work_class named \"{name}\"")))
    }
}

/// Build the failure notifier selected by `config.kind`.
pub fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn FailureNotifier>, ServerError> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = config.url.as_deref().ok_or_else(|| {
                ServerError::Config("notifier kind \"webhook\" requires notifier.url".into())
            })?;
            Ok(Arc::new(WebhookNotifier::new(url, config.timeout())?))
        }
    }
}

/// Build the local or shared rate limiter.
pub fn build_rate_limiter(
    section: &RateLimitSection,
    store: Arc<dyn StateStore>,
    keyspace: &Keyspace,
) -> Arc<dyn RateLimiter> {
    let config = section.to_config();
    match section.mode {
        RateLimitMode::Local => Arc::new(LocalRateLimiter::new(config)),
        RateLimitMode::Shared => Arc::new(SharedRateLimiter::new(store, keyspace.clone(), config)),
    }
}

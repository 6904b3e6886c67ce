use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use shepherd_coordination::{CoordinationError, ExclusionLock, LockHandle, TrackerPermit, TrackerSemaphore};
use shepherd_core::ExclusionScope;

/// Cross-process exclusion for a work class.
///
/// Items scoped to a resource take the class's TTL lock; items scoped to a
/// tracker take a slot in their organization's semaphore.
#[derive(Clone)]
pub struct Gate {
    lock: Arc<ExclusionLock>,
    semaphore: Arc<TrackerSemaphore>,
    max_trackers_per_org: u64,
}

impl Gate {
    pub fn new(
        lock: Arc<ExclusionLock>,
        semaphore: Arc<TrackerSemaphore>,
        max_trackers_per_org: u64,
    ) -> Self {
        Self {
            lock,
            semaphore,
            max_trackers_per_org,
        }
    }

    /// Whether some worker, here or in another process, holds `scope`.
    pub async fn is_running(&self, scope: &ExclusionScope) -> Result<bool, CoordinationError> {
        match scope {
            ExclusionScope::Resource { scope, id } => self.lock.is_running(scope, id).await,
            ExclusionScope::Tracker { org_id, tracker_id } => {
                self.semaphore.is_running_tracker(org_id, tracker_id).await
            }
        }
    }

    /// Try to take `scope`. `Ok(None)` means held elsewhere or at capacity.
    pub async fn try_enter(&self, scope: &ExclusionScope) -> Result<Option<GateGuard>, CoordinationError> {
        let guard = match scope {
            ExclusionScope::Resource { scope, id } => {
                self.lock.acquire_scoped(scope, id).await?.map(GateGuard::Lock)
            }
            ExclusionScope::Tracker { org_id, tracker_id } => self
                .semaphore
                .acquire_scoped(org_id, tracker_id, self.max_trackers_per_org)
                .await?
                .map(GateGuard::Tracker),
        };
        Ok(guard)
    }

    /// How often a held guard for `scope` should be renewed.
    #[must_use]
    pub fn keep_alive_interval(&self, scope: &ExclusionScope) -> Duration {
        let ttl = match scope {
            ExclusionScope::Resource { .. } => self.lock.ttl(),
            ExclusionScope::Tracker { .. } => self.semaphore.heartbeat_ttl(),
        };
        (ttl / 3).max(Duration::from_millis(10))
    }
}

/// A held gate. Dropping it releases in the background.
pub enum GateGuard {
    Lock(LockHandle),
    Tracker(TrackerPermit),
}

impl GateGuard {
    /// Renew the lock TTL or tracker heartbeat.
    ///
    /// Fails with [`CoordinationError::Lost`] once another holder owns the
    /// lock or the tracker was reclaimed from its organization's set.
    pub async fn keep_alive(&self) -> Result<(), CoordinationError> {
        match self {
            Self::Lock(handle) => handle.keep_alive().await,
            Self::Tracker(permit) => permit.keep_alive().await,
        }
    }

    /// Release now. Failures are logged; the TTL is the fallback.
    pub async fn release(self) {
        match self {
            Self::Lock(handle) => {
                let key = handle.key().clone();
                if let Err(e) = handle.release().await {
                    warn!(%key, error = %e, "failed to release lock");
                }
            }
            Self::Tracker(permit) => permit.release().await,
        }
    }
}

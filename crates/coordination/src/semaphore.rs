use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use shepherd_state::{Keyspace, SemaphoreOutcome, StateKey, StateStore};

use crate::error::CoordinationError;

/// Caps the number of concurrently running trackers per organization.
///
/// Each organization has a set of active tracker IDs, and every member has a
/// heartbeat key with a TTL. Acquisition first drops members whose heartbeat
/// has expired (a holder that crashed without releasing), then runs the
/// atomic admission script.
///
/// Reconciliation and admission are two separate store calls. A member whose
/// heartbeat lapses between them is still counted by that one admission; the
/// TTL bounds how long that can last.
pub struct TrackerSemaphore {
    store: Arc<dyn StateStore>,
    keyspace: Keyspace,
    heartbeat_ttl: Duration,
}

impl TrackerSemaphore {
    pub fn new(store: Arc<dyn StateStore>, keyspace: Keyspace, heartbeat_ttl: Duration) -> Self {
        Self {
            store,
            keyspace,
            heartbeat_ttl,
        }
    }

    #[must_use]
    pub fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_ttl
    }

    /// Drop members of `org_id`'s set whose heartbeat no longer exists.
    /// Returns how many were removed.
    ///
    /// Each removal re-checks the heartbeat atomically, so a member renewed
    /// after the listing is kept.
    pub async fn reconcile(&self, org_id: &str) -> Result<usize, CoordinationError> {
        let set_key = self.keyspace.active_trackers(org_id);
        let mut removed = 0;
        for member in self.store.set_members(&set_key).await? {
            let heartbeat = self.keyspace.heartbeat(org_id, &member);
            if self
                .store
                .semaphore_remove_stale(&set_key, &heartbeat, &member)
                .await?
            {
                info!(org_id, tracker_id = %member, "removed stale tracker without heartbeat");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Try to admit `tracker_id` into `org_id`'s active set.
    ///
    /// Returns `Ok(false)` when the tracker is already active or the
    /// organization is at `max_concurrent`; both mean "try next cycle".
    pub async fn acquire_tracker(
        &self,
        org_id: &str,
        tracker_id: &str,
        max_concurrent: u64,
    ) -> Result<bool, CoordinationError> {
        self.reconcile(org_id).await?;

        let outcome = self
            .store
            .semaphore_acquire(
                &self.keyspace.active_trackers(org_id),
                &self.keyspace.heartbeat(org_id, tracker_id),
                tracker_id,
                max_concurrent,
                self.heartbeat_ttl,
            )
            .await?;

        match outcome {
            SemaphoreOutcome::Acquired => {
                debug!(org_id, tracker_id, "tracker slot acquired");
                Ok(true)
            }
            SemaphoreOutcome::Duplicate => {
                debug!(org_id, tracker_id, "tracker already active");
                Ok(false)
            }
            SemaphoreOutcome::Full => {
                debug!(org_id, tracker_id, max_concurrent, "tracker capacity reached");
                Ok(false)
            }
        }
    }

    /// Remove the tracker from the active set and delete its heartbeat.
    ///
    /// Best-effort: failures are logged and never returned.
    pub async fn release_tracker(&self, org_id: &str, tracker_id: &str) {
        release_member(
            self.store.as_ref(),
            &self.keyspace.active_trackers(org_id),
            &self.keyspace.heartbeat(org_id, tracker_id),
            tracker_id,
        )
        .await;
    }

    /// Whether the tracker's heartbeat is live.
    pub async fn is_running_tracker(
        &self,
        org_id: &str,
        tracker_id: &str,
    ) -> Result<bool, CoordinationError> {
        Ok(self
            .store
            .exists(&self.keyspace.heartbeat(org_id, tracker_id))
            .await?)
    }

    /// Refresh the tracker's heartbeat TTL.
    ///
    /// Returns [`CoordinationError::Lost`] once the tracker has been
    /// reconciled out of the set; no heartbeat is written then.
    pub async fn keep_alive_tracker(
        &self,
        org_id: &str,
        tracker_id: &str,
    ) -> Result<(), CoordinationError> {
        keep_member_alive(
            self.store.as_ref(),
            &self.keyspace.active_trackers(org_id),
            &self.keyspace.heartbeat(org_id, tracker_id),
            tracker_id,
            self.heartbeat_ttl,
        )
        .await
    }

    /// Current members of the organization's active set.
    pub async fn active_trackers(&self, org_id: &str) -> Result<Vec<String>, CoordinationError> {
        let mut members = self
            .store
            .set_members(&self.keyspace.active_trackers(org_id))
            .await?;
        members.sort();
        Ok(members)
    }

    /// [`acquire_tracker`](Self::acquire_tracker) returning a permit that
    /// releases the slot when dropped.
    pub async fn acquire_scoped(
        &self,
        org_id: &str,
        tracker_id: &str,
        max_concurrent: u64,
    ) -> Result<Option<TrackerPermit>, CoordinationError> {
        if !self.acquire_tracker(org_id, tracker_id, max_concurrent).await? {
            return Ok(None);
        }
        Ok(Some(TrackerPermit {
            store: Arc::clone(&self.store),
            set_key: self.keyspace.active_trackers(org_id),
            heartbeat_key: self.keyspace.heartbeat(org_id, tracker_id),
            member: tracker_id.to_owned(),
            ttl: self.heartbeat_ttl,
            released: false,
        }))
    }
}

async fn keep_member_alive(
    store: &dyn StateStore,
    set_key: &StateKey,
    heartbeat_key: &StateKey,
    member: &str,
    ttl: Duration,
) -> Result<(), CoordinationError> {
    if store
        .semaphore_keep_alive(set_key, heartbeat_key, member, ttl)
        .await?
    {
        Ok(())
    } else {
        Err(CoordinationError::Lost(format!("{set_key} member {member}")))
    }
}

/// Member first, heartbeat second: a member never outlives its heartbeat.
async fn release_member(store: &dyn StateStore, set_key: &StateKey, heartbeat_key: &StateKey, member: &str) {
    if let Err(e) = store.set_remove(set_key, member).await {
        warn!(%set_key, member, error = %e, "failed to remove tracker from active set");
    }
    if let Err(e) = store.delete(heartbeat_key).await {
        warn!(%heartbeat_key, error = %e, "failed to delete tracker heartbeat");
    }
    debug!(%set_key, member, "tracker slot released");
}

/// A held semaphore slot, released when dropped.
pub struct TrackerPermit {
    store: Arc<dyn StateStore>,
    set_key: StateKey,
    heartbeat_key: StateKey,
    member: String,
    ttl: Duration,
    released: bool,
}

impl TrackerPermit {
    #[must_use]
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Refresh the heartbeat TTL. Fails with [`CoordinationError::Lost`]
    /// once the slot has been reclaimed.
    pub async fn keep_alive(&self) -> Result<(), CoordinationError> {
        keep_member_alive(
            self.store.as_ref(),
            &self.set_key,
            &self.heartbeat_key,
            &self.member,
            self.ttl,
        )
        .await
    }

    /// Release the slot now. Best-effort, like
    /// [`TrackerSemaphore::release_tracker`].
    pub async fn release(mut self) {
        self.released = true;
        release_member(
            self.store.as_ref(),
            &self.set_key,
            &self.heartbeat_key,
            &self.member,
        )
        .await;
    }
}

impl Drop for TrackerPermit {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(member = %self.member, "permit dropped outside a runtime, leaving it to expire");
            return;
        };
        let store = Arc::clone(&self.store);
        let set_key = self.set_key.clone();
        let heartbeat_key = self.heartbeat_key.clone();
        let member = std::mem::take(&mut self.member);
        runtime.spawn(async move {
            release_member(store.as_ref(), &set_key, &heartbeat_key, &member).await;
        });
    }
}

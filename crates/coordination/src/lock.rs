use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use shepherd_state::{Keyspace, RefreshOutcome, StateKey, StateStore};

use crate::error::CoordinationError;

/// Interval between attempts in [`ExclusionLock::acquire_wait`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Single-holder TTL lock over the shared store.
///
/// The existence of the key is the lock. A holder that crashes without
/// releasing loses the lock when the TTL runs out.
///
/// The plain [`release`](Self::release) deletes unconditionally. A lock
/// obtained through [`acquire_scoped`](Self::acquire_scoped) carries a random
/// owner token; it is renewed and released only while the key still holds
/// that token, so a holder whose lock expired can neither overwrite nor
/// delete a successor's lock.
pub struct ExclusionLock {
    store: Arc<dyn StateStore>,
    keyspace: Keyspace,
    ttl: Duration,
}

impl ExclusionLock {
    pub fn new(store: Arc<dyn StateStore>, keyspace: Keyspace, ttl: Duration) -> Self {
        Self {
            store,
            keyspace,
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Shared-store key guarding `<scope>:<id>`.
    #[must_use]
    pub fn key(&self, scope: &str, id: &str) -> StateKey {
        self.keyspace.lock(scope, id)
    }

    /// Take the lock for `owner`.
    ///
    /// Returns [`CoordinationError::LockHeld`] if the key already exists.
    pub async fn acquire(&self, owner: &str, scope: &str, id: &str) -> Result<(), CoordinationError> {
        let key = self.key(scope, id);
        if self.store.check_and_set(&key, owner, Some(self.ttl)).await? {
            debug!(%key, owner, ttl_ms = self.ttl.as_millis(), "lock acquired");
            Ok(())
        } else {
            debug!(%key, owner, "lock held elsewhere");
            Err(CoordinationError::LockHeld(key.to_string()))
        }
    }

    /// Delete the lock regardless of who holds it.
    pub async fn release(&self, scope: &str, id: &str) -> Result<(), CoordinationError> {
        let key = self.key(scope, id);
        self.store.delete(&key).await?;
        debug!(%key, "lock released");
        Ok(())
    }

    /// Whether a live lock exists for `<scope>:<id>`.
    pub async fn is_running(&self, scope: &str, id: &str) -> Result<bool, CoordinationError> {
        Ok(self.store.exists(&self.key(scope, id)).await?)
    }

    /// Rewrite the lock with a fresh TTL, re-creating it if it has expired.
    pub async fn keep_alive(&self, owner: &str, scope: &str, id: &str) -> Result<(), CoordinationError> {
        let key = self.key(scope, id);
        self.store.set(&key, owner, Some(self.ttl)).await?;
        Ok(())
    }

    /// Try to take the lock under a fresh owner token.
    ///
    /// Returns `Ok(None)` when the lock is held elsewhere.
    pub async fn acquire_scoped(
        &self,
        scope: &str,
        id: &str,
    ) -> Result<Option<LockHandle>, CoordinationError> {
        let token = uuid::Uuid::new_v4().to_string();
        match self.acquire(&token, scope, id).await {
            Ok(()) => Ok(Some(LockHandle {
                store: Arc::clone(&self.store),
                key: self.key(scope, id),
                token,
                ttl: self.ttl,
                released: false,
            })),
            Err(CoordinationError::LockHeld(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Retry [`acquire`](Self::acquire) until it succeeds or `timeout` passes.
    pub async fn acquire_wait(
        &self,
        owner: &str,
        scope: &str,
        id: &str,
        timeout: Duration,
    ) -> Result<(), CoordinationError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.acquire(owner, scope, id).await {
                Ok(()) => return Ok(()),
                Err(CoordinationError::LockHeld(key)) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(CoordinationError::Timeout {
                            key,
                            waited: timeout,
                        });
                    }
                    tokio::time::sleep(WAIT_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A held lock, released when dropped.
///
/// Prefer [`release`](Self::release); dropping the handle spawns the same
/// fenced release on the current Tokio runtime. Without a runtime the lock is
/// left to expire.
pub struct LockHandle {
    store: Arc<dyn StateStore>,
    key: StateKey,
    token: String,
    ttl: Duration,
    released: bool,
}

impl LockHandle {
    #[must_use]
    pub fn key(&self) -> &StateKey {
        &self.key
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Refresh the TTL under this handle's token, re-creating the lock if it
    /// expired and nobody took it meanwhile.
    ///
    /// Returns [`CoordinationError::Lost`] if another owner holds the key.
    pub async fn keep_alive(&self) -> Result<(), CoordinationError> {
        match self
            .store
            .refresh_if_value(&self.key, &self.token, self.ttl)
            .await?
        {
            RefreshOutcome::Extended => Ok(()),
            RefreshOutcome::Restored => {
                warn!(key = %self.key, "lock had expired, re-created it");
                Ok(())
            }
            RefreshOutcome::Lost => Err(CoordinationError::Lost(self.key.to_string())),
        }
    }

    /// Delete the lock if it still carries this handle's token.
    ///
    /// Returns `false` when the lock had expired or passed to another owner.
    pub async fn release(mut self) -> Result<bool, CoordinationError> {
        self.released = true;
        let removed = self.store.delete_if_value(&self.key, &self.token).await?;
        if removed {
            debug!(key = %self.key, "lock released");
        } else {
            warn!(key = %self.key, "lock was no longer owned at release");
        }
        Ok(removed)
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "lock dropped outside a runtime, leaving it to expire");
            return;
        };
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let token = std::mem::take(&mut self.token);
        runtime.spawn(async move {
            if let Err(e) = store.delete_if_value(&key, &token).await {
                warn!(%key, error = %e, "failed to release dropped lock");
            }
        });
    }
}

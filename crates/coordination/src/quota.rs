use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use shepherd_core::WEEK;
use shepherd_state::{Keyspace, StateKey, StateStore};

use crate::error::CoordinationError;

/// Windowed business-level usage caps.
///
/// Counters live in a hash per window (for example one per organization and
/// ISO week), one field per counter name. The limit is supplied on each call,
/// so different plans can share the same counters.
pub struct QuotaCounter {
    store: Arc<dyn StateStore>,
    keyspace: Keyspace,
    rollback_ttl: Duration,
}

impl QuotaCounter {
    pub fn new(store: Arc<dyn StateStore>, keyspace: Keyspace) -> Self {
        Self {
            store,
            keyspace,
            rollback_ttl: WEEK,
        }
    }

    /// Expiry given to a hash that a rollback finds without one (its window
    /// already lapsed). Defaults to one week.
    #[must_use]
    pub fn with_rollback_ttl(mut self, ttl: Duration) -> Self {
        self.rollback_ttl = ttl;
        self
    }

    /// Counter hash for `org_id` in the ISO week containing `now`.
    #[must_use]
    pub fn weekly_key(&self, org_id: &str, now: &DateTime<Utc>) -> StateKey {
        self.keyspace.quota_counters(org_id, now)
    }

    /// Take one unit of `field` if it is below `limit`.
    ///
    /// The hash expires `window_ttl` after its first use in the window; later
    /// calls never extend it. Returns `Ok(false)` at the limit, leaving the
    /// counter unchanged.
    pub async fn check_and_increment(
        &self,
        key: &StateKey,
        field: &str,
        limit: i64,
        window_ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let allowed = self
            .store
            .hash_check_and_increment(key, field, limit)
            .await?;
        // After the script, so a hash created by this very call gets its window.
        self.store.expire_if_unset(key, window_ttl).await?;

        if !allowed {
            debug!(%key, field, limit, "quota exhausted");
        }
        Ok(allowed)
    }

    /// Return one unit of `field`. Returns the new count.
    ///
    /// A window that expired before the rollback is re-created holding the
    /// decrement; it gets the rollback TTL so it cannot linger.
    pub async fn rollback(&self, key: &StateKey, field: &str) -> Result<i64, CoordinationError> {
        let count = self.store.hash_increment(key, field, -1).await?;
        self.store.expire_if_unset(key, self.rollback_ttl).await?;
        debug!(%key, field, count, "quota slot returned");
        Ok(count)
    }

    /// Units of `field` used in this window.
    pub async fn used(&self, key: &StateKey, field: &str) -> Result<i64, CoordinationError> {
        Ok(self.store.hash_get(key, field).await?.unwrap_or(0))
    }

    /// Units of `field` still available under `limit`.
    pub async fn remaining(
        &self,
        key: &StateKey,
        field: &str,
        limit: i64,
    ) -> Result<i64, CoordinationError> {
        let used = self.used(key, field).await?;
        Ok((limit - used).max(0))
    }
}

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// Result of the atomic semaphore acquire script.
///
/// The integer codes match the script contract: `1` acquired, `2` the
/// member is already active, `0` the set is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreOutcome {
    Acquired,
    Duplicate,
    Full,
}

impl SemaphoreOutcome {
    /// Map a script return code to an outcome.
    pub fn from_code(code: i64) -> Result<Self, StateError> {
        match code {
            1 => Ok(Self::Acquired),
            2 => Ok(Self::Duplicate),
            0 => Ok(Self::Full),
            other => Err(StateError::Backend(format!(
                "unexpected semaphore script result: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Acquired => 1,
            Self::Duplicate => 2,
            Self::Full => 0,
        }
    }
}

/// Result of [`StateStore::refresh_if_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The key held the expected value; its TTL was reset.
    Extended,
    /// The key had expired and was written again with the expected value.
    Restored,
    /// The key holds some other value and was left untouched.
    Lost,
}

impl RefreshOutcome {
    /// Map a script return code to an outcome.
    pub fn from_code(code: i64) -> Result<Self, StateError> {
        match code {
            1 => Ok(Self::Extended),
            2 => Ok(Self::Restored),
            0 => Ok(Self::Lost),
            other => Err(StateError::Backend(format!(
                "unexpected refresh script result: {other}"
            ))),
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Extended => 1,
            Self::Restored => 2,
            Self::Lost => 0,
        }
    }

    /// Whether the caller still holds the key afterwards.
    #[must_use]
    pub fn is_held(self) -> bool {
        !matches!(self, Self::Lost)
    }
}

/// Primitive operations of the shared coordination store.
///
/// Every method is a single atomic step on the backend. Coordination
/// primitives never build a correctness decision out of two separate calls;
/// anything that needs read-then-write lives in one of the script methods.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Set `key` to `value` only if it does not exist.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError>;

    /// Delete a key of any type. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Delete `key` only if its current value equals `expected`.
    async fn delete_if_value(&self, key: &StateKey, expected: &str) -> Result<bool, StateError>;

    /// Reset the TTL of `key` if it holds `expected`, or write `expected`
    /// with `ttl` if the key is absent. A key holding any other value is
    /// left alone and reported as [`RefreshOutcome::Lost`].
    async fn refresh_if_value(
        &self,
        key: &StateKey,
        expected: &str,
        ttl: Duration,
    ) -> Result<RefreshOutcome, StateError>;

    /// Whether a live key exists.
    async fn exists(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Increment an integer counter by one, setting `ttl` as its expiry only
    /// when the post-increment value is 1. Returns the new value.
    async fn increment_with_expiry(&self, key: &StateKey, ttl: Duration)
    -> Result<i64, StateError>;

    /// Give `key` an expiry of `ttl` if it exists and has none yet.
    /// Returns `true` if an expiry was set.
    async fn expire_if_unset(&self, key: &StateKey, ttl: Duration) -> Result<bool, StateError>;

    /// All members of the set at `key` (empty if missing).
    async fn set_members(&self, key: &StateKey) -> Result<Vec<String>, StateError>;

    /// Remove `member` from the set at `key`. Returns `true` if it was present.
    async fn set_remove(&self, key: &StateKey, member: &str) -> Result<bool, StateError>;

    /// Atomically admit `member` into the set at `set_key` if it is not
    /// already a member and the set holds fewer than `max` members. On
    /// admission the heartbeat key is created with `ttl`.
    async fn semaphore_acquire(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
        max: u64,
        ttl: Duration,
    ) -> Result<SemaphoreOutcome, StateError>;

    /// Rewrite `member`'s heartbeat with `ttl`, but only while `member` is
    /// still in the set at `set_key`. Returns `false` (and writes nothing)
    /// once the member has been removed.
    async fn semaphore_keep_alive(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, StateError>;

    /// Remove `member` from the set at `set_key` if its heartbeat key no
    /// longer exists. Returns `true` if the member was removed.
    async fn semaphore_remove_stale(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
    ) -> Result<bool, StateError>;

    /// Read an integer field of the hash at `key`.
    async fn hash_get(&self, key: &StateKey, field: &str) -> Result<Option<i64>, StateError>;

    /// Add `delta` to an integer field of the hash at `key`. Returns the new value.
    async fn hash_increment(
        &self,
        key: &StateKey,
        field: &str,
        delta: i64,
    ) -> Result<i64, StateError>;

    /// Atomically increment `field` if its current value (default 0) is
    /// below `limit`. Returns `true` if incremented, `false` if unchanged.
    async fn hash_check_and_increment(
        &self,
        key: &StateKey,
        field: &str,
        limit: i64,
    ) -> Result<bool, StateError>;
}

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use shepherd_state::{RefreshOutcome, SemaphoreOutcome, StateError, StateKey, StateStore};

use crate::config::RedisConfig;
use crate::scripts;

/// Milliseconds for a Redis `PX`/`PEXPIRE` argument. Redis rejects zero.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Redis-backed implementation of [`StateStore`].
///
/// Uses a `deadpool-redis` connection pool and Lua scripts for atomicity.
/// Locks and counters are plain strings, the active-tracker set is a Redis
/// set, and quota counters are hashes with one field per counter name.
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
}

impl RedisStateStore {
    /// Create a new `RedisStateStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StateError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StateError::Connection(e.to_string()))?
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    /// Build the full Redis key.
    fn redis_key(&self, key: &StateKey) -> String {
        if self.prefix.is_empty() {
            key.canonical().to_owned()
        } else {
            format!("{}:{}", self.prefix, key.canonical())
        }
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StateError> {
        self.pool
            .get()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))
    }
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("prefix", &self.prefix)
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let ttl_ms = ttl.map_or(0, ttl_millis);

        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::CHECK_AND_SET)
            .key(&redis_key)
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        conn.get(&redis_key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&redis_key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let (): () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .del(&redis_key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn delete_if_value(&self, key: &StateKey, expected: &str) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::DELETE_IF_VALUE)
            .key(&redis_key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn refresh_if_value(
        &self,
        key: &StateKey,
        expected: &str,
        ttl: Duration,
    ) -> Result<RefreshOutcome, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let code: i64 = Script::new(scripts::REFRESH_IF_VALUE)
            .key(&redis_key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        RefreshOutcome::from_code(code)
    }

    async fn exists(&self, key: &StateKey) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        conn.exists(&redis_key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn increment_with_expiry(
        &self,
        key: &StateKey,
        ttl: Duration,
    ) -> Result<i64, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        Script::new(scripts::INCR_WITH_EXPIRY)
            .key(&redis_key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn expire_if_unset(&self, key: &StateKey, ttl: Duration) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::EXPIRE_IF_UNSET)
            .key(&redis_key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn set_members(&self, key: &StateKey) -> Result<Vec<String>, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        conn.smembers(&redis_key)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn set_remove(&self, key: &StateKey, member: &str) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .srem(&redis_key, member)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn semaphore_acquire(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
        max: u64,
        ttl: Duration,
    ) -> Result<SemaphoreOutcome, StateError> {
        let set_redis_key = self.redis_key(set_key);
        let heartbeat_redis_key = self.redis_key(heartbeat_key);

        let mut conn = self.conn().await?;
        let code: i64 = Script::new(scripts::SEMAPHORE_ACQUIRE)
            .key(&set_redis_key)
            .key(&heartbeat_redis_key)
            .arg(member)
            .arg(max)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        SemaphoreOutcome::from_code(code)
    }

    async fn semaphore_keep_alive(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::SEMAPHORE_KEEP_ALIVE)
            .key(self.redis_key(set_key))
            .key(self.redis_key(heartbeat_key))
            .arg(member)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn semaphore_remove_stale(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::SEMAPHORE_REMOVE_STALE)
            .key(self.redis_key(set_key))
            .key(self.redis_key(heartbeat_key))
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn hash_get(&self, key: &StateKey, field: &str) -> Result<Option<i64>, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        conn.hget(&redis_key, field)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn hash_increment(
        &self,
        key: &StateKey,
        field: &str,
        delta: i64,
    ) -> Result<i64, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        conn.hincr(&redis_key, field, delta)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    async fn hash_check_and_increment(
        &self,
        key: &StateKey,
        field: &str,
        limit: i64,
    ) -> Result<bool, StateError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn().await?;
        let result: i64 = Script::new(scripts::HASH_CHECK_AND_INCREMENT)
            .key(&redis_key)
            .arg(field)
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result == 1)
    }
}

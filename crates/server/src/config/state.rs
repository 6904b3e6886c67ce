use serde::Deserialize;

/// Configuration for the shared-store backend.
#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// Which backend to use: `"memory"` or `"redis"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Connection URL for the backend (e.g. `redis://localhost:6379`).
    pub url: Option<String>,

    /// Extra key prefix for backends that support it.
    pub prefix: Option<String>,

    /// Connection pool size.
    pub pool_size: Option<usize>,

    /// Timeout in milliseconds for acquiring a pooled connection.
    pub connection_timeout_ms: Option<u64>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            prefix: None,
            pool_size: None,
            connection_timeout_ms: None,
        }
    }
}

#[cfg(feature = "redis")]
impl StateConfig {
    /// Redis settings, falling back to the backend defaults for anything
    /// not given.
    pub fn redis_config(&self) -> shepherd_state_redis::RedisConfig {
        let mut config = shepherd_state_redis::RedisConfig::default();
        if let Some(url) = &self.url {
            config.url.clone_from(url);
        }
        if let Some(prefix) = &self.prefix {
            config.prefix.clone_from(prefix);
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if let Some(ms) = self.connection_timeout_ms {
            config.connection_timeout = std::time::Duration::from_millis(ms);
        }
        config
    }
}

fn default_backend() -> String {
    "memory".to_owned()
}

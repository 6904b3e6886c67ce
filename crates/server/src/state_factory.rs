use std::sync::Arc;

use tracing::info;

use shepherd_state::StateStore;
use shepherd_state_memory::MemoryStateStore;

use crate::config::StateConfig;
use crate::error::ServerError;

/// Build the shared store selected by `config.backend`.
pub fn create_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, ServerError> {
    match config.backend.as_str() {
        "memory" => {
            info!(backend = "memory", "using in-process state store");
            Ok(Arc::new(MemoryStateStore::new()))
        }
        #[cfg(feature = "redis")]
        "redis" => {
            let redis_config = config.redis_config();
            let store = shepherd_state_redis::RedisStateStore::new(&redis_config)?;
            info!(backend = "redis", pool_size = redis_config.pool_size, "using redis state store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        "redis" => Err(ServerError::Config(
            "redis backend requires the `redis` feature".into(),
        )),
        other => Err(ServerError::Config(format!("unknown state backend: {other}"))),
    }
}

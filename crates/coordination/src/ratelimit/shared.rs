use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use shepherd_core::ActionType;
use shepherd_state::{Keyspace, StateStore};

use super::{RateLimitConfig, RateLimiter};
use crate::error::CoordinationError;

/// Rate limiter counting in the shared store.
///
/// Each call increments `<rate_prefix>:<project_id>:<action_type>`. The first
/// increment of a window sets the key's expiry to the cooldown; calls past
/// the maximum are denied and still counted, so the window stays saturated
/// until the key expires.
pub struct SharedRateLimiter {
    store: Arc<dyn StateStore>,
    keyspace: Keyspace,
    config: RateLimitConfig,
}

impl SharedRateLimiter {
    pub fn new(store: Arc<dyn StateStore>, keyspace: Keyspace, config: RateLimitConfig) -> Self {
        Self {
            store,
            keyspace,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[async_trait]
impl RateLimiter for SharedRateLimiter {
    async fn can_send(
        &self,
        project_id: &str,
        action_type: &ActionType,
    ) -> Result<bool, CoordinationError> {
        let Some(max) = self.config.max_for(action_type) else {
            debug!(project_id, %action_type, "no rate limit configured for action type, denying");
            return Ok(false);
        };

        let key = self.keyspace.rate_limit(project_id, action_type);
        let count = self
            .store
            .increment_with_expiry(&key, self.config.cooldown)
            .await?;

        let allowed = u64::try_from(count).is_ok_and(|c| c <= max);
        if !allowed {
            debug!(project_id, %action_type, count, max, "rate limit reached");
        }
        Ok(allowed)
    }
}

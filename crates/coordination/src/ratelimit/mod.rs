//! Per-project, per-action-type send limits.
//!
//! [`LocalRateLimiter`] keeps its windows in process memory and is only
//! correct with a single instance. [`SharedRateLimiter`] counts in the shared
//! store and is required whenever more than one process sends on behalf of
//! the same project.

mod local;
mod shared;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use shepherd_core::ActionType;

use crate::error::CoordinationError;

pub use local::LocalRateLimiter;
pub use shared::SharedRateLimiter;

/// Limits applied per project within one cooldown window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Window length. Counters restart once this much time has passed.
    pub cooldown: Duration,
    /// Maximum sends per window for each action type.
    pub limits: HashMap<ActionType, u64>,
    /// Maximum for action types missing from `limits`. `None` denies them.
    pub default_max: Option<u64>,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            limits: HashMap::new(),
            default_max: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, action_type: ActionType, max: u64) -> Self {
        self.limits.insert(action_type, max);
        self
    }

    #[must_use]
    pub fn with_default_max(mut self, max: u64) -> Self {
        self.default_max = Some(max);
        self
    }

    /// Configured maximum for `action_type`, falling back to the default.
    #[must_use]
    pub fn max_for(&self, action_type: &ActionType) -> Option<u64> {
        self.limits.get(action_type).copied().or(self.default_max)
    }
}

/// Gate consulted by a task body before each outbound side effect.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one send for `(project_id, action_type)` and report whether it
    /// is within the limit. A `false` means skip the side effect.
    async fn can_send(
        &self,
        project_id: &str,
        action_type: &ActionType,
    ) -> Result<bool, CoordinationError>;
}

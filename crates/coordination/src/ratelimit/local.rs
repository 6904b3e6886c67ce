use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use shepherd_core::ActionType;

use super::{RateLimitConfig, RateLimiter};
use crate::error::CoordinationError;

/// One project's fixed window.
#[derive(Debug)]
struct ProjectWindow {
    last_reset: Instant,
    counts: HashMap<ActionType, u64>,
}

/// In-process fixed-window rate limiter.
///
/// Every action type of a project shares one window: when the cooldown has
/// elapsed since the window started, all of that project's counters restart.
#[derive(Debug)]
pub struct LocalRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, ProjectWindow>>,
}

impl LocalRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn check(&self, project_id: &str, action_type: &ActionType) -> bool {
        let Some(max) = self.config.max_for(action_type) else {
            debug!(project_id, %action_type, "no rate limit configured for action type, denying");
            return false;
        };

        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows
            .entry(project_id.to_owned())
            .or_insert_with(|| ProjectWindow {
                last_reset: now,
                counts: HashMap::new(),
            });

        if now.duration_since(window.last_reset) > self.config.cooldown {
            window.last_reset = now;
            window.counts.clear();
        }

        let count = window.counts.entry(action_type.clone()).or_insert(0);
        if *count < max {
            *count += 1;
            true
        } else {
            debug!(project_id, %action_type, max, "rate limit reached");
            false
        }
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn can_send(
        &self,
        project_id: &str,
        action_type: &ActionType,
    ) -> Result<bool, CoordinationError> {
        Ok(self.check(project_id, action_type))
    }
}

use std::time::Duration;

use serde::Deserialize;

/// Per-organization tracker concurrency.
#[derive(Debug, Deserialize)]
pub struct SemaphoreConfig {
    /// Trackers one organization may run at once across all instances.
    #[serde(default = "default_max_trackers_per_org")]
    pub max_trackers_per_org: u64,
    /// Lifetime of a tracker heartbeat without renewal. A crashed worker's
    /// slot is reclaimed after at most this long.
    #[serde(default = "default_heartbeat_ttl_seconds")]
    pub heartbeat_ttl_seconds: u64,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            max_trackers_per_org: default_max_trackers_per_org(),
            heartbeat_ttl_seconds: default_heartbeat_ttl_seconds(),
        }
    }
}

impl SemaphoreConfig {
    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_seconds)
    }
}

fn default_max_trackers_per_org() -> u64 {
    3
}

fn default_heartbeat_ttl_seconds() -> u64 {
    60
}

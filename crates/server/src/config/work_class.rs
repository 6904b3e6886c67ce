use std::time::Duration;

use serde::Deserialize;

use shepherd_worker::{PollerConfig, ProducerCriticality};

/// One `[[work_class]]` table.
///
/// ```toml
/// [[work_class]]
/// name = "trackers"
/// poll_interval_seconds = 300
/// lock_ttl_seconds = 3600
/// criticality = "fatal"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WorkClassConfig {
    /// Unique name; also the scope used in lock keys.
    pub name: String,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// TTL of the per-item exclusion lock. Renewed every third of this
    /// while the item runs.
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,
    /// Whether a failed due-work query stops the poller.
    #[serde(default)]
    pub criticality: ProducerCriticality,
    /// Overrides `[worker] workers` for this class.
    pub workers: Option<usize>,
}

impl WorkClassConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn poller_config(&self, push_timeout: Duration) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_seconds),
            push_timeout,
            criticality: self.criticality,
        }
    }
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_lock_ttl_seconds() -> u64 {
    120
}

mod keyspace;
mod notifier;
mod rate_limit;
mod retry;
mod semaphore;
mod state;
mod telemetry;
mod work_class;
mod worker;

#[cfg(test)]
mod tests;

pub use keyspace::*;
pub use notifier::*;
pub use rate_limit::*;
pub use retry::*;
pub use semaphore::*;
pub use state::*;
pub use telemetry::*;
pub use work_class::*;
pub use worker::*;

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ServerError;

/// Top-level configuration, loaded from `shepherd.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct ShepherdConfig {
    /// Shared-store backend.
    #[serde(default)]
    pub state: StateConfig,
    /// Key namespace inside the shared store.
    #[serde(default)]
    pub keyspace: KeyspaceConfig,
    /// Pool and channel defaults for every work class.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Retry policy for task bodies.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Tracker semaphore capacity and heartbeat.
    #[serde(default)]
    pub semaphore: SemaphoreConfig,
    /// Work class definitions.
    #[serde(default, rename = "work_class")]
    pub work_classes: Vec<WorkClassConfig>,
    /// Outbound action rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    /// Where terminal and exhausted failures are reported.
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Log output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ShepherdConfig {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ServerError> {
        toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read `path`, or use defaults if it does not exist.
    ///
    /// The flag is `true` when the file was found.
    pub fn load(path: &Path) -> Result<(Self, bool), ServerError> {
        if !path.exists() {
            return Ok((Self::from_toml("")?, false));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok((Self::from_toml(&contents)?, true))
    }

    /// Look up a work class by name.
    pub fn work_class(&self, name: &str) -> Option<&WorkClassConfig> {
        self.work_classes.iter().find(|wc| wc.name == name)
    }

    /// Reject settings that would parse but cannot run.
    pub fn validate(&self) -> Result<(), ServerError> {
        match self.state.backend.as_str() {
            "memory" => {}
            "redis" => {
                if self.state.url.is_none() {
                    return Err(ServerError::Config(
                        "state backend \"redis\" requires state.url".into(),
                    ));
                }
            }
            other => {
                return Err(ServerError::Config(format!(
                    "unknown state backend \"{other}\", expected \"memory\" or \"redis\""
                )));
            }
        }

        if self.worker.workers == 0 {
            return Err(ServerError::Config("worker.workers must be at least 1".into()));
        }
        if self.worker.channel_buffer == 0 {
            return Err(ServerError::Config(
                "worker.channel_buffer must be at least 1".into(),
            ));
        }
        if self.worker.dedup_capacity == 0 {
            return Err(ServerError::Config(
                "worker.dedup_capacity must be at least 1".into(),
            ));
        }
        if self.semaphore.max_trackers_per_org == 0 {
            return Err(ServerError::Config(
                "semaphore.max_trackers_per_org must be at least 1".into(),
            ));
        }
        if self.semaphore.heartbeat_ttl_seconds == 0 {
            return Err(ServerError::Config(
                "semaphore.heartbeat_ttl_seconds must be at least 1".into(),
            ));
        }
        if self.rate_limit.cooldown_seconds == 0 {
            return Err(ServerError::Config(
                "rate_limit.cooldown_seconds must be at least 1".into(),
            ));
        }
        if self.notifier.kind == NotifierKind::Webhook && self.notifier.url.is_none() {
            return Err(ServerError::Config(
                "notifier kind \"webhook\" requires notifier.url".into(),
            ));
        }

        let mut names = HashSet::new();
        for wc in &self.work_classes {
            if wc.name.is_empty() {
                return Err(ServerError::Config("work_class.name must not be empty".into()));
            }
            if !names.insert(wc.name.as_str()) {
                return Err(ServerError::Config(format!(
                    "duplicate work_class \"{}\"",
                    wc.name
                )));
            }
            if wc.poll_interval_seconds == 0 {
                return Err(ServerError::Config(format!(
                    "work_class \"{}\": poll_interval_seconds must be at least 1",
                    wc.name
                )));
            }
            if wc.lock_ttl_seconds == 0 {
                return Err(ServerError::Config(format!(
                    "work_class \"{}\": lock_ttl_seconds must be at least 1",
                    wc.name
                )));
            }
            if wc.workers == Some(0) {
                return Err(ServerError::Config(format!(
                    "work_class \"{}\": workers must be at least 1",
                    wc.name
                )));
            }
        }
        Ok(())
    }
}

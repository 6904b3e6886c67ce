use std::time::Duration;

use serde::Deserialize;

use shepherd_worker::{DEFAULT_DEDUP_CAPACITY, PoolConfig};

/// Defaults shared by every work class.
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent workers per work class.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the channel between poller and workers.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// How long the poller waits for channel space before dropping an item.
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
    /// Upper bound on keys queued or in flight per work class.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            channel_buffer: default_channel_buffer(),
            push_timeout_ms: default_push_timeout_ms(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl WorkerConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            channel_buffer: self.channel_buffer,
        }
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

fn default_workers() -> usize {
    4
}

fn default_channel_buffer() -> usize {
    100
}

fn default_push_timeout_ms() -> u64 {
    5_000
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

use std::time::Duration;

use serde::Deserialize;

use shepherd_executor::RetryPolicy;

/// Retry policy for task bodies.
///
/// ```toml
/// [retry]
/// max_attempts = 3
/// delay_ms = 5000
/// terminal_substrings = ["banned", "suspended", "disabled by the user"]
/// ```
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Error message fragments that stop retrying immediately.
    /// Matched case-insensitively.
    #[serde(default = "default_terminal_substrings")]
    pub terminal_substrings: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            terminal_substrings: default_terminal_substrings(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
            .with_terminal_substrings(self.terminal_substrings.iter().cloned())
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    5_000
}

fn default_terminal_substrings() -> Vec<String> {
    RetryPolicy::default().terminal_substrings
}

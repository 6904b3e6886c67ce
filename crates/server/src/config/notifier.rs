use std::time::Duration;

use serde::Deserialize;

/// Which failure notifier to install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Log each failure at error level.
    #[default]
    Log,
    /// POST each failure as JSON to `url`.
    Webhook,
}

/// Failure notification settings.
#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    /// Endpoint for the webhook notifier.
    pub url: Option<String>,
    /// Per-delivery timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

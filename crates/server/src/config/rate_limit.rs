use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use shepherd_coordination::RateLimitConfig;
use shepherd_core::ActionType;

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    /// Counters in this process only.
    Local,
    /// Counters in the shared store, common to every instance.
    #[default]
    Shared,
}

/// Per-project, per-action rate limits.
///
/// ```toml
/// [rate_limit]
/// mode = "shared"
/// cooldown_seconds = 3600
/// default_max = 10
///
/// [rate_limit.limits]
/// comment = 20
/// direct_message = 5
/// ```
#[derive(Debug, Deserialize)]
pub struct RateLimitSection {
    #[serde(default)]
    pub mode: RateLimitMode,
    /// Window length shared by every action type.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Limit for action types without an entry in `limits`. Unset means
    /// such actions are always denied.
    pub default_max: Option<u64>,
    #[serde(default)]
    pub limits: HashMap<String, u64>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            mode: RateLimitMode::default(),
            cooldown_seconds: default_cooldown_seconds(),
            default_max: None,
            limits: HashMap::new(),
        }
    }
}

impl RateLimitSection {
    pub fn to_config(&self) -> RateLimitConfig {
        let mut config = RateLimitConfig::new(Duration::from_secs(self.cooldown_seconds));
        for (action, max) in &self.limits {
            config = config.with_limit(ActionType::from(action.as_str()), *max);
        }
        if let Some(max) = self.default_max {
            config = config.with_default_max(max);
        }
        config
    }
}

fn default_cooldown_seconds() -> u64 {
    3_600
}

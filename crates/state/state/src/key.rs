use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shepherd_core::{ActionType, iso_week_id};

/// The kind of coordination record a key addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Exclusion lock record.
    Lock,
    /// Set of active tracker IDs for an organization.
    ActiveTrackers,
    /// Liveness marker of one semaphore member.
    Heartbeat,
    /// Shared rate-limit counter.
    RateLimit,
    /// Quota counter hash for one window.
    Counters,
    Custom(String),
}

impl KeyKind {
    /// Return a string representation of the key kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lock => "lock",
            Self::ActiveTrackers => "active_trackers",
            Self::Heartbeat => "heartbeat",
            Self::RateLimit => "rate_limit",
            Self::Counters => "counters",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered shared-store key.
///
/// Keys are produced by a [`Keyspace`] so that every record type lives in its
/// own collision-free segment of the namespace. Backends store the canonical
/// string verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    kind: KeyKind,
    rendered: String,
}

impl StateKey {
    /// Create a key from an already rendered string.
    #[must_use]
    pub fn new(kind: KeyKind, rendered: impl Into<String>) -> Self {
        Self {
            kind,
            rendered: rendered.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &KeyKind {
        &self.kind
    }

    /// Return the canonical string stored in the backend.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.rendered
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Renders the shared-store key namespace.
///
/// | Record | Format |
/// |--------|--------|
/// | lock | `<namespace>:<prefix>:<scope>:<id>` |
/// | active set | `<namespace>:<prefix>:org:<org_id>:active_trackers` |
/// | heartbeat | `<namespace>:<prefix>:org:<org_id>:tracker:<tracker_id>` |
/// | rate limit | `<rate_prefix>:<project_id>:<action_type>` |
/// | quota | `<namespace>:<prefix>:org:<org_id>:counters:<year>-W<week>` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyspace {
    pub namespace: String,
    pub prefix: String,
    pub rate_prefix: String,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self {
            namespace: "shepherd".to_owned(),
            prefix: "jobs".to_owned(),
            rate_prefix: "ratelimit".to_owned(),
        }
    }
}

impl Keyspace {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        prefix: impl Into<String>,
        rate_prefix: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            prefix: prefix.into(),
            rate_prefix: rate_prefix.into(),
        }
    }

    fn base(&self) -> String {
        format!("{}:{}", self.namespace, self.prefix)
    }

    #[must_use]
    pub fn lock(&self, scope: &str, id: &str) -> StateKey {
        StateKey::new(KeyKind::Lock, format!("{}:{scope}:{id}", self.base()))
    }

    #[must_use]
    pub fn active_trackers(&self, org_id: &str) -> StateKey {
        StateKey::new(
            KeyKind::ActiveTrackers,
            format!("{}:org:{org_id}:active_trackers", self.base()),
        )
    }

    #[must_use]
    pub fn heartbeat(&self, org_id: &str, tracker_id: &str) -> StateKey {
        StateKey::new(
            KeyKind::Heartbeat,
            format!("{}:org:{org_id}:tracker:{tracker_id}", self.base()),
        )
    }

    #[must_use]
    pub fn rate_limit(&self, project_id: &str, action_type: &ActionType) -> StateKey {
        StateKey::new(
            KeyKind::RateLimit,
            format!("{}:{project_id}:{action_type}", self.rate_prefix),
        )
    }

    /// Quota counter hash for the ISO week containing `now`.
    #[must_use]
    pub fn quota_counters(&self, org_id: &str, now: &DateTime<Utc>) -> StateKey {
        StateKey::new(
            KeyKind::Counters,
            format!("{}:org:{org_id}:counters:{}", self.base(), iso_week_id(now)),
        )
    }
}

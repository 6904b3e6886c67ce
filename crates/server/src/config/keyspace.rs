use serde::Deserialize;

use shepherd_state::Keyspace;

/// Shared-store key namespace.
///
/// Every instance pointed at the same store must use the same values, or
/// they will not see each other's locks.
#[derive(Debug, Deserialize)]
pub struct KeyspaceConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Prefix for shared rate-limit counters.
    #[serde(default = "default_rate_prefix")]
    pub rate_prefix: String,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            prefix: default_prefix(),
            rate_prefix: default_rate_prefix(),
        }
    }
}

impl KeyspaceConfig {
    pub fn to_keyspace(&self) -> Keyspace {
        Keyspace::new(&self.namespace, &self.prefix, &self.rate_prefix)
    }
}

fn default_namespace() -> String {
    "shepherd".to_owned()
}

fn default_prefix() -> String {
    "jobs".to_owned()
}

fn default_rate_prefix() -> String {
    "ratelimit".to_owned()
}

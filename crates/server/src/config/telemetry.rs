use serde::Deserialize;

/// Log output settings.
///
/// `RUST_LOG` takes precedence over `filter` when set.
///
/// ```toml
/// [telemetry]
/// filter = "info,shepherd_worker=debug"
/// json = true
/// ```
#[derive(Debug, Deserialize)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit one JSON object per event instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".to_owned()
}

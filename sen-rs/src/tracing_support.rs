//! Tracing and logging support.
//!
//! Security decisions, plugin lifecycle events and discovery limits are all
//! emitted through `tracing`. Applications install a subscriber once at
//! startup with [`init_subscriber`] or [`init_subscriber_with_config`].

#[cfg(feature = "tracing")]
pub use tracing::{self, debug, error, info, instrument, trace, warn};

#[cfg(feature = "tracing")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use serde::{Deserialize, Serialize};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    /// Human-readable multi-line output.
    Pretty,

    /// Single-line output.
    Compact,

    /// JSON lines, for log shipping.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Filter directive such as `"debug"` or `"sen_plugin_host=trace"`.
    ///
    /// If None, uses RUST_LOG or falls back to "info".
    pub level: Option<String>,

    pub format: TracingFormat,

    pub timestamps: bool,

    /// Include target module names in output.
    pub target: bool,

    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Compact,
            timestamps: true,
            target: true,
            thread_ids: false,
        }
    }
}

/// Initialize the global subscriber with default settings.
///
/// Honours `RUST_LOG` (e.g. `RUST_LOG=sen_security=debug`). Calling it a
/// second time is a no-op.
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    init_subscriber_with_config(TracingConfig::default());
}

/// Initialize the global subscriber with a custom configuration.
///
/// Returns `false` if a global subscriber was already installed.
///
/// # Example
///
/// ```ignore
/// use sen::tracing_support::{init_subscriber_with_config, TracingConfig, TracingFormat};
///
/// init_subscriber_with_config(TracingConfig {
///     format: TracingFormat::Json,
///     ..Default::default()
/// });
/// ```
#[cfg(feature = "tracing")]
pub fn init_subscriber_with_config(config: TracingConfig) -> bool {
    let filter = match &config.level {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(&config))
        .try_init()
        .is_ok()
}

#[cfg(feature = "tracing")]
fn fmt_layer<S>(config: &TracingConfig) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.target)
        .with_thread_ids(config.thread_ids);

    match (config.format, config.timestamps) {
        (TracingFormat::Pretty, true) => base.pretty().boxed(),
        (TracingFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (TracingFormat::Compact, true) => base.compact().boxed(),
        (TracingFormat::Compact, false) => base.compact().without_time().boxed(),
        (TracingFormat::Json, true) => base.json().boxed(),
        (TracingFormat::Json, false) => base.json().without_time().boxed(),
    }
}

// Fallback when tracing feature is disabled
#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber_with_config(_config: TracingConfig) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Compact);
        assert!(config.level.is_none());
        assert!(config.timestamps);
        assert!(!config.thread_ids);
    }

    #[test]
    fn test_config_from_json() {
        let config: TracingConfig =
            crate::config::from_json_str(r#"{"format": "json", "level": "debug"}"#).unwrap();
        assert_eq!(config.format, TracingFormat::Json);
        assert_eq!(config.level.as_deref(), Some("debug"));
        assert!(config.target);
    }

    #[test]
    #[cfg(feature = "tracing")]
    fn test_second_init_is_noop() {
        let _ = init_subscriber_with_config(TracingConfig::default());
        assert!(!init_subscriber_with_config(TracingConfig::default()));
    }
}

//! Plugin host configuration
//!
//! [`PluginManager`](crate::PluginManager) copies its [`PluginSecurityConfig`]
//! on construction; later changes to the caller's value have no effect on a
//! running manager.

use crate::audit::{AuditError, AuditSink, FileAuditSink, TracingAuditSink};
use sen_plugin_api::{API_VERSION_SYMBOL, CREATE_SYMBOL};
use sen_security::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum plugin file size (50 MiB)
pub const DEFAULT_MAX_PLUGIN_SIZE: u64 = 50 * 1024 * 1024;

/// Resource limits for one discovery walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryLimits {
    /// Directory levels below an allowed directory to descend into
    pub max_depth: usize,

    /// Directory entries examined per allowed directory
    pub max_files: usize,

    /// Wall-clock budget for the whole discovery call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_files: 10_000,
            timeout_ms: 2_000,
        }
    }
}

impl DiscoveryLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Policy applied to every plugin load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSecurityConfig {
    /// Accept plugins without a signature. Signing is not supported, so
    /// turning this off rejects every load.
    pub allow_unsigned: bool,

    /// Compute a SHA-256 digest of each plugin file
    pub validate_checksums: bool,

    /// Largest accepted plugin file, in bytes
    pub max_plugin_size: u64,

    /// Directories plugins may be loaded from. Empty trusts nothing.
    pub allowed_dirs: Vec<PathBuf>,

    /// Symbols every plugin binary must export
    pub required_symbols: Vec<String>,

    pub discovery: DiscoveryLimits,

    /// Path policy plugin files must satisfy
    pub security: SecurityConfig,
}

impl Default for PluginSecurityConfig {
    fn default() -> Self {
        Self {
            allow_unsigned: true,
            validate_checksums: true,
            max_plugin_size: DEFAULT_MAX_PLUGIN_SIZE,
            allowed_dirs: Vec::new(),
            required_symbols: vec![API_VERSION_SYMBOL.to_string(), CREATE_SYMBOL.to_string()],
            discovery: DiscoveryLimits::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl PluginSecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.allowed_dirs.push(dir.into());
        self
    }

    pub fn with_max_plugin_size(mut self, bytes: u64) -> Self {
        self.max_plugin_size = bytes;
        self
    }

    pub fn with_required_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.required_symbols.push(symbol.into());
        self
    }

    pub fn with_discovery_limits(mut self, limits: DiscoveryLimits) -> Self {
        self.discovery = limits;
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn without_checksums(mut self) -> Self {
        self.validate_checksums = false;
        self
    }

    pub fn require_signatures(mut self) -> Self {
        self.allow_unsigned = false;
        self
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Provider name matched against discovered plugin file names
    pub provider: String,

    /// Explicit plugin file, bypassing discovery
    pub plugin_path: Option<PathBuf>,

    /// Provider-specific settings, passed through untouched
    pub options: BTreeMap<String, String>,
}

impl StorageConfig {
    pub fn provider(name: impl Into<String>) -> Self {
        Self {
            provider: name.into(),
            ..Self::default()
        }
    }

    pub fn with_plugin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugin_path = Some(path.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Plugin-side settings for application bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub plugins: PluginSecurityConfig,
    pub storage: Option<StorageConfig>,

    /// JSON-lines audit log. Without one, audit events go to `tracing`.
    pub audit_log: Option<PathBuf>,
}

impl HostConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<std::path::Path>) -> sen::Result<Self> {
        sen::config::load_json(path)
    }

    /// Sink for [`PluginManager::with_audit_sink`](crate::PluginManager::with_audit_sink)
    pub fn audit_sink(&self) -> Result<Arc<dyn AuditSink>, AuditError> {
        let sink: Arc<dyn AuditSink> = match &self.audit_log {
            Some(path) => Arc::new(FileAuditSink::open(path)?),
            None => Arc::new(TracingAuditSink),
        };
        Ok(sink)
    }
}

/// Get default plugin directories for the current platform
///
/// The user-local data directory comes first, then `./plugins` resolved
/// against the current directory.
pub fn default_plugin_dirs(app_name: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(data_dir) = dirs::data_local_dir() {
        dirs.push(data_dir.join(app_name).join("plugins"));
    }

    match std::env::current_dir() {
        Ok(cwd) => dirs.push(cwd.join("plugins")),
        Err(e) => tracing::debug!(error = %e, "current directory unavailable"),
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PluginSecurityConfig::default();
        assert!(config.allow_unsigned);
        assert!(config.validate_checksums);
        assert_eq!(config.max_plugin_size, 50 * 1024 * 1024);
        assert!(config.allowed_dirs.is_empty());
        assert_eq!(
            config.required_symbols,
            vec!["sen_plugin_api_version", "sen_plugin_create"]
        );
        assert_eq!(config.discovery.max_depth, 10);
        assert_eq!(config.discovery.max_files, 10_000);
        assert_eq!(config.discovery.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_builders() {
        let config = PluginSecurityConfig::new()
            .with_allowed_dir("/opt/app/plugins")
            .with_max_plugin_size(1024)
            .with_discovery_limits(DiscoveryLimits::default().with_timeout(Duration::from_millis(250)))
            .without_checksums();
        assert_eq!(config.allowed_dirs, vec![PathBuf::from("/opt/app/plugins")]);
        assert_eq!(config.max_plugin_size, 1024);
        assert_eq!(config.discovery.timeout_ms, 250);
        assert!(!config.validate_checksums);
    }

    #[test]
    fn test_host_config_json() {
        let config: HostConfig = sen::config::from_json_str(
            r#"{
                "plugins": { "allowed_dirs": ["/opt/app/plugins"], "discovery": { "max_depth": 3 } },
                "storage": { "provider": "redis", "options": { "url": "redis://localhost" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.plugins.discovery.max_depth, 3);
        assert_eq!(config.plugins.discovery.max_files, 10_000);
        assert_eq!(config.plugins.max_plugin_size, DEFAULT_MAX_PLUGIN_SIZE);
        let storage = config.storage.unwrap();
        assert_eq!(storage.provider, "redis");
        assert!(storage.plugin_path.is_none());
        assert_eq!(storage.options.get("url").map(String::as_str), Some("redis://localhost"));
    }

    #[test]
    fn test_host_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("host.json");
        std::fs::write(&path, r#"{"storage": {"provider": "sqlite"}}"#).unwrap();

        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.storage.unwrap().provider, "sqlite");

        let err = HostConfig::load(temp.path().join("missing.json")).unwrap_err();
        assert_eq!(err.code(), sen::ErrorCode::NotFound);
    }

    #[test]
    fn test_audit_sink_selection() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("audit/plugins.jsonl");
        let config = HostConfig {
            audit_log: Some(log.clone()),
            ..HostConfig::default()
        };

        config.audit_sink().unwrap();
        assert!(log.exists());
        assert!(HostConfig::default().audit_sink().is_ok());
    }

    #[test]
    fn test_default_plugin_dirs() {
        let dirs = default_plugin_dirs("myapp");
        assert!(!dirs.is_empty());
        assert!(dirs.iter().all(|d| d.ends_with("plugins")));
        assert!(dirs.iter().all(|d| d.is_absolute()));
    }
}

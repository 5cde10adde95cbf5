//! Validation policy.
//!
//! Both policies are plain data: validators take them by reference and never
//! mutate them, so each validation is a pure function of `(input, config)`.

use serde::{Deserialize, Serialize};

/// Path-validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Run the validation pipeline at all.
    pub enabled: bool,

    /// Maximum path length in bytes.
    pub max_path_length: usize,

    /// Maximum number of separators in the normalized path.
    pub max_path_depth: usize,

    /// If non-empty, a path must start with one of these prefixes.
    pub allowed_paths: Vec<String>,

    /// A path starting with any of these prefixes is rejected, even when it
    /// also matches `allowed_paths`.
    pub denied_paths: Vec<String>,

    /// Assess permission bits when analysing filesystem entries.
    pub enable_permission_checks: bool,

    /// Reject reserved device names (`CON`, `NUL`, `COM1`, ...).
    ///
    /// Defaults to on only where the platform has that device namespace.
    pub check_device_names: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_path_length: 4096,
            max_path_depth: 50,
            allowed_paths: Vec::new(),
            denied_paths: default_denied_paths(),
            enable_permission_checks: true,
            check_device_names: cfg!(windows),
        }
    }
}

impl SecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed_path(mut self, prefix: impl Into<String>) -> Self {
        self.allowed_paths.push(prefix.into());
        self
    }

    pub fn with_denied_path(mut self, prefix: impl Into<String>) -> Self {
        self.denied_paths.push(prefix.into());
        self
    }

    pub fn with_max_path_length(mut self, max: usize) -> Self {
        self.max_path_length = max;
        self
    }

    pub fn with_max_path_depth(mut self, max: usize) -> Self {
        self.max_path_depth = max;
        self
    }

    pub fn with_device_name_checks(mut self, enabled: bool) -> Self {
        self.check_device_names = enabled;
        self
    }

    /// Disable validation entirely. Intended for tests and trusted tooling.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Operating-system directories denied by default.
pub fn default_denied_paths() -> Vec<String> {
    let mut paths: Vec<String> = [
        "/etc", "/proc", "/sys", "/dev", "/boot", "/root", "/usr/bin", "/usr/sbin", "/sbin",
        "/bin",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();

    if cfg!(target_os = "macos") {
        paths.push("/System".into());
        paths.push("/private/etc".into());
    }

    if cfg!(windows) {
        paths.push("C:/Windows".into());
        paths.push("C:/Program Files".into());
        paths.push("C:/Program Files (x86)".into());
        paths.push("C:/ProgramData".into());
    }

    paths
}

/// Input-validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Policy used for path-flavoured inputs.
    pub security: SecurityConfig,

    pub validate_paths: bool,

    /// Attach a permission report to path flags that exist on disk.
    pub validate_files: bool,

    pub validate_env: bool,

    /// Environment variable name prefixes considered trusted.
    pub trusted_env_prefixes: Vec<String>,

    /// Maximum length of a single argument, in bytes.
    pub max_arg_length: usize,

    /// Maximum combined size of an argument vector, in bytes.
    pub max_total_size: usize,

    pub enable_cache: bool,

    /// Cache capacity. The cache is cleared when it fills up.
    pub cache_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            validate_paths: true,
            validate_files: true,
            validate_env: true,
            trusted_env_prefixes: default_trusted_env_prefixes(),
            max_arg_length: 4096,
            max_total_size: 64 * 1024,
            enable_cache: true,
            cache_size: 1000,
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_trusted_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trusted_env_prefixes.push(prefix.into());
        self
    }

    pub fn with_max_arg_length(mut self, max: usize) -> Self {
        self.max_arg_length = max;
        self
    }

    pub fn with_max_total_size(mut self, max: usize) -> Self {
        self.max_total_size = max;
        self
    }

    pub fn with_cache(mut self, enabled: bool, size: usize) -> Self {
        self.enable_cache = enabled;
        self.cache_size = size;
        self
    }

    pub fn without_file_checks(mut self) -> Self {
        self.validate_files = false;
        self
    }
}

fn default_trusted_env_prefixes() -> Vec<String> {
    ["SEN_", "HOME", "PATH", "USER", "LANG", "LC_", "TERM", "SHELL", "TMPDIR", "XDG_"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_defaults() {
        let config = SecurityConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_path_length, 4096);
        assert_eq!(config.max_path_depth, 50);
        assert!(config.allowed_paths.is_empty());
        assert!(config.denied_paths.iter().any(|p| p == "/etc"));
        assert_eq!(config.check_device_names, cfg!(windows));
    }

    #[test]
    fn test_validation_defaults() {
        let config = ValidationConfig::default();
        assert_eq!(config.max_arg_length, 4096);
        assert_eq!(config.max_total_size, 65536);
        assert!(config.trusted_env_prefixes.iter().any(|p| p == "SEN_"));
        assert!(config.enable_cache);
    }

    #[test]
    fn test_builders() {
        let config = SecurityConfig::new()
            .with_allowed_path("/srv/app")
            .with_max_path_depth(5);
        assert_eq!(config.allowed_paths, vec!["/srv/app".to_string()]);
        assert_eq!(config.max_path_depth, 5);

        let validation = ValidationConfig::new().with_cache(false, 0).without_file_checks();
        assert!(!validation.enable_cache);
        assert!(!validation.validate_files);
    }

    #[test]
    fn test_partial_json() {
        let config: ValidationConfig =
            sen::config::from_json_str(r#"{"max_arg_length": 128, "security": {"max_path_depth": 8}}"#)
                .unwrap();
        assert_eq!(config.max_arg_length, 128);
        assert_eq!(config.security.max_path_depth, 8);
        assert_eq!(config.security.max_path_length, 4096);
    }
}

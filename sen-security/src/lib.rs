//! Security validation for sen-rs CLIs
//!
//! Three layers, each usable on its own:
//!
//! - [`validate_secure_path`]: lexical path checks (traversal, system
//!   directories, control characters, device names, allow/deny lists)
//! - [`analyze_file_permissions`]: a permission and ownership report for an
//!   existing filesystem entry
//! - [`InputValidator`]: flag values, environment variables and file
//!   operations, with a bounded result cache
//!
//! All policy lives in [`SecurityConfig`] and [`ValidationConfig`], which load
//! from JSON with missing fields defaulted.
//!
//! # Example
//!
//! ```
//! use sen_security::{InputValidator, SecurityConfig, ValidationConfig};
//!
//! let config = ValidationConfig::default()
//!     .with_security(SecurityConfig::default().with_denied_path("/srv/secrets"));
//! let validator = InputValidator::new(config);
//!
//! let out = validator.validate_path_flag("out", "/srv/secrets/key.pem");
//! assert!(!out.valid);
//! ```

pub mod config;
pub mod input;
pub mod path;
pub mod permission;
pub mod risk;

pub use config::{default_denied_paths, SecurityConfig, ValidationConfig};
pub use input::{
    find_dangerous_pattern, CacheStats, InputValidator, RecommendedAction, ValidatedInput,
};
pub use path::{
    is_reserved_device_name, normalize_path, validate_secure_os_path, validate_secure_path,
    validate_secure_path_bytes, PathSecurityResult,
};
pub use permission::{
    analyze_file_permissions, assess_risk, EntryKind, FileOperation, FilePermission,
    PermissionError,
};
pub use risk::RiskLevel;

//! # SEN: Script to System CLI Engine
//!
//! Core support shared by the SEN crates:
//!
//! - [`Error`]: the tagged error value every subsystem reports through
//! - [`tracing_support`]: structured logging setup
//! - [`config`]: JSON configuration loading
//!
//! The security validators live in `sen-security` and the native plugin host
//! in `sen-plugin-host`; both build on the types defined here.
//!
//! ```
//! use sen::{Error, ErrorCode};
//!
//! fn check(flag: &str) -> sen::Result<()> {
//!     if flag.contains("..") {
//!         return Err(Error::validation("dangerous traversal pattern detected")
//!             .with_context("flag", "--path"));
//!     }
//!     Ok(())
//! }
//!
//! let err = check("../secret").unwrap_err();
//! assert_eq!(err.code(), ErrorCode::Validation);
//! ```

pub mod config;
pub mod error;
pub mod tracing_support;

pub use error::{display_safe, BoxError, Error, ErrorCode, Result, Severity};

// Re-export tracing itself (required for #[instrument] macro)
#[cfg(feature = "tracing")]
pub use tracing_support::tracing;

pub use tracing_support::{init_subscriber, init_subscriber_with_config, TracingConfig, TracingFormat};

#[cfg(feature = "tracing")]
pub use tracing_support::{debug, error, info, instrument, trace, warn};

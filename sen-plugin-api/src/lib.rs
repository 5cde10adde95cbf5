//! sen-plugin-api: Shared contract for native storage plugins
//!
//! This crate defines the boundary between the host and a storage plugin
//! compiled as a `cdylib`. A plugin exports two unmangled symbols:
//!
//! - [`API_VERSION_SYMBOL`]: a `u32` static holding the [`API_VERSION`] the
//!   plugin was built against
//! - [`CREATE_SYMBOL`]: a [`PluginCreateFn`] returning a heap-allocated
//!   `Box<dyn StoragePlugin>`
//!
//! Trait objects cross the boundary as Rust values, so host and plugin must be
//! built with the same compiler and the same version of this crate. The
//! version symbol catches the second mismatch; nothing can catch the first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// API version for compatibility checking
pub const API_VERSION: u32 = 1;

/// Name of the exported `u32` holding the plugin's API version
pub const API_VERSION_SYMBOL: &str = "sen_plugin_api_version";

/// Name of the exported constructor
pub const CREATE_SYMBOL: &str = "sen_plugin_create";

/// File extension of native libraries on this platform (`so`, `dylib`, `dll`)
pub const NATIVE_EXTENSION: &str = std::env::consts::DLL_EXTENSION;

/// Signature of the exported constructor.
///
/// Returns a pointer obtained from `Box::into_raw(Box::new(boxed_plugin))`, or
/// null if the plugin could not initialize. The host takes ownership.
#[allow(improper_ctypes_definitions)]
pub type PluginCreateFn = unsafe extern "C" fn() -> *mut Box<dyn StoragePlugin>;

/// A storage backend provided by a plugin.
///
/// Implementations must be thread-safe: the host shares one instance between
/// every caller holding the loaded plugin.
pub trait StoragePlugin: Send + Sync {
    /// Name the plugin registers under
    fn name(&self) -> &str;

    /// Plugin version (semver)
    fn version(&self) -> &str;

    /// Short description for listings
    fn description(&self) -> &str {
        ""
    }

    /// Fetch the value stored under `key`
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix`, in no particular order
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// Self-reported plugin identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
}

impl PluginMetadata {
    /// Flatten into the `name`/`version`/`description` map kept by the host
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("name".to_string(), self.name.clone()),
            ("version".to_string(), self.version.clone()),
            ("description".to_string(), self.description.clone()),
        ])
    }
}

/// Storage operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageOp {
    Get,
    Set,
    Delete,
    List,
}

impl StorageOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }

    fn code(&self) -> sen::ErrorCode {
        match self {
            Self::Get => sen::ErrorCode::StorageGet,
            Self::Set => sen::ErrorCode::StorageSet,
            Self::Delete => sen::ErrorCode::StorageDelete,
            Self::List => sen::ErrorCode::StorageList,
        }
    }
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by storage plugins
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("storage provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("storage {op} failed for key {key}: {message}")]
    Operation {
        op: StorageOp,
        key: String,
        message: String,
        #[source]
        source: Option<sen::BoxError>,
    },
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn operation(op: StorageOp, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            op,
            key: key.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause to an [`StorageError::Operation`].
    pub fn with_source(self, cause: impl Into<sen::BoxError>) -> Self {
        match self {
            Self::Operation {
                op, key, message, ..
            } => Self::Operation {
                op,
                key,
                message,
                source: Some(cause.into()),
            },
            other => other,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<StorageError> for sen::Error {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::NotFound { key } => {
                sen::Error::new(sen::ErrorCode::StorageNotFound, message)
                    .with_severity(sen::Severity::Warning)
                    .with_context("key", key)
            }
            StorageError::Unavailable { provider, .. } => {
                sen::Error::new(sen::ErrorCode::StorageUnavailable, message)
                    .with_context("provider", provider)
                    .with_user_message("The storage backend is not reachable right now")
                    .retryable(true)
            }
            StorageError::Operation {
                op, key, source, ..
            } => {
                let error = sen::Error::new(op.code(), message)
                    .with_context("operation", op.as_str())
                    .with_context("key", key);
                match source {
                    Some(source) => error.with_source(source),
                    None => error,
                }
            }
        }
    }
}

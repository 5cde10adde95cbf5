//! Plugin host errors

use crate::context::ContextError;
use crate::discovery::DiscoveryError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of [`PluginManager::load_plugin`](crate::PluginManager::load_plugin)
/// that rejected a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    /// The path string failed security validation
    Path,
    /// The file is outside every allowed directory
    Location,
    /// Signature policy
    Signature,
    /// File type or size
    File,
    /// Permission bits on the file
    Permissions,
    /// Computing the digest
    Checksum,
    /// Opening the native library
    Open,
    /// A required symbol is missing
    Symbol,
    /// The plugin targets a different API version
    ApiVersion,
    /// The constructor returned nothing usable
    Construct,
    /// The plugin could not be registered under its name
    Register,
}

impl LoadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Location => "location",
            Self::Signature => "signature",
            Self::File => "file",
            Self::Permissions => "permissions",
            Self::Checksum => "checksum",
            Self::Open => "open",
            Self::Symbol => "symbol",
            Self::ApiVersion => "api_version",
            Self::Construct => "construct",
            Self::Register => "register",
        }
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from plugin management
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("absolute path required: {}", .path.display())]
    RelativePath { path: PathBuf },

    #[error("failed to load plugin {} ({stage}): {reason}", .path.display())]
    Load {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
        #[source]
        source: Option<sen::BoxError>,
    },

    #[error("plugin not loaded: {0}")]
    NotLoaded(String),

    #[error("no plugin found for storage provider '{0}'")]
    ProviderNotFound(String),

    #[error(transparent)]
    Interrupted(#[from] ContextError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("plugin task failed: {0}")]
    Join(#[source] tokio::task::JoinError),
}

impl PluginError {
    pub fn load(path: impl Into<PathBuf>, stage: LoadStage, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            stage,
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach the underlying cause to a [`PluginError::Load`].
    pub fn with_source(self, cause: impl Into<sen::BoxError>) -> Self {
        match self {
            Self::Load {
                path,
                stage,
                reason,
                ..
            } => Self::Load {
                path,
                stage,
                reason,
                source: Some(cause.into()),
            },
            other => other,
        }
    }

    /// Stage that failed, for load errors
    pub fn stage(&self) -> Option<LoadStage> {
        match self {
            Self::Load { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether the plugin was refused for a security reason rather than a
    /// runtime failure
    pub fn is_security_rejection(&self) -> bool {
        match self {
            Self::RelativePath { .. } => true,
            Self::Load { stage, .. } => matches!(
                stage,
                LoadStage::Path | LoadStage::Location | LoadStage::Signature | LoadStage::Permissions
            ),
            _ => false,
        }
    }
}

impl From<PluginError> for sen::Error {
    fn from(err: PluginError) -> Self {
        let message = err.to_string();
        match err {
            PluginError::RelativePath { path } => sen::Error::validation(message)
                .with_context("path", sen::display_safe(&path.to_string_lossy())),
            PluginError::Load {
                path,
                stage,
                source,
                ..
            } => {
                let severity = if matches!(stage, LoadStage::Path | LoadStage::Permissions) {
                    sen::Severity::Critical
                } else {
                    sen::Severity::Error
                };
                let error = sen::Error::plugin(message)
                    .with_severity(severity)
                    .with_context("path", sen::display_safe(&path.to_string_lossy()))
                    .with_context("stage", stage.as_str());
                match source {
                    Some(source) => error.with_source(source),
                    None => error,
                }
            }
            PluginError::NotLoaded(name) => {
                sen::Error::not_found(message).with_context("plugin", name)
            }
            PluginError::ProviderNotFound(provider) => sen::Error::not_found(message)
                .with_context("provider", provider)
                .with_user_message("No installed plugin provides the configured storage backend"),
            PluginError::Interrupted(e) => sen::Error::execution(message)
                .with_severity(sen::Severity::Warning)
                .retryable(e == ContextError::DeadlineExceeded)
                .with_source(e),
            PluginError::Discovery(e) => sen::Error::plugin(message).with_source(e),
            PluginError::Join(e) => sen::Error::internal(message).with_source(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_message() {
        let err = PluginError::RelativePath {
            path: PathBuf::from("relative/path.so"),
        };
        assert!(err.to_string().contains("absolute path required"));
        assert!(err.is_security_rejection());

        let err: sen::Error = err.into();
        assert_eq!(err.code(), sen::ErrorCode::Validation);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_load_error_names_stage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = PluginError::load("/opt/p/x.so", LoadStage::Checksum, "cannot read file")
            .with_source(io);
        assert_eq!(err.stage(), Some(LoadStage::Checksum));
        assert!(err.to_string().contains("(checksum)"));
        assert!(!err.is_security_rejection());

        let err: sen::Error = err.into();
        assert_eq!(err.code(), sen::ErrorCode::Plugin);
        assert_eq!(err.context_value("stage"), Some("checksum"));
        assert!(err.report().contains("caused by: denied"));
    }

    #[test]
    fn test_interrupted_conversion() {
        let err: sen::Error = PluginError::from(ContextError::DeadlineExceeded).into();
        assert_eq!(err.code(), sen::ErrorCode::Execution);
        assert!(err.is_retryable());

        let err: sen::Error = PluginError::from(ContextError::Cancelled).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_codes() {
        let err: sen::Error = PluginError::NotLoaded("redis".into()).into();
        assert_eq!(err.code(), sen::ErrorCode::NotFound);
        assert_eq!(err.context_value("plugin"), Some("redis"));

        let err: sen::Error = PluginError::ProviderNotFound("s3".into()).into();
        assert_eq!(err.context_value("provider"), Some("s3"));
    }
}

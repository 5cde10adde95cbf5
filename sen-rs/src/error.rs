//! Tagged error values.
//!
//! Every failure surfaced by the framework is an [`Error`]: a stable
//! machine-readable [`ErrorCode`], a diagnostic message, a [`Severity`], an
//! optional message meant for end users, ordered key/value context and a
//! retryable flag. Subsystems keep their own `thiserror` enums and convert
//! into this type at their public boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Boxed error source carried by [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias using the framework error.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Input or policy validation failed.
    Validation,
    /// A command or operation failed while running.
    Execution,
    /// A named resource does not exist.
    NotFound,
    /// Unexpected internal failure.
    Internal,
    /// Plugin discovery, validation or loading failed.
    Plugin,
    /// Storage backend failed to read a key.
    StorageGet,
    /// Storage backend failed to write a key.
    StorageSet,
    /// Storage backend failed to delete a key.
    StorageDelete,
    /// Storage backend failed to list keys.
    StorageList,
    /// Storage backend has no such key.
    StorageNotFound,
    /// Storage backend cannot be reached.
    StorageUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Plugin => "plugin",
            Self::StorageGet => "storage_get",
            Self::StorageSet => "storage_set",
            Self::StorageDelete => "storage_delete",
            Self::StorageList => "storage_list",
            Self::StorageNotFound => "storage_not_found",
            Self::StorageUnavailable => "storage_unavailable",
        }
    }

    /// Whether the code belongs to the storage family.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageGet
                | Self::StorageSet
                | Self::StorageDelete
                | Self::StorageList
                | Self::StorageNotFound
                | Self::StorageUnavailable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framework error.
///
/// # Example
///
/// ```
/// use sen::{Error, ErrorCode, Severity};
///
/// let err = Error::validation("dangerous traversal pattern detected")
///     .with_context("flag", "--config")
///     .with_severity(Severity::Critical)
///     .with_user_message("The --config path may not leave the project directory");
///
/// assert_eq!(err.code(), ErrorCode::Validation);
/// assert_eq!(err.context_value("flag"), Some("--config"));
/// assert_eq!(err.exit_code(), 1);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    severity: Severity,
    user_message: Option<String>,
    context: Vec<(String, String)>,
    retryable: bool,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Create an error with the default severity (`error`).
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Error,
            user_message: None,
            context: Vec::new(),
            retryable: false,
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Execution, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message).with_severity(Severity::Critical)
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Plugin, message)
    }

    /// Attach a key/value pair. Later values for the same key replace earlier ones.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.context.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.context.push((key, value)),
        }
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Message for end users, falling back to the diagnostic message.
    pub fn user_message(&self) -> &str {
        self.user_message.as_deref().unwrap_or(&self.message)
    }

    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// User-fixable errors exit with 1, system failures with 101.
    pub fn exit_code(&self) -> i32 {
        if self.is_user_error() {
            1
        } else {
            101
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Validation | ErrorCode::NotFound | ErrorCode::StorageNotFound
        )
    }

    /// Multi-line rendering for terminals: message, context and cause chain.
    pub fn report(&self) -> String {
        let mut out = format!("Error [{}]: {}", self.code, self.user_message());
        if self.user_message.is_some() {
            out.push_str(&format!("\n  detail: {}", self.message));
        }
        for (key, value) in &self.context {
            out.push_str(&format!("\n  {}: {}", key, value));
        }
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }
        out
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let code = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCode::NotFound
        } else {
            ErrorCode::Internal
        };
        Error::new(code, format!("I/O operation failed: {}", e)).with_source(e)
    }
}

const DISPLAY_SAFE_LIMIT: usize = 64;

/// Render untrusted text for logs and messages.
///
/// Non-printable characters are escaped and the result is truncated, so raw
/// attacker-controlled bytes never reach a terminal or log file verbatim.
pub fn display_safe(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(DISPLAY_SAFE_LIMIT) + 8);
    for (count, c) in input.chars().enumerate() {
        if count == DISPLAY_SAFE_LIMIT {
            out.push_str("...");
            break;
        }
        if c.is_control() || c == '\u{FFFD}' {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let err = Error::plugin("load failed")
            .with_context("stage", "open")
            .with_context("plugin", "redis")
            .retryable(true);

        assert_eq!(err.code(), ErrorCode::Plugin);
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.context_value("stage"), Some("open"));
        assert_eq!(err.context().len(), 2);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "load failed");
    }

    #[test]
    fn test_context_replaces_existing_key() {
        let err = Error::validation("bad")
            .with_context("flag", "a")
            .with_context("flag", "b");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context_value("flag"), Some("b"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::validation("x").exit_code(), 1);
        assert_eq!(Error::not_found("x").exit_code(), 1);
        assert_eq!(Error::internal("x").exit_code(), 101);
        assert_eq!(Error::plugin("x").exit_code(), 101);
    }

    #[test]
    fn test_user_message_fallback() {
        let err = Error::validation("diagnostic");
        assert_eq!(err.user_message(), "diagnostic");

        let err = err.with_user_message("friendly");
        assert_eq!(err.user_message(), "friendly");
        assert_eq!(err.message(), "diagnostic");
    }

    #[test]
    fn test_report_includes_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::plugin("cannot open plugin")
            .with_context("path", "/opt/p.so")
            .with_source(io);

        let report = err.report();
        assert!(report.contains("Error [plugin]: cannot open plugin"));
        assert!(report.contains("path: /opt/p.so"));
        assert!(report.contains("caused by: denied"));
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_storage_codes() {
        assert!(ErrorCode::StorageGet.is_storage());
        assert!(ErrorCode::StorageUnavailable.is_storage());
        assert!(!ErrorCode::Plugin.is_storage());
        assert_eq!(ErrorCode::StorageNotFound.to_string(), "storage_not_found");
    }

    #[test]
    fn test_display_safe_escapes_and_truncates() {
        assert_eq!(display_safe("abc\x00\x1b"), "abc\\u{0}\\u{1b}");
        let long = "a".repeat(200);
        let shown = display_safe(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.len(), DISPLAY_SAFE_LIMIT + 3);
    }
}

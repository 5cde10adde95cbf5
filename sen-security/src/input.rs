//! Input validation for flag values and environment variables
//!
//! Every entry point follows the same flow:
//!
//! ```text
//! cache lookup ─▶ basic checks ─▶ type-specific checks ─▶ sanitize ─▶ cache store
//! ```
//!
//! Basic checks cap the length and reject null bytes and control characters
//! other than tab, LF and CR. A fixed dangerous-substring list (`$(`, backtick,
//! `;`, `|`, `&`, `<script`, SQL comment and DDL keywords, ...) rejects generic
//! string input outright. A broader precompiled matcher for shell
//! metacharacters, parent-directory markers and percent-encoded octets only
//! produces warnings.
//!
//! The result cache is bounded and is cleared entirely when it fills up.
//! Results that depend on filesystem state are never cached.

use crate::config::ValidationConfig;
use crate::path::{contains_ignore_ascii_case, validate_secure_path};
use crate::permission::{analyze_file_permissions, FileOperation, FilePermission};
use crate::risk::RiskLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Substrings that reject generic string input. Longer operators come first so
/// the reported pattern is the most specific one.
const DANGEROUS_PATTERNS: &[&str] = &[
    "$(",
    "`",
    "&&",
    "||",
    ";",
    "|",
    "&",
    "<script",
    "javascript:",
    "/*",
    "*/",
    "-- ",
    "drop table",
    "drop database",
    "truncate table",
    "alter table",
    "delete from",
    "insert into",
    "union select",
    "xp_cmdshell",
];

const SUSPICIOUS_PATTERN: &str = r"[;&|`$(){}\[\]<>]|\.\./|\.\.\\|%[0-9A-Fa-f]{2}";

/// Variable name suffixes whose values are validated as paths.
const PATH_ENV_SUFFIXES: &[&str] = &["_PATH", "_DIR", "_FILE"];

/// What a caller should do with a validated input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Proceed,
    ProceedWithCaution,
    ReviewPermissions,
    RejectInput,
    RejectDangerousPath,
    RejectUntrustedEnv,
    DenyOperation,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::ProceedWithCaution => "proceed_with_caution",
            Self::ReviewPermissions => "review_permissions",
            Self::RejectInput => "reject_input",
            Self::RejectDangerousPath => "reject_dangerous_path",
            Self::RejectUntrustedEnv => "reject_untrusted_env",
            Self::DenyOperation => "deny_operation",
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RejectInput
                | Self::RejectDangerousPath
                | Self::RejectUntrustedEnv
                | Self::DenyOperation
        )
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedInput {
    pub original: String,
    pub sanitized: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub permission: Option<FilePermission>,
    pub recommended_action: RecommendedAction,
}

impl ValidatedInput {
    fn new(original: &str) -> Self {
        Self {
            original: original.to_owned(),
            sanitized: String::new(),
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            permission: None,
            recommended_action: RecommendedAction::Proceed,
        }
    }

    fn reject(&mut self, action: RecommendedAction, error: impl Into<String>) {
        self.valid = false;
        self.errors.push(error.into());
        if !self.recommended_action.is_rejection() {
            self.recommended_action = action;
        }
    }

    fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Settle the action for inputs that survived every check.
    fn finish(mut self, cautious: RecommendedAction) -> Self {
        if self.valid && !self.warnings.is_empty() && self.recommended_action == RecommendedAction::Proceed {
            self.recommended_action = cautious;
        }
        self
    }

    /// Convert into a validation error if the input was rejected.
    pub fn into_result(self) -> sen::Result<String> {
        if self.valid {
            return Ok(self.sanitized);
        }
        Err(sen::Error::validation(format!(
            "input rejected: {}",
            self.errors.join("; ")
        ))
        .with_context("action", self.recommended_action.as_str())
        .with_context("value", sen::display_safe(&self.original)))
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Number of times the cache was full and got cleared.
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Validates flag values, environment variables and file operations.
///
/// # Example
///
/// ```
/// use sen_security::{InputValidator, ValidationConfig};
///
/// let validator = InputValidator::new(ValidationConfig::default());
///
/// assert!(validator.validate_input("release-2024").is_ok());
/// assert!(validator.validate_input("$(rm -rf /)").is_err());
///
/// let output = validator.validate_path_flag("output", "reports/q3.csv");
/// assert!(output.valid);
/// ```
#[derive(Debug)]
pub struct InputValidator {
    config: ValidationConfig,
    suspicious: Option<Regex>,
    cache: RwLock<HashMap<String, ValidatedInput>>,
    counters: CacheCounters,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl InputValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let suspicious = match Regex::new(SUSPICIOUS_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "suspicious-input matcher unavailable");
                None
            }
        };

        Self {
            config,
            suspicious,
            cache: RwLock::new(HashMap::new()),
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a generic string flag value.
    pub fn validate_string_flag(&self, name: &str, value: &str) -> ValidatedInput {
        self.cached("string", name, value, || {
            let mut result = ValidatedInput::new(value);
            self.basic_checks(value, &mut result);

            if let Some(pattern) = find_dangerous_pattern(value) {
                result.reject(
                    RecommendedAction::RejectInput,
                    format!("dangerous injection pattern detected: '{}'", pattern),
                );
            }
            if self.is_suspicious(value) {
                result.warn("value contains shell metacharacters or encoded sequences");
            }

            result.sanitized = self.sanitize(value);
            if !result.valid {
                tracing::warn!(
                    flag = %sen::display_safe(name),
                    reason = %result.errors.join("; "),
                    "string flag rejected"
                );
            }
            result.finish(RecommendedAction::ProceedWithCaution)
        })
    }

    /// Validate a flag whose value is a filesystem path.
    ///
    /// When file checks are enabled and the path exists, a permission report
    /// is attached and high-risk permissions raise a warning.
    pub fn validate_path_flag(&self, name: &str, value: &str) -> ValidatedInput {
        let compute = || {
            let mut result = ValidatedInput::new(value);
            self.basic_checks(value, &mut result);

            if !self.config.validate_paths {
                result.sanitized = self.sanitize(value);
                return result.finish(RecommendedAction::ProceedWithCaution);
            }

            let path = validate_secure_path(value, &self.config.security);
            result.warnings.extend(path.warnings.iter().cloned());
            if !path.valid {
                for error in &path.errors {
                    result.reject(RecommendedAction::RejectDangerousPath, error.clone());
                }
                result.sanitized = self.sanitize(value);
                tracing::warn!(
                    flag = %sen::display_safe(name),
                    risk = %path.risk,
                    reason = %path.errors.join("; "),
                    "path flag rejected"
                );
                return result;
            }

            result.sanitized = path.normalized_path;
            if result.valid && self.config.validate_files {
                self.attach_permission(&mut result);
            }
            result.finish(RecommendedAction::ProceedWithCaution)
        };

        if self.config.validate_files {
            compute()
        } else {
            self.cached("path", name, value, compute)
        }
    }

    /// Validate an environment variable value.
    ///
    /// Values of untrusted variables get a warning, and are rejected if they
    /// also contain a dangerous pattern.
    pub fn validate_environment_value(&self, name: &str, value: &str) -> ValidatedInput {
        self.cached("env", name, value, || {
            let mut result = ValidatedInput::new(value);
            self.basic_checks(value, &mut result);

            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                result.reject(
                    RecommendedAction::RejectInput,
                    format!(
                        "invalid environment variable name '{}'",
                        sen::display_safe(name)
                    ),
                );
            }

            if self.config.validate_env {
                let trusted = self.is_trusted_env(name);
                let dangerous = find_dangerous_pattern(value);

                match (trusted, dangerous) {
                    (false, Some(pattern)) => {
                        result.warn(format!(
                            "environment variable '{}' is not from a trusted source",
                            sen::display_safe(name)
                        ));
                        result.reject(
                            RecommendedAction::RejectUntrustedEnv,
                            format!(
                                "untrusted environment value contains dangerous pattern: '{}'",
                                pattern
                            ),
                        );
                    }
                    (false, None) => result.warn(format!(
                        "environment variable '{}' is not from a trusted source",
                        sen::display_safe(name)
                    )),
                    (true, Some(pattern)) => result.warn(format!(
                        "environment value contains pattern '{}'",
                        pattern
                    )),
                    (true, None) => {}
                }

                if self.config.validate_paths && is_path_env(name) && !value.is_empty() {
                    let path = validate_secure_path(value, &self.config.security);
                    for error in path.errors {
                        result.reject(RecommendedAction::RejectDangerousPath, error);
                    }
                }
            }

            result.sanitized = self.sanitize(value);
            result.finish(RecommendedAction::ProceedWithCaution)
        })
    }

    /// Validate a path and check that `operation` is permitted on it.
    ///
    /// A write to a file that does not exist yet is checked against its
    /// parent directory.
    pub fn validate_file_operation(&self, path: &str, operation: FileOperation) -> ValidatedInput {
        let mut result = ValidatedInput::new(path);
        self.basic_checks(path, &mut result);
        if !result.valid {
            result.sanitized = self.sanitize(path);
            return result;
        }

        let validated = validate_secure_path(path, &self.config.security);
        if !validated.valid {
            for error in validated.errors {
                result.reject(RecommendedAction::RejectDangerousPath, error);
            }
            result.sanitized = self.sanitize(path);
            return result;
        }
        result.sanitized = validated.normalized_path.clone();

        let target = validated.normalized_path;
        let inspect = if operation == FileOperation::Write && !Path::new(&target).exists() {
            match Path::new(&target).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    parent.to_string_lossy().into_owned()
                }
                _ => ".".to_string(),
            }
        } else {
            target
        };

        let permission = match analyze_file_permissions(&inspect, &self.config.security) {
            Ok(permission) => permission,
            Err(e) => {
                result.reject(
                    RecommendedAction::DenyOperation,
                    format!("cannot analyze permissions: {}", e),
                );
                return result;
            }
        };

        match operation {
            FileOperation::Read if !permission.readable => {
                result.reject(RecommendedAction::DenyOperation, "file is not readable");
            }
            FileOperation::Write if !permission.writable || permission.read_only => {
                result.reject(RecommendedAction::DenyOperation, "file is not writable");
            }
            FileOperation::Execute => {
                if !permission.executable {
                    result.reject(RecommendedAction::DenyOperation, "file is not executable");
                } else if permission.writable {
                    result.warn("file is both writable and executable");
                }
            }
            _ => {}
        }

        if permission.risk >= RiskLevel::High {
            result.warn(format!(
                "file permissions carry {} risk: {}",
                permission.risk, permission.recommendation
            ));
        }

        result.permission = Some(permission);
        result.finish(RecommendedAction::ReviewPermissions)
    }

    /// Boolean-style check used by generic callers.
    pub fn validate_input(&self, text: &str) -> sen::Result<()> {
        let result = self.validate_string_flag("input", text);
        if result.valid {
            return Ok(());
        }
        let severity = if find_dangerous_pattern(text).is_some() {
            sen::Severity::Critical
        } else {
            sen::Severity::Error
        };
        result.into_result().map(|_| ()).map_err(|e| e.with_severity(severity))
    }

    /// Validate a whole argument vector, including its combined size.
    pub fn validate_args(&self, args: &[String]) -> sen::Result<()> {
        let total: usize = args.iter().map(String::len).sum();
        if total > self.config.max_total_size {
            return Err(sen::Error::validation(format!(
                "arguments total {} bytes, exceeding maximum of {}",
                total, self.config.max_total_size
            )));
        }
        for (index, arg) in args.iter().enumerate() {
            self.validate_input(arg)
                .map_err(|e| e.with_context("index", index.to_string()))?;
        }
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        let entries = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len();
        CacheStats {
            entries,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn cached(
        &self,
        kind: &str,
        name: &str,
        value: &str,
        compute: impl FnOnce() -> ValidatedInput,
    ) -> ValidatedInput {
        if !self.config.enable_cache || self.config.cache_size == 0 {
            return compute();
        }

        let key = format!("{}:{}\u{0}{}", kind, name, value);
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return hit.clone();
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let result = compute();

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.len() >= self.config.cache_size {
            cache.clear();
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.insert(key, result.clone());
        result
    }

    fn basic_checks(&self, value: &str, result: &mut ValidatedInput) {
        if value.len() > self.config.max_arg_length {
            result.reject(
                RecommendedAction::RejectInput,
                format!(
                    "input length {} exceeds maximum of {}",
                    value.len(),
                    self.config.max_arg_length
                ),
            );
        }
        if value.contains('\0') {
            result.reject(RecommendedAction::RejectInput, "input contains null byte");
        }
        if value.chars().any(is_disallowed_control) {
            result.reject(
                RecommendedAction::RejectInput,
                "input contains control characters",
            );
        }
    }

    fn is_suspicious(&self, value: &str) -> bool {
        self.suspicious
            .as_ref()
            .map(|regex| regex.is_match(value))
            .unwrap_or(false)
    }

    fn attach_permission(&self, result: &mut ValidatedInput) {
        if !Path::new(&result.sanitized).exists() {
            return;
        }
        match analyze_file_permissions(&result.sanitized, &self.config.security) {
            Ok(permission) => {
                if permission.risk >= RiskLevel::High {
                    result.warn(format!(
                        "file permissions carry {} risk: {}",
                        permission.risk, permission.recommendation
                    ));
                    result.recommended_action = RecommendedAction::ReviewPermissions;
                }
                result.permission = Some(permission);
            }
            Err(e) => result.warn(format!("cannot analyze permissions: {}", e)),
        }
    }

    fn is_trusted_env(&self, name: &str) -> bool {
        self.config
            .trusted_env_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
    }

    /// Drop null bytes and disallowed control characters, trim surrounding
    /// whitespace and cap the length.
    fn sanitize(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len().min(self.config.max_arg_length));
        for c in value.trim().chars() {
            if c == '\0' || is_disallowed_control(c) {
                continue;
            }
            if out.len() + c.len_utf8() > self.config.max_arg_length {
                break;
            }
            out.push(c);
        }
        out
    }
}

fn is_disallowed_control(c: char) -> bool {
    c != '\0' && c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

fn is_path_env(name: &str) -> bool {
    PATH_ENV_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// First dangerous pattern contained in `value`, compared case-insensitively.
pub fn find_dangerous_pattern(value: &str) -> Option<&'static str> {
    DANGEROUS_PATTERNS
        .iter()
        .find(|pattern| contains_ignore_ascii_case(value, pattern))
        .copied()
}

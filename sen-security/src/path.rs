//! Path validation
//!
//! [`validate_secure_path`] classifies a path string as safe or unsafe. It runs
//! a fixed pipeline of independent layers and stops at the first failure,
//! cheapest and most dangerous checks first:
//!
//! ```text
//!  empty ─▶ length ─▶ normalize ─▶ traversal ─▶ depth ─▶ control chars
//!                                                              │
//!   allow/deny ◀─ alternate data streams ◀─ system paths ◀─ device names
//! ```
//!
//! Every layer after normalization inspects the normalized form, so
//! `config/../app.yaml` is judged as `app.yaml`. Encoded traversal markers are
//! matched as substrings of the text as given; nothing is URL-decoded.
//!
//! The validator never panics and never touches the filesystem.
//!
//! # Example
//!
//! ```
//! use sen_security::{validate_secure_path, RiskLevel, SecurityConfig};
//!
//! let config = SecurityConfig::default();
//!
//! let ok = validate_secure_path("config/app.yaml", &config);
//! assert!(ok.valid);
//! assert_eq!(ok.normalized_path, "config/app.yaml");
//!
//! let bad = validate_secure_path("../../../etc/passwd", &config);
//! assert!(!bad.valid);
//! assert_eq!(bad.risk, RiskLevel::Critical);
//! ```

use crate::config::SecurityConfig;
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// Substrings that mark a traversal attempt (compared case-insensitively).
const TRAVERSAL_PATTERNS: &[&str] = &["..", "../", "..\\", "%2e%2e", "%252e%252e"];

/// Directory prefixes that are never valid targets (lowercase, `/`-separated).
const SYSTEM_PREFIXES: &[&str] = &[
    "/etc/",
    "/proc/",
    "/sys/",
    "/dev/",
    "/boot/",
    "/root/",
    "/usr/bin/",
    "/usr/sbin/",
    "/sbin/",
    "/bin/",
    "/system/",
    "/private/etc/",
    "/private/var/db/",
    "c:/windows/",
    "c:/program files/",
    "c:/program files (x86)/",
    "c:/programdata/",
];

/// Individual files that are never valid targets (exact or prefix match).
const SENSITIVE_FILES: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    "/etc/gshadow",
    "/etc/master.passwd",
    "c:/windows/system32/config/sam",
    "c:/boot.ini",
];

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "CONIN$", "CONOUT$", "COM1", "COM2", "COM3", "COM4", "COM5",
    "COM6", "COM7", "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7",
    "LPT8", "LPT9",
];

/// Outcome of one path validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSecurityResult {
    pub original_path: String,
    pub valid: bool,
    pub normalized_path: String,
    /// Non-empty whenever `valid` is false.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub risk: RiskLevel,
}

impl PathSecurityResult {
    fn accept(original: &str, normalized: Cow<'_, str>) -> Self {
        Self {
            original_path: original.to_owned(),
            valid: true,
            normalized_path: normalized.into_owned(),
            errors: Vec::new(),
            warnings: Vec::new(),
            risk: RiskLevel::Low,
        }
    }

    fn reject(original: &str, normalized: &str, risk: RiskLevel, error: String) -> Self {
        tracing::debug!(
            path = %sen::display_safe(original),
            risk = %risk,
            reason = %error,
            "path rejected"
        );
        Self {
            original_path: original.to_owned(),
            valid: false,
            normalized_path: normalized.to_owned(),
            errors: vec![error],
            warnings: Vec::new(),
            risk,
        }
    }

    /// First error message, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    /// Convert into the normalized path, or a validation error describing the
    /// failing check.
    pub fn into_result(self) -> sen::Result<String> {
        if self.valid {
            return Ok(self.normalized_path);
        }
        let reason = self
            .errors
            .first()
            .cloned()
            .unwrap_or_else(|| "path failed validation".to_string());
        Err(sen::Error::validation(reason)
            .with_severity(self.risk.severity())
            .with_context("path", sen::display_safe(&self.original_path))
            .with_context("risk", self.risk.as_str()))
    }
}

/// Validate a path against `config`. Never fails and never panics.
pub fn validate_secure_path(path: &str, config: &SecurityConfig) -> PathSecurityResult {
    if !config.enabled {
        let mut result = PathSecurityResult::accept(path, normalize_path(path));
        result
            .warnings
            .push("path validation is disabled".to_string());
        return result;
    }

    if path.is_empty() {
        return PathSecurityResult::reject(path, "", RiskLevel::Low, "path is empty".to_string());
    }

    if path.len() > config.max_path_length {
        return PathSecurityResult::reject(
            path,
            "",
            RiskLevel::Medium,
            format!(
                "path length {} exceeds maximum of {}",
                path.len(),
                config.max_path_length
            ),
        );
    }

    let normalized = normalize_path(path);
    let norm: &str = &normalized;

    if TRAVERSAL_PATTERNS
        .iter()
        .any(|pattern| contains_ignore_ascii_case(norm, pattern))
    {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::Critical,
            "dangerous traversal pattern detected".to_string(),
        );
    }

    let depth = norm.bytes().filter(|b| is_separator(*b)).count();
    if depth > config.max_path_depth {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::Medium,
            format!(
                "path depth {} exceeds maximum of {}",
                depth, config.max_path_depth
            ),
        );
    }

    // Normalization only drops characters, so scanning the input covers the
    // normalized form as well.
    if path.chars().any(is_forbidden_control) {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::High,
            "path contains control characters".to_string(),
        );
    }

    if config.check_device_names {
        if let Some(segment) = segments(norm).find(|s| is_reserved_device_name(s)) {
            return PathSecurityResult::reject(
                path,
                norm,
                RiskLevel::High,
                format!(
                    "path uses reserved device name '{}'",
                    sen::display_safe(segment)
                ),
            );
        }
    }

    if let Some(prefix) = matching_system_path(norm) {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::Critical,
            format!("access to system path '{}' is not allowed", prefix),
        );
    }

    if has_alternate_data_stream(norm) {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::High,
            "alternate data stream notation detected".to_string(),
        );
    }

    if let Some(denied) = config
        .denied_paths
        .iter()
        .find(|d| has_path_prefix(norm, &normalize_path(d), true))
    {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::High,
            format!("path matches denied prefix '{}'", denied),
        );
    }

    if !config.allowed_paths.is_empty()
        && !config
            .allowed_paths
            .iter()
            .any(|a| has_path_prefix(norm, &normalize_path(a), false))
    {
        return PathSecurityResult::reject(
            path,
            norm,
            RiskLevel::Medium,
            "path is outside the allowed directories".to_string(),
        );
    }

    PathSecurityResult::accept(path, normalized)
}

/// Validate raw bytes, rejecting anything that is not UTF-8.
pub fn validate_secure_path_bytes(path: &[u8], config: &SecurityConfig) -> PathSecurityResult {
    match std::str::from_utf8(path) {
        Ok(text) => validate_secure_path(text, config),
        Err(_) => {
            let lossy = String::from_utf8_lossy(path);
            PathSecurityResult::reject(
                &lossy,
                "",
                RiskLevel::High,
                "path is not valid UTF-8".to_string(),
            )
        }
    }
}

/// Validate a platform path.
pub fn validate_secure_os_path(path: &Path, config: &SecurityConfig) -> PathSecurityResult {
    if let Some(text) = path.to_str() {
        return validate_secure_path(text, config);
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        validate_secure_path_bytes(path.as_os_str().as_bytes(), config)
    }

    #[cfg(not(unix))]
    {
        let lossy = path.to_string_lossy();
        PathSecurityResult::reject(
            &lossy,
            "",
            RiskLevel::High,
            "path is not valid Unicode".to_string(),
        )
    }
}

/// Lexically clean a path: collapse separators, drop `.` segments and resolve
/// `..` against preceding segments. Leading `..` segments of a relative path
/// are kept. Borrows when the input is already clean.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if is_clean(path) {
        return Cow::Borrowed(path);
    }

    let unified: Cow<'_, str> = if cfg!(windows) && path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    };

    let rooted = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    let cleaned = if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    };
    Cow::Owned(cleaned)
}

fn is_clean(path: &str) -> bool {
    if path == "/" || path == "." {
        return true;
    }
    if path.is_empty() || path.ends_with('/') {
        return false;
    }
    if cfg!(windows) && path.contains('\\') {
        return false;
    }

    let (rooted, body) = match path.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, path),
    };

    let mut seen_normal = false;
    for segment in body.split('/') {
        match segment {
            "" | "." => return false,
            ".." if rooted || seen_normal => return false,
            ".." => {}
            _ => seen_normal = true,
        }
    }
    true
}

/// Whether `segment` names a legacy device (`CON`, `nul.txt`, `COM1`, ...).
///
/// The extension and any trailing dots or spaces are ignored, as the platform
/// itself ignores them.
pub fn is_reserved_device_name(segment: &str) -> bool {
    let stem = segment.split('.').next().unwrap_or(segment);
    let stem = stem.trim_end_matches([' ', '.']);
    RESERVED_DEVICE_NAMES
        .iter()
        .any(|name| stem.eq_ignore_ascii_case(name))
}

fn is_forbidden_control(c: char) -> bool {
    let code = c as u32;
    code < 32 || code == 127 || (128..=159).contains(&code)
}

fn is_separator(b: u8) -> bool {
    b == b'/' || b == b'\\'
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}

fn matching_system_path(path: &str) -> Option<&'static str> {
    SYSTEM_PREFIXES
        .iter()
        .find(|prefix| {
            starts_with_path_ci(path, prefix)
                || equals_path_ci(path, prefix.trim_end_matches('/'))
        })
        .or_else(|| {
            SENSITIVE_FILES
                .iter()
                .find(|file| starts_with_path_ci(path, file))
        })
        .copied()
}

/// A colon is only legal as the single drive marker of the first segment.
fn has_alternate_data_stream(path: &str) -> bool {
    path.split(['/', '\\']).enumerate().any(|(index, segment)| {
        if !segment.contains(':') {
            return false;
        }
        let bytes = segment.as_bytes();
        let drive = index == 0 && bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
        !drive
    })
}

/// Prefix match on whole segments: `/srv/app` matches `/srv/app` and
/// `/srv/app/x` but not `/srv/application`.
fn has_path_prefix(path: &str, prefix: &str, ignore_case: bool) -> bool {
    let prefix = if prefix.len() > 1 {
        prefix.trim_end_matches('/')
    } else {
        prefix
    };
    if prefix.is_empty() || path.len() < prefix.len() {
        return false;
    }

    let head = &path.as_bytes()[..prefix.len()];
    let matched = if ignore_case {
        bytes_eq_path_ci(head, prefix.as_bytes())
    } else {
        head == prefix.as_bytes()
    };
    if !matched {
        return false;
    }

    prefix == "/" || path.len() == prefix.len() || is_separator(path.as_bytes()[prefix.len()])
}

fn starts_with_path_ci(path: &str, prefix: &str) -> bool {
    path.len() >= prefix.len() && bytes_eq_path_ci(&path.as_bytes()[..prefix.len()], prefix.as_bytes())
}

fn equals_path_ci(path: &str, other: &str) -> bool {
    path.len() == other.len() && bytes_eq_path_ci(path.as_bytes(), other.as_bytes())
}

/// Byte comparison that ignores ASCII case and treats `\` as `/`.
fn bytes_eq_path_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            let x = if *x == b'\\' { b'/' } else { x.to_ascii_lowercase() };
            let y = if *y == b'\\' { b'/' } else { y.to_ascii_lowercase() };
            x == y
        })
}

pub(crate) fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return true;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

//! File permission analysis
//!
//! [`analyze_file_permissions`] re-validates a path, inspects the entry without
//! following symbolic links and produces a [`FilePermission`] report with a
//! risk tier and a one-line remediation hint.
//!
//! Readable/writable/executable are derived from the owner permission bits.
//! This is a best-effort view: it does not resolve the effective user, group
//! membership or ACLs.

use crate::config::SecurityConfig;
use crate::path::validate_secure_path;
use crate::risk::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::str::FromStr;
use thiserror::Error;

const WORLD_WRITABLE: u32 = 0o002;
const GROUP_WRITABLE: u32 = 0o020;
const OWNER_READ: u32 = 0o400;
const OWNER_WRITE: u32 = 0o200;
const OWNER_EXEC: u32 = 0o100;
const SETUID_SETGID: u32 = 0o6000;

/// Errors from permission analysis
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("path failed security validation: {reason}")]
    InvalidPath {
        path: String,
        reason: String,
        risk: RiskLevel,
    },

    #[error("failed to inspect '{path}': {source}")]
    Inspect {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<PermissionError> for sen::Error {
    fn from(err: PermissionError) -> Self {
        let (code, path, risk) = match &err {
            PermissionError::InvalidPath { path, risk, .. } => {
                (sen::ErrorCode::Validation, path.clone(), Some(*risk))
            }
            PermissionError::Inspect { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                (sen::ErrorCode::NotFound, path.clone(), None)
            }
            PermissionError::Inspect { path, .. } => {
                (sen::ErrorCode::Execution, path.clone(), None)
            }
        };

        let error = sen::Error::new(code, err.to_string()).with_context("path", path);
        match risk {
            Some(risk) => error
                .with_severity(risk.severity())
                .with_context("risk", risk.as_str()),
            None => error.with_source(err),
        }
    }
}

/// Kind of filesystem entry, as far as risk assessment cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Device,
    Other,
}

/// Operation a caller intends to perform on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Read,
    Write,
    Execute,
}

impl FileOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" | "r" => Ok(Self::Read),
            "write" | "w" => Ok(Self::Write),
            "execute" | "exec" | "x" => Ok(Self::Execute),
            other => Err(format!("unknown file operation: {}", other)),
        }
    }
}

/// Permission report for one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermission {
    pub path: String,
    /// Raw mode bits (file type bits included on unix).
    pub mode: u32,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub read_only: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub owner: String,
    pub group: String,
    pub risk: RiskLevel,
    pub recommendation: String,
}

impl FilePermission {
    /// Whether the owner bits allow `operation`.
    pub fn permits(&self, operation: FileOperation) -> bool {
        match operation {
            FileOperation::Read => self.readable,
            FileOperation::Write => self.writable && !self.read_only,
            FileOperation::Execute => self.executable,
        }
    }

    /// Mode rendered as `rwxr-x---`.
    pub fn mode_string(&self) -> String {
        const FLAGS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        FLAGS
            .iter()
            .map(|(bit, c)| if self.mode & bit != 0 { *c } else { '-' })
            .collect()
    }
}

/// Analyze the permissions of `path`.
///
/// The path goes through [`validate_secure_path`] first; an invalid path fails
/// before the filesystem is touched.
pub fn analyze_file_permissions(
    path: &str,
    config: &SecurityConfig,
) -> Result<FilePermission, PermissionError> {
    let validated = validate_secure_path(path, config);
    if !validated.valid {
        return Err(PermissionError::InvalidPath {
            path: sen::display_safe(path),
            reason: validated
                .errors
                .first()
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            risk: validated.risk,
        });
    }

    let target = validated.normalized_path;
    let metadata =
        std::fs::symlink_metadata(&target).map_err(|source| PermissionError::Inspect {
            path: sen::display_safe(&target),
            source,
        })?;

    let kind = entry_kind(&metadata);
    let mode = mode_bits(&metadata, &target);
    let (owner, group) = ownership(&metadata);

    let writable = mode & OWNER_WRITE != 0;
    let read_only = metadata.permissions().readonly() || !writable;

    let risk = if config.enable_permission_checks {
        assess_risk(mode, kind)
    } else {
        RiskLevel::Low
    };

    let recommendation = if config.enable_permission_checks {
        recommendation(risk, kind, read_only)
    } else {
        "permission checks are disabled".to_string()
    };

    let report = FilePermission {
        path: target,
        mode,
        readable: mode & OWNER_READ != 0,
        writable,
        executable: mode & OWNER_EXEC != 0,
        read_only,
        is_directory: kind == EntryKind::Directory,
        is_symlink: kind == EntryKind::Symlink,
        kind,
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        owner,
        group,
        risk,
        recommendation,
    };

    tracing::debug!(
        path = %sen::display_safe(&report.path),
        mode = %format!("{:o}", report.mode & 0o7777),
        risk = %report.risk,
        "analyzed file permissions"
    );

    Ok(report)
}

/// Risk policy. Each rule may raise the running risk, never lower it.
///
/// World-writable entries are critical outright. Symbolic links carry no
/// meaningful mode bits and are rated medium until their target is checked,
/// so a link never reaches the world-writable rule. The owner
/// write-and-execute rule skips directories, where `x` only grants search.
pub fn assess_risk(mode: u32, kind: EntryKind) -> RiskLevel {
    if kind == EntryKind::Symlink {
        return RiskLevel::Medium;
    }
    if mode & WORLD_WRITABLE != 0 {
        return RiskLevel::Critical;
    }

    let mut risk = RiskLevel::Low;
    if mode & GROUP_WRITABLE != 0 {
        risk = risk.escalate(RiskLevel::Medium);
    }
    // Owner rwx is the norm for directories, where x means search.
    if kind != EntryKind::Directory && mode & OWNER_WRITE != 0 && mode & OWNER_EXEC != 0 {
        risk = risk.escalate(RiskLevel::High);
    }
    if mode & SETUID_SETGID != 0 {
        risk = risk.escalate(RiskLevel::High);
    }
    if kind == EntryKind::Device {
        risk = risk.escalate(RiskLevel::High);
    }
    risk
}

fn recommendation(risk: RiskLevel, kind: EntryKind, read_only: bool) -> String {
    let mut text = match (risk, kind) {
        (_, EntryKind::Symlink) => {
            "Symbolic link: resolve and validate the link target before use".to_string()
        }
        (RiskLevel::Critical, _) => {
            "Remove world write permission immediately (chmod o-w)".to_string()
        }
        (RiskLevel::High, EntryKind::Device) => {
            "Device file: avoid reading or writing it from CLI commands".to_string()
        }
        (RiskLevel::High, _) => {
            "Drop write access on executables and clear setuid/setgid bits (chmod u-w,ug-s)"
                .to_string()
        }
        (RiskLevel::Medium, _) => "Remove group write permission (chmod g-w)".to_string(),
        (RiskLevel::Low, _) => "Permissions look appropriate".to_string(),
    };
    if read_only {
        text.push_str("; entry is read-only");
    }
    text
}

fn entry_kind(metadata: &Metadata) -> EntryKind {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        return EntryKind::Symlink;
    }
    if file_type.is_dir() {
        return EntryKind::Directory;
    }
    if file_type.is_file() {
        return EntryKind::File;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() || file_type.is_char_device() {
            return EntryKind::Device;
        }
    }

    EntryKind::Other
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata, _path: &str) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata, path: &str) -> u32 {
    let mut mode = if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    };
    let executable = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "exe" | "bat" | "cmd" | "com"))
        .unwrap_or(false);
    if metadata.is_dir() || executable {
        mode |= 0o111;
    }
    mode
}

#[cfg(unix)]
fn ownership(metadata: &Metadata) -> (String, String) {
    use std::os::unix::fs::MetadataExt;
    (user_name(metadata.uid()), group_name(metadata.gid()))
}

#[cfg(not(unix))]
fn ownership(_metadata: &Metadata) -> (String, String) {
    ("unknown".to_string(), "unknown".to_string())
}

#[cfg(unix)]
fn user_name(uid: u32) -> String {
    let mut buf = vec![0 as libc::c_char; 4096];
    // SAFETY: passwd is plain data; getpwuid_r only writes into pwd and buf.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwuid_r(
            uid as libc::uid_t,
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut found,
        )
    };
    if rc == 0 && !found.is_null() && !pwd.pw_name.is_null() {
        // SAFETY: pw_name points into buf, which is still alive.
        let name = unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) };
        return name.to_string_lossy().into_owned();
    }
    uid.to_string()
}

#[cfg(unix)]
fn group_name(gid: u32) -> String {
    let mut buf = vec![0 as libc::c_char; 4096];
    // SAFETY: group is plain data; getgrgid_r only writes into grp and buf.
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::group = std::ptr::null_mut();
    let rc = unsafe {
        libc::getgrgid_r(
            gid as libc::gid_t,
            &mut grp,
            buf.as_mut_ptr(),
            buf.len(),
            &mut found,
        )
    };
    if rc == 0 && !found.is_null() && !grp.gr_name.is_null() {
        // SAFETY: gr_name points into buf, which is still alive.
        let name = unsafe { std::ffi::CStr::from_ptr(grp.gr_name) };
        return name.to_string_lossy().into_owned();
    }
    gid.to_string()
}

//! Plugin discovery and directory scanning
//!
//! Walks each allowed directory looking for files with the platform's native
//! library extension. The walk is bounded because a plugin directory may be
//! hostile:
//!
//! - depth below the allowed directory ([`DiscoveryLimits::max_depth`])
//! - entries examined per allowed directory ([`DiscoveryLimits::max_files`])
//! - wall-clock time for the whole call ([`DiscoveryLimits::timeout_ms`])
//!
//! Breaching a limit stops the walk of that directory and keeps what was
//! found so far. Symbolic links are followed once: directories are tracked by
//! their resolved path, so link cycles end the branch instead of the walk.
//! Cancellation of the [`Context`] is polled between filesystem operations and
//! aborts discovery with an error.

use crate::config::DiscoveryLimits;
use crate::context::{Context, ContextError};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during plugin discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("plugin discovery interrupted: {0}")]
    Interrupted(#[from] ContextError),

    #[error("failed to read directory {}: {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which bound stopped a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryLimit {
    Depth,
    Files,
    Timeout,
}

impl DiscoveryLimit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Depth => "max_depth",
            Self::Files => "max_files",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for DiscoveryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A walk that stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitBreach {
    pub directory: PathBuf,
    pub limit: DiscoveryLimit,
    /// Plugin files found in this directory before stopping
    pub found: usize,
}

/// Result of plugin discovery
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Plugin files in walk order: allowed directories in configuration
    /// order, entries sorted by name within each directory
    pub plugins: Vec<PathBuf>,

    pub breaches: Vec<LimitBreach>,

    /// Directories that could not be read; the walk skipped them
    pub skipped: Vec<DiscoveryError>,
}

impl DiscoveryReport {
    /// True if every walk ran to completion
    pub fn is_complete(&self) -> bool {
        self.breaches.is_empty()
    }
}

/// Walk `roots` for files ending in `.{extension}`.
///
/// Missing roots are skipped. Only cancellation or the context's own deadline
/// produce an error.
pub fn discover(
    roots: &[PathBuf],
    extension: &str,
    limits: &DiscoveryLimits,
    ctx: &Context,
) -> Result<DiscoveryReport, DiscoveryError> {
    let deadline = Instant::now().checked_add(limits.timeout());
    let mut report = DiscoveryReport::default();

    for root in roots {
        ctx.check()?;

        let root = match fs::canonicalize(root) {
            Ok(root) if root.is_dir() => root,
            Ok(_) => {
                tracing::debug!(path = %root.display(), "plugin directory is not a directory");
                continue;
            }
            Err(e) => {
                tracing::debug!(path = %root.display(), error = %e, "plugin directory unavailable");
                continue;
            }
        };

        let mut walk = Walk {
            extension,
            limits,
            ctx,
            deadline,
            visited: HashSet::new(),
            examined: 0,
            found: Vec::new(),
        };
        let outcome = walk.run(&root, &mut report.skipped)?;
        let found = walk.found.len();
        report.plugins.append(&mut walk.found);

        if let Some(limit) = outcome {
            tracing::warn!(
                directory = %root.display(),
                limit = %limit,
                found,
                "plugin discovery limit reached"
            );
            report.breaches.push(LimitBreach {
                directory: root,
                limit,
                found,
            });
        }
    }

    Ok(report)
}

struct Walk<'a> {
    extension: &'a str,
    limits: &'a DiscoveryLimits,
    ctx: &'a Context,
    deadline: Option<Instant>,
    visited: HashSet<PathBuf>,
    examined: usize,
    found: Vec<PathBuf>,
}

impl Walk<'_> {
    /// Depth-first walk. Returns the limit that stopped it, if any.
    fn run(
        &mut self,
        root: &Path,
        skipped: &mut Vec<DiscoveryError>,
    ) -> Result<Option<DiscoveryLimit>, DiscoveryError> {
        self.visited.insert(root.to_path_buf());
        let mut stack = vec![(root.to_path_buf(), 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            self.ctx.check()?;
            if self.timed_out() {
                return Ok(Some(DiscoveryLimit::Timeout));
            }

            let listing = match fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(source) => {
                    tracing::debug!(path = %dir.display(), error = %source, "skipping unreadable directory");
                    skipped.push(DiscoveryError::ReadDirectory { path: dir, source });
                    continue;
                }
            };

            // Bounds apply per raw entry while reading, so a huge directory
            // is never listed in full. Only what was read gets sorted.
            let mut stopped = None;
            let mut entries = Vec::new();
            for entry in listing {
                self.ctx.check()?;
                self.examined += 1;
                if self.examined > self.limits.max_files {
                    stopped = Some(DiscoveryLimit::Files);
                    break;
                }
                if self.timed_out() {
                    stopped = Some(DiscoveryLimit::Timeout);
                    break;
                }
                if let Ok(entry) = entry {
                    entries.push(entry);
                }
            }
            entries.sort_by_key(|entry| entry.file_name());

            let mut subdirs = Vec::new();
            for entry in entries {
                self.ctx.check()?;
                if self.timed_out() {
                    return Ok(Some(DiscoveryLimit::Timeout));
                }

                let path = entry.path();
                let file_type = match entry.file_type() {
                    Ok(file_type) => file_type,
                    Err(_) => continue,
                };

                let (is_dir, is_file) = if file_type.is_symlink() {
                    match fs::metadata(&path) {
                        Ok(target) => (target.is_dir(), target.is_file()),
                        Err(_) => continue,
                    }
                } else {
                    (file_type.is_dir(), file_type.is_file())
                };

                if is_dir {
                    let resolved = match fs::canonicalize(&path) {
                        Ok(resolved) => resolved,
                        Err(_) => continue,
                    };
                    if !self.visited.insert(resolved) {
                        tracing::debug!(path = %path.display(), "directory already visited");
                        continue;
                    }
                    if depth + 1 > self.limits.max_depth {
                        return Ok(Some(DiscoveryLimit::Depth));
                    }
                    subdirs.push((path, depth + 1));
                } else if is_file && self.matches_extension(&path) {
                    self.found.push(path);
                }
            }

            if stopped.is_some() {
                return Ok(stopped);
            }

            // Reverse so the stack pops subdirectories in name order.
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(None)
    }

    fn timed_out(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(self.extension))
            .unwrap_or(false)
    }
}

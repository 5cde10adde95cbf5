//! Audit trail for plugin lifecycle events
//!
//! The manager reports every load, unload, rejection and discovery limit
//! breach to an [`AuditSink`]. A failing sink is logged and never fails the
//! operation being audited.
//!
//! | Sink                 | Destination                                  |
//! |----------------------|----------------------------------------------|
//! | [`TracingAuditSink`] | `tracing` events under the `sen::audit` target |
//! | [`FileAuditSink`]    | JSON lines, flushed per event                |
//! | [`MemoryAuditSink`]  | bounded in-process buffer                    |
//! | [`NullAuditSink`]    | nowhere                                      |

use crate::discovery::{DiscoveryLimit, LimitBreach};
use crate::error::LoadStage;
use crate::registry::LoadedPlugin;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// One plugin lifecycle action
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Plugin name, or the file name when the plugin never reported one
    pub plugin: String,
    pub details: AuditDetails,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    PluginLoaded,
    PluginUnloaded,
    LoadRejected,
    DiscoveryLimitReached,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditDetails {
    Lifecycle {
        path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(skip_serializing_if = "String::is_empty")]
        checksum: String,
    },
    Rejection {
        path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<LoadStage>,
        reason: String,
    },
    DiscoveryLimit {
        directory: PathBuf,
        limit: DiscoveryLimit,
        found: usize,
    },
}

impl AuditEvent {
    fn now(event_type: AuditEventType, plugin: impl Into<String>, details: AuditDetails) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            plugin: plugin.into(),
            details,
        }
    }

    pub fn plugin_loaded(plugin: &LoadedPlugin) -> Self {
        Self::now(
            AuditEventType::PluginLoaded,
            plugin.name(),
            AuditDetails::Lifecycle {
                path: plugin.path.clone(),
                version: Some(plugin.version().to_string()),
                checksum: plugin.checksum.clone(),
            },
        )
    }

    pub fn plugin_unloaded(plugin: &LoadedPlugin) -> Self {
        Self::now(
            AuditEventType::PluginUnloaded,
            plugin.name(),
            AuditDetails::Lifecycle {
                path: plugin.path.clone(),
                version: None,
                checksum: String::new(),
            },
        )
    }

    /// A load that failed before the plugin could name itself; the file name
    /// stands in for the plugin name.
    pub fn load_rejected(path: &Path, stage: Option<LoadStage>, reason: impl Into<String>) -> Self {
        let plugin = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::now(
            AuditEventType::LoadRejected,
            plugin,
            AuditDetails::Rejection {
                path: path.to_path_buf(),
                stage,
                reason: reason.into(),
            },
        )
    }

    pub fn discovery_limit_reached(breach: &LimitBreach) -> Self {
        Self::now(
            AuditEventType::DiscoveryLimitReached,
            "",
            AuditDetails::DiscoveryLimit {
                directory: breach.directory.clone(),
                limit: breach.limit,
                found: breach.found,
            },
        )
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot write audit record: {0}")]
    Io(#[from] io::Error),

    #[error("cannot encode audit record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<AuditError> for sen::Error {
    fn from(err: AuditError) -> Self {
        sen::Error::internal(err.to_string()).with_source(err)
    }
}

/// Destination for audit events
///
/// # Example
///
/// ```rust
/// use sen_plugin_host::audit::{AuditError, AuditEvent, AuditSink};
///
/// struct StderrAuditSink;
///
/// impl AuditSink for StderrAuditSink {
///     fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
///         eprintln!("audit: {:?} {}", event.event_type, event.plugin);
///         Ok(())
///     }
/// }
/// ```
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Forwards events to `tracing` at info level, with rejections and limit
/// breaches at warn.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let details = serde_json::to_string(&event.details)?;
        match event.event_type {
            AuditEventType::PluginLoaded | AuditEventType::PluginUnloaded => tracing::info!(
                target: "sen::audit",
                event = ?event.event_type,
                plugin = %event.plugin,
                %details,
            ),
            AuditEventType::LoadRejected | AuditEventType::DiscoveryLimitReached => {
                tracing::warn!(
                    target: "sen::audit",
                    event = ?event.event_type,
                    plugin = %event.plugin,
                    %details,
                )
            }
        }
        Ok(())
    }
}

/// Appends one JSON object per line and flushes after each event.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Open `path` for appending, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        // One write per record keeps lines whole when several processes
        // append to the same log.
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps the most recent events in memory, oldest dropped first.
#[derive(Debug)]
pub struct MemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn find_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut events = self.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

//! sen-plugin-host: Native storage plugin host for sen-rs
//!
//! This crate discovers, validates and loads storage plugins compiled as
//! native libraries (see `sen-plugin-sdk` for the plugin side).
//!
//! - [`PluginManager`]: load, unload, list and discover plugins
//! - [`PluginSecurityConfig`]: where plugins may come from and what they must
//!   look like
//! - [`Context`]: cancellation and deadlines for discovery and loading
//! - [`native`]: the loader capability, with a `libloading` implementation
//! - [`audit`]: where lifecycle events go
//!
//! Each application builds one manager and passes it (or clones of it) to the
//! code that needs plugins. There is no global registry.

pub mod audit;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod native;
pub mod registry;

pub use audit::{
    AuditEvent, AuditEventType, AuditSink, FileAuditSink, MemoryAuditSink, TracingAuditSink,
};
pub use config::{
    default_plugin_dirs, DiscoveryLimits, HostConfig, PluginSecurityConfig, StorageConfig,
};
pub use context::{Context, ContextError};
pub use discovery::{DiscoveryError, DiscoveryLimit, DiscoveryReport, LimitBreach};
pub use error::{LoadStage, PluginError};
pub use manager::PluginManager;
pub use native::{LibloadingLoader, LoaderError, NativeLibrary, NativeLoader, RawSymbol};
pub use registry::{LoadedPlugin, PluginRegistry};
pub use sen_plugin_api::{PluginMetadata, StorageError, StorageOp, StoragePlugin};

//! Plugin lifecycle
//!
//! [`PluginManager::load_plugin`] runs a fixed sequence of checks before any
//! native code is mapped, and only registers the plugin once every check has
//! passed:
//!
//! ```text
//! absolute? ─▶ already loaded? ─▶ path policy ─▶ allowed directory ─▶ signature policy
//!                                                                           │
//!  register ◀─ construct ◀─ API version ◀─ required symbols ◀─ open ◀─ checksum ◀─ file checks
//! ```
//!
//! The registry write lock is held for the whole sequence, so concurrent loads
//! of the same file serialize and the second one returns the first's entry.
//!
//! Native libraries cannot be unloaded. [`PluginManager::unload_plugin`] only
//! removes the registry entry; the library stays mapped until the process
//! exits.

use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::config::{PluginSecurityConfig, StorageConfig};
use crate::context::Context;
use crate::discovery;
use crate::error::{LoadStage, PluginError};
use crate::native::{LibloadingLoader, NativeLibrary, NativeLoader};
use crate::registry::{LoadedPlugin, PluginRegistry};
use chrono::Utc;
use sen_plugin_api::{
    PluginCreateFn, StoragePlugin, API_VERSION, API_VERSION_SYMBOL, CREATE_SYMBOL,
    NATIVE_EXTENSION,
};
use sen_security::{analyze_file_permissions, validate_secure_os_path, RiskLevel};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::instrument;

/// Discovers, validates and loads native storage plugins.
///
/// Cloning is cheap and every clone shares the same registry.
///
/// # Example
///
/// ```no_run
/// use sen_plugin_host::{Context, PluginManager, PluginSecurityConfig};
///
/// let config = PluginSecurityConfig::default().with_allowed_dir("/opt/myapp/plugins");
/// let manager = PluginManager::new(&config);
///
/// let ctx = Context::background();
/// for path in manager.discover_plugins(&ctx)? {
///     let plugin = manager.load_plugin(&ctx, &path)?;
///     println!("loaded {} {}", plugin.name(), plugin.version());
/// }
/// # Ok::<(), sen_plugin_host::PluginError>(())
/// ```
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: PluginSecurityConfig,
    loader: Arc<dyn NativeLoader>,
    audit: RwLock<Arc<dyn AuditSink>>,
    registry: RwLock<PluginRegistry>,
}

impl PluginManager {
    /// Create a manager using the platform dynamic linker.
    ///
    /// `config` is copied; later changes to it do not affect the manager.
    pub fn new(config: &PluginSecurityConfig) -> Self {
        Self::with_loader(config, Arc::new(LibloadingLoader::new()))
    }

    /// Create a manager with a custom native loader
    pub fn with_loader(config: &PluginSecurityConfig, loader: Arc<dyn NativeLoader>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config: config.clone(),
                loader,
                audit: RwLock::new(Arc::new(NullAuditSink)),
                registry: RwLock::new(PluginRegistry::new()),
            }),
        }
    }

    /// Send lifecycle events to `sink`
    pub fn with_audit_sink(self, sink: Arc<dyn AuditSink>) -> Self {
        *self
            .inner
            .audit
            .write()
            .unwrap_or_else(|e| e.into_inner()) = sink;
        self
    }

    /// Effective policy
    pub fn config(&self) -> &PluginSecurityConfig {
        &self.inner.config
    }

    /// Load the plugin at `path`, or return the entry already loaded from a
    /// file of the same name.
    #[instrument(skip(self, ctx, path), fields(path = %path.as_ref().display()))]
    pub fn load_plugin(
        &self,
        ctx: &Context,
        path: impl AsRef<Path>,
    ) -> Result<LoadedPlugin, PluginError> {
        let path = path.as_ref();
        ctx.check()?;

        let mut registry = self
            .inner
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner());

        match self.load_locked(&mut registry, ctx, path) {
            Ok(plugin) => Ok(plugin),
            Err(err) => {
                tracing::warn!(
                    path = %sen::display_safe(&path.to_string_lossy()),
                    stage = err.stage().map(|s| s.as_str()).unwrap_or("-"),
                    error = %err,
                    "plugin load rejected"
                );
                self.audit(AuditEvent::load_rejected(path, err.stage(), err.to_string()));
                Err(err)
            }
        }
    }

    fn load_locked(
        &self,
        registry: &mut PluginRegistry,
        ctx: &Context,
        path: &Path,
    ) -> Result<LoadedPlugin, PluginError> {
        let config = &self.inner.config;

        if !path.is_absolute() {
            return Err(PluginError::RelativePath {
                path: path.to_path_buf(),
            });
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| PluginError::load(path, LoadStage::Path, "path has no file name"))?;
        if let Some(existing) = registry.find_by_file_name(file_name) {
            tracing::debug!(plugin = %existing.name(), "plugin already loaded");
            return Ok(existing.clone());
        }

        let checked = validate_secure_os_path(path, &config.security);
        if !checked.valid {
            let reason = checked
                .first_error()
                .unwrap_or("path failed validation")
                .to_string();
            return Err(PluginError::load(path, LoadStage::Path, reason));
        }

        let canonical = self.check_location(path)?;

        if !config.allow_unsigned {
            return Err(PluginError::load(
                path,
                LoadStage::Signature,
                "signature verification is not supported; unsigned plugins are disallowed",
            ));
        }

        self.check_file(&canonical)?;

        let checksum = if config.validate_checksums {
            sha256_file(&canonical).map_err(|e| {
                PluginError::load(path, LoadStage::Checksum, "cannot read plugin file")
                    .with_source(e)
            })?
        } else {
            String::new()
        };

        ctx.check()?;

        let library = self.inner.loader.open(&canonical).map_err(|e| {
            PluginError::load(path, LoadStage::Open, "cannot open native library").with_source(e)
        })?;

        for symbol in &config.required_symbols {
            library.symbol(symbol).map_err(|e| {
                PluginError::load(
                    path,
                    LoadStage::Symbol,
                    format!("missing required symbol '{}'", symbol),
                )
                .with_source(e)
            })?;
        }

        check_api_version(library.as_ref(), path)?;
        let plugin = construct(library.as_ref(), path)?;

        let metadata = plugin.metadata();
        if metadata.name.is_empty() {
            return Err(PluginError::load(
                path,
                LoadStage::Register,
                "plugin reported an empty name",
            ));
        }

        let loaded = LoadedPlugin {
            plugin,
            path: canonical,
            checksum,
            loaded_at: Utc::now(),
            metadata: metadata.to_map(),
        };

        if let Err(rejected) = registry.insert(loaded.clone()) {
            let owner = registry
                .get(rejected.name())
                .map(|p| p.path.display().to_string())
                .unwrap_or_default();
            return Err(PluginError::load(
                path,
                LoadStage::Register,
                format!(
                    "plugin name '{}' is already registered from {}",
                    rejected.name(),
                    owner
                ),
            ));
        }

        tracing::info!(
            plugin = %loaded.name(),
            version = %loaded.version(),
            path = %loaded.path.display(),
            "plugin loaded"
        );
        self.audit(AuditEvent::plugin_loaded(&loaded));
        Ok(loaded)
    }

    /// Resolve `path` and require it to sit inside an allowed directory
    fn check_location(&self, path: &Path) -> Result<PathBuf, PluginError> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            PluginError::load(path, LoadStage::File, "cannot resolve plugin path").with_source(e)
        })?;

        let trusted = self
            .inner
            .config
            .allowed_dirs
            .iter()
            .filter_map(|dir| fs::canonicalize(dir).ok())
            .any(|dir| canonical.starts_with(&dir));

        if trusted {
            Ok(canonical)
        } else {
            Err(PluginError::load(
                path,
                LoadStage::Location,
                "plugin is not inside an allowed plugin directory",
            ))
        }
    }

    /// Regular file, within the size limit, not world-writable
    fn check_file(&self, path: &Path) -> Result<(), PluginError> {
        let config = &self.inner.config;

        let metadata = fs::metadata(path).map_err(|e| {
            PluginError::load(path, LoadStage::File, "cannot stat plugin file").with_source(e)
        })?;
        if !metadata.is_file() {
            return Err(PluginError::load(
                path,
                LoadStage::File,
                "plugin is not a regular file",
            ));
        }
        if metadata.len() > config.max_plugin_size {
            return Err(PluginError::load(
                path,
                LoadStage::File,
                format!(
                    "plugin file is {} bytes, exceeding the size limit of {} bytes",
                    metadata.len(),
                    config.max_plugin_size
                ),
            ));
        }

        let text = path.to_str().ok_or_else(|| {
            PluginError::load(path, LoadStage::Path, "plugin path is not valid UTF-8")
        })?;
        let permission = analyze_file_permissions(text, &config.security).map_err(|e| {
            PluginError::load(path, LoadStage::Permissions, "cannot inspect permissions")
                .with_source(e)
        })?;
        if permission.risk >= RiskLevel::Critical {
            return Err(PluginError::load(
                path,
                LoadStage::Permissions,
                format!(
                    "plugin file permissions {} are unsafe: {}",
                    permission.mode_string(),
                    permission.recommendation
                ),
            ));
        }

        Ok(())
    }

    /// Walk the allowed directories for native libraries.
    ///
    /// Limit breaches are logged and audited; the files found before the
    /// breach are still returned.
    #[instrument(skip(self, ctx))]
    pub fn discover_plugins(&self, ctx: &Context) -> Result<Vec<PathBuf>, PluginError> {
        let config = &self.inner.config;
        let report = discovery::discover(
            &config.allowed_dirs,
            NATIVE_EXTENSION,
            &config.discovery,
            ctx,
        )?;

        for breach in &report.breaches {
            self.audit(AuditEvent::discovery_limit_reached(breach));
        }
        tracing::info!(
            found = report.plugins.len(),
            breaches = report.breaches.len(),
            skipped = report.skipped.len(),
            "plugin discovery finished"
        );
        Ok(report.plugins)
    }

    /// Remove `name` from the registry.
    ///
    /// The native library stays mapped; only the bookkeeping is dropped, so a
    /// later load of the same file maps nothing new.
    pub fn unload_plugin(&self, name: &str) -> Result<(), PluginError> {
        let removed = self
            .inner
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);

        match removed {
            Some(plugin) => {
                tracing::info!(plugin = %name, "plugin unregistered");
                self.audit(AuditEvent::plugin_unloaded(&plugin));
                Ok(())
            }
            None => Err(PluginError::NotLoaded(name.to_string())),
        }
    }

    pub fn get_plugin(&self, name: &str) -> Option<LoadedPlugin> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Copy of the registry, ordered by name
    pub fn list_loaded_plugins(&self) -> BTreeMap<String, LoadedPlugin> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Load the plugin backing `storage`.
    ///
    /// An explicit `plugin_path` is loaded directly. Otherwise the first
    /// discovered file whose name contains the provider name wins.
    pub fn load_plugins_from_config(
        &self,
        ctx: &Context,
        storage: &StorageConfig,
    ) -> Result<LoadedPlugin, PluginError> {
        if let Some(path) = &storage.plugin_path {
            return self.load_plugin(ctx, path);
        }

        if storage.provider.is_empty() {
            return Err(PluginError::ProviderNotFound(String::new()));
        }

        let candidate = self.discover_plugins(ctx)?.into_iter().find(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().contains(storage.provider.as_str()))
                .unwrap_or(false)
        });

        match candidate {
            Some(path) => self.load_plugin(ctx, &path),
            None => Err(PluginError::ProviderNotFound(storage.provider.clone())),
        }
    }

    /// [`load_plugin`](Self::load_plugin) on tokio's blocking pool
    pub async fn load_plugin_async(
        &self,
        ctx: Context,
        path: PathBuf,
    ) -> Result<LoadedPlugin, PluginError> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.load_plugin(&ctx, &path))
            .await
            .map_err(PluginError::Join)?
    }

    /// [`discover_plugins`](Self::discover_plugins) on tokio's blocking pool
    pub async fn discover_plugins_async(&self, ctx: Context) -> Result<Vec<PathBuf>, PluginError> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.discover_plugins(&ctx))
            .await
            .map_err(PluginError::Join)?
    }

    fn audit(&self, event: AuditEvent) {
        let sink = self
            .inner
            .audit
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Err(e) = sink.record(event) {
            tracing::warn!(error = %e, "failed to record audit event");
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = self
            .inner
            .registry
            .read()
            .map(|r| r.len())
            .unwrap_or_default();
        f.debug_struct("PluginManager")
            .field("config", &self.inner.config)
            .field("loaded", &loaded)
            .finish()
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn check_api_version(library: &dyn NativeLibrary, path: &Path) -> Result<(), PluginError> {
    let symbol = library.symbol(API_VERSION_SYMBOL).map_err(|e| {
        PluginError::load(path, LoadStage::ApiVersion, "plugin does not export its API version")
            .with_source(e)
    })?;
    if symbol.is_null() {
        return Err(PluginError::load(
            path,
            LoadStage::ApiVersion,
            "plugin API version symbol is null",
        ));
    }

    // SAFETY: the symbol is the plugin's exported `u32` static.
    let version = unsafe { std::ptr::read(symbol.as_ptr() as *const u32) };
    if version != API_VERSION {
        return Err(PluginError::load(
            path,
            LoadStage::ApiVersion,
            format!(
                "plugin targets API version {}, host supports {}",
                version, API_VERSION
            ),
        ));
    }
    Ok(())
}

fn construct(library: &dyn NativeLibrary, path: &Path) -> Result<Arc<dyn StoragePlugin>, PluginError> {
    let symbol = library.symbol(CREATE_SYMBOL).map_err(|e| {
        PluginError::load(path, LoadStage::Construct, "plugin has no constructor").with_source(e)
    })?;
    if symbol.is_null() {
        return Err(PluginError::load(
            path,
            LoadStage::Construct,
            "plugin constructor symbol is null",
        ));
    }

    // SAFETY: the symbol is the plugin's exported constructor with the
    // `PluginCreateFn` signature, guaranteed by the matching API version.
    let create: PluginCreateFn = unsafe { std::mem::transmute(symbol.as_ptr()) };
    let raw = unsafe { create() };
    if raw.is_null() {
        return Err(PluginError::load(
            path,
            LoadStage::Construct,
            "plugin constructor returned null",
        ));
    }

    // SAFETY: a non-null result was produced by `Box::into_raw` in the plugin
    // and ownership passes to the host.
    let boxed: Box<Box<dyn StoragePlugin>> = unsafe { Box::from_raw(raw) };
    Ok(Arc::from(*boxed))
}

//! Registry of loaded plugins
//!
//! Plain data: the owning [`PluginManager`](crate::PluginManager) guards it
//! with a single lock and holds that lock across a whole load.

use chrono::{DateTime, Utc};
use sen_plugin_api::StoragePlugin;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A loaded and validated plugin
#[derive(Clone)]
pub struct LoadedPlugin {
    /// Shared plugin instance
    pub plugin: Arc<dyn StoragePlugin>,

    /// Canonical path the plugin was loaded from
    pub path: PathBuf,

    /// SHA-256 hex digest of the file; empty when checksums are disabled
    pub checksum: String,

    pub loaded_at: DateTime<Utc>,

    /// `name`, `version` and `description` as reported by the plugin
    pub metadata: BTreeMap<String, String>,
}

impl LoadedPlugin {
    /// Self-reported name the plugin is registered under
    pub fn name(&self) -> &str {
        self.metadata
            .get("name")
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.metadata
            .get("version")
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name())
            .field("path", &self.path)
            .field("checksum", &self.checksum)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Plugins indexed by name, plus a file-name index for idempotent loads
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, LoadedPlugin>,
    /// File name (without directory) to plugin name
    file_index: HashMap<OsString, String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin previously loaded from a file with this name, in any directory
    pub fn find_by_file_name(&self, file_name: &OsStr) -> Option<&LoadedPlugin> {
        self.file_index
            .get(file_name)
            .and_then(|name| self.plugins.get(name))
    }

    pub fn get(&self, name: &str) -> Option<&LoadedPlugin> {
        self.plugins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Register a plugin under its self-reported name.
    ///
    /// Returns the plugin back if the name is already taken.
    pub fn insert(&mut self, plugin: LoadedPlugin) -> Result<(), LoadedPlugin> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(plugin);
        }
        if let Some(file_name) = plugin.path.file_name() {
            self.file_index.insert(file_name.to_os_string(), name.clone());
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<LoadedPlugin> {
        let plugin = self.plugins.remove(name)?;
        self.file_index.retain(|_, indexed| indexed != name);
        Some(plugin)
    }

    /// Copy of every entry, ordered by name
    pub fn snapshot(&self) -> BTreeMap<String, LoadedPlugin> {
        self.plugins
            .iter()
            .map(|(name, plugin)| (name.clone(), plugin.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sen_plugin_api::StorageError;

    struct Stub(&'static str);

    impl StoragePlugin for Stub {
        fn name(&self) -> &str {
            self.0
        }
        fn version(&self) -> &str {
            "0.0.1"
        }
        fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::not_found(key))
        }
        fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> {
            Ok(())
        }
        fn delete(&self, key: &str) -> Result<(), StorageError> {
            Err(StorageError::not_found(key))
        }
        fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn loaded(name: &'static str, path: &str) -> LoadedPlugin {
        let plugin: Arc<dyn StoragePlugin> = Arc::new(Stub(name));
        LoadedPlugin {
            metadata: plugin.metadata().to_map(),
            plugin,
            path: PathBuf::from(path),
            checksum: String::new(),
            loaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = PluginRegistry::new();
        registry.insert(loaded("redis", "/opt/p/libredis.so")).unwrap();

        assert!(registry.contains("redis"));
        assert_eq!(registry.get("redis").unwrap().version(), "0.0.1");
        let by_file = registry
            .find_by_file_name(OsStr::new("libredis.so"))
            .unwrap();
        assert_eq!(by_file.name(), "redis");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PluginRegistry::new();
        registry.insert(loaded("redis", "/opt/a/libredis.so")).unwrap();
        let rejected = registry
            .insert(loaded("redis", "/opt/b/libother.so"))
            .unwrap_err();
        assert_eq!(rejected.path, PathBuf::from("/opt/b/libother.so"));
        assert_eq!(registry.len(), 1);
        assert!(registry
            .find_by_file_name(OsStr::new("libother.so"))
            .is_none());
    }

    #[test]
    fn test_remove_clears_file_index() {
        let mut registry = PluginRegistry::new();
        registry.insert(loaded("redis", "/opt/p/libredis.so")).unwrap();

        assert!(registry.remove("redis").is_some());
        assert!(registry.is_empty());
        assert!(registry
            .find_by_file_name(OsStr::new("libredis.so"))
            .is_none());
        assert!(registry.remove("redis").is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut registry = PluginRegistry::new();
        registry.insert(loaded("b", "/opt/p/b.so")).unwrap();
        registry.insert(loaded("a", "/opt/p/a.so")).unwrap();

        let snapshot = registry.snapshot();
        registry.remove("a");

        assert_eq!(
            snapshot.keys().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(registry.len(), 1);
    }
}

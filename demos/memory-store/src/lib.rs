//! Memory Store - a minimal sen-rs storage plugin
//!
//! Keeps every value in a process-local map. Useful for trying the host
//! without touching disk:
//!
//! ```sh
//! cargo build --release
//! cp target/release/libmemory_store.so ~/.local/share/myapp/plugins/
//! ```

use sen_plugin_sdk::prelude::*;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl StoragePlugin for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Process-local key/value store"
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let data = self
            .data
            .read()
            .map_err(|_| StorageError::unavailable("memory", "store lock poisoned"))?;
        data.get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::operation(StorageOp::Set, key, "empty key"));
        }
        self.data
            .write()
            .map_err(|_| StorageError::unavailable("memory", "store lock poisoned"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data
            .write()
            .map_err(|_| StorageError::unavailable("memory", "store lock poisoned"))?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self
            .data
            .read()
            .map_err(|_| StorageError::unavailable("memory", "store lock poisoned"))?;
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

export_storage_plugin!(MemoryStore, MemoryStore::default());

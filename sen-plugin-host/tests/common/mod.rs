//! Shared fixtures: an in-process storage plugin and a fake native loader
//! that serves its symbols.

#![allow(dead_code)]

use sen_plugin_host::{LoaderError, NativeLibrary, NativeLoader, RawSymbol};
use sen_plugin_sdk::prelude::*;
use sen_plugin_sdk::PluginCreateFn;
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct MemoryStore {
    name: &'static str,
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            data: Mutex::new(BTreeMap::new()),
        }
    }
}

impl StoragePlugin for MemoryStore {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "In-memory key/value store"
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.data
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.data.lock().unwrap().insert(key.into(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

export_storage_plugin!(MemoryStore, MemoryStore::named("memory"));

#[allow(improper_ctypes_definitions)]
pub extern "C" fn create_archive() -> *mut Box<dyn StoragePlugin> {
    sen_plugin_sdk::into_raw_plugin(MemoryStore::named("archive"))
}

#[allow(improper_ctypes_definitions)]
pub extern "C" fn create_null() -> *mut Box<dyn StoragePlugin> {
    std::ptr::null_mut()
}

pub static FUTURE_API_VERSION: u32 = API_VERSION + 1;

/// Symbol table of one fake library
#[derive(Clone, Default)]
pub struct FakeSymbols(HashMap<String, usize>);

impl FakeSymbols {
    /// Symbols of a well-formed plugin registering as `memory`
    pub fn memory() -> Self {
        Self::default()
            .with_static(sen_plugin_sdk::API_VERSION_SYMBOL, &sen_plugin_api_version)
            .with_constructor(sen_plugin_create)
    }

    /// Well-formed plugin registering as `archive`
    pub fn archive() -> Self {
        Self::memory().with_constructor(create_archive)
    }

    pub fn with_constructor(self, create: PluginCreateFn) -> Self {
        self.with_address(sen_plugin_sdk::CREATE_SYMBOL, create as *const c_void)
    }

    pub fn with_static(self, name: &str, value: &'static u32) -> Self {
        self.with_address(name, value as *const u32 as *const c_void)
    }

    pub fn with_address(mut self, name: &str, address: *const c_void) -> Self {
        self.0.insert(name.to_string(), address as usize);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.0.remove(name);
        self
    }
}

struct FakeLibrary(FakeSymbols);

impl NativeLibrary for FakeLibrary {
    fn symbol(&self, name: &str) -> Result<RawSymbol, LoaderError> {
        let FakeLibrary(FakeSymbols(table)) = self;
        table
            .get(name)
            .map(|address| RawSymbol::new(*address as *const c_void))
            .ok_or_else(|| LoaderError::symbol_not_found(name))
    }
}

/// Serves symbol tables by file name and records every open
#[derive(Default)]
pub struct FakeLoader {
    libraries: Mutex<HashMap<String, FakeSymbols>>,
    fallback: Option<FakeSymbols>,
    opened: Mutex<Vec<PathBuf>>,
}

impl FakeLoader {
    /// Every file opens as the `memory` plugin
    pub fn memory() -> Arc<Self> {
        Arc::new(Self {
            fallback: Some(FakeSymbols::memory()),
            ..Self::default()
        })
    }

    /// Serve `symbols` for files named `file_name`
    pub fn with_library(self, file_name: &str, symbols: FakeSymbols) -> Self {
        self.libraries
            .lock()
            .unwrap()
            .insert(file_name.to_string(), symbols);
        self
    }

    pub fn with_fallback(mut self, symbols: FakeSymbols) -> Self {
        self.fallback = Some(symbols);
        self
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

impl NativeLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, LoaderError> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let symbols = self
            .libraries
            .lock()
            .unwrap()
            .get(&file_name)
            .cloned()
            .or_else(|| self.fallback.clone());

        match symbols {
            Some(symbols) => Ok(Box::new(FakeLibrary(symbols))),
            None => Err(LoaderError::Open {
                path: path.to_path_buf(),
                source: "not a native library".into(),
            }),
        }
    }
}

/// Name a plugin file the way the platform names native libraries
pub fn plugin_file(name: &str) -> String {
    format!("{}.{}", name, sen_plugin_sdk::NATIVE_EXTENSION)
}

/// Write a small plugin file into `dir`
pub fn write_plugin(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(plugin_file(name));
    std::fs::write(&path, b"\x7fELF fake plugin").unwrap();
    path
}

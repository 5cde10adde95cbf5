//! Native library loading
//!
//! The manager never calls `libloading` directly. It goes through the
//! [`NativeLoader`] capability (open by path) and [`NativeLibrary`] (look up a
//! symbol by name), so every validation step can be exercised against a fake
//! loader in tests.
//!
//! Native code cannot be unloaded safely once a plugin object exists:
//! the object's vtable lives in the library. [`LibloadingLoader`] therefore
//! keeps every opened library mapped for the rest of the process.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from opening libraries and resolving symbols
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to open native library {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: sen::BoxError,
    },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound {
        symbol: String,
        #[source]
        source: Option<sen::BoxError>,
    },
}

impl LoaderError {
    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
            source: None,
        }
    }
}

/// Address of a resolved symbol.
///
/// Only meaningful while the library it came from stays loaded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol(*const c_void);

impl RawSymbol {
    pub fn new(address: *const c_void) -> Self {
        Self(address)
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for RawSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSymbol({:p})", self.0)
    }
}

/// An opened native library
pub trait NativeLibrary: Send + Sync {
    fn symbol(&self, name: &str) -> Result<RawSymbol, LoaderError>;
}

/// Capability to open native libraries by path
pub trait NativeLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, LoaderError>;
}

/// Loader backed by the platform dynamic linker
#[derive(Debug, Default, Clone, Copy)]
pub struct LibloadingLoader;

impl LibloadingLoader {
    pub fn new() -> Self {
        Self
    }
}

impl NativeLoader for LibloadingLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, LoaderError> {
        // SAFETY: library initializers run here. The path has already passed
        // the host's location, size and permission checks.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| LoaderError::Open {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        tracing::debug!(path = %path.display(), "native library mapped");
        Ok(Box::new(LibloadingLibrary {
            library: Box::leak(Box::new(library)),
        }))
    }
}

struct LibloadingLibrary {
    library: &'static libloading::Library,
}

impl NativeLibrary for LibloadingLibrary {
    fn symbol(&self, name: &str) -> Result<RawSymbol, LoaderError> {
        // SAFETY: the symbol is read as an untyped address; callers decide
        // how to interpret it.
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.map_err(|e| {
            LoaderError::SymbolNotFound {
                symbol: name.to_string(),
                source: Some(Box::new(e)),
            }
        })?;
        Ok(RawSymbol::new(*symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_garbage_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp
            .path()
            .join(format!("garbage.{}", std::env::consts::DLL_EXTENSION));
        fs::write(&path, b"definitely not a shared object").unwrap();

        let err = match LibloadingLoader::new().open(&path) {
            Ok(_) => panic!("garbage file must not load"),
            Err(e) => e,
        };
        match err {
            LoaderError::Open { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.so");
        assert!(LibloadingLoader::new().open(&path).is_err());
    }

    #[test]
    fn test_raw_symbol() {
        static VALUE: u32 = 7;
        let symbol = RawSymbol::new(&VALUE as *const u32 as *const c_void);
        assert!(!symbol.is_null());
        assert_eq!(unsafe { *(symbol.as_ptr() as *const u32) }, 7);
        assert!(RawSymbol::new(std::ptr::null()).is_null());
    }
}

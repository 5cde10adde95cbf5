//! sen-plugin-sdk: SDK for writing native storage plugins
//!
//! A plugin is a `cdylib` crate that implements [`StoragePlugin`] and invokes
//! [`export_storage_plugin!`] once. The macro emits the two symbols the host
//! looks up.
//!
//! ## Quick Start
//!
//! ```toml
//! [lib]
//! crate-type = ["cdylib"]
//! ```
//!
//! ```rust,ignore
//! use sen_plugin_sdk::prelude::*;
//!
//! struct NullStore;
//!
//! impl StoragePlugin for NullStore {
//!     fn name(&self) -> &str { "null" }
//!     fn version(&self) -> &str { env!("CARGO_PKG_VERSION") }
//!     fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
//!         Err(StorageError::not_found(key))
//!     }
//!     fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StorageError> { Ok(()) }
//!     fn delete(&self, key: &str) -> Result<(), StorageError> {
//!         Err(StorageError::not_found(key))
//!     }
//!     fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> { Ok(Vec::new()) }
//! }
//!
//! export_storage_plugin!(NullStore, NullStore);
//! ```

// Re-export everything from sen-plugin-api
pub use sen_plugin_api::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::export_storage_plugin;
    pub use sen_plugin_api::{
        PluginMetadata, StorageError, StorageOp, StoragePlugin, API_VERSION,
    };
}

/// Box a provider the way the host expects to receive it.
///
/// Used by [`export_storage_plugin!`]; the double box keeps the pointer
/// handed across the boundary thin.
#[doc(hidden)]
pub fn into_raw_plugin<P: StoragePlugin + 'static>(plugin: P) -> *mut Box<dyn StoragePlugin> {
    let boxed: Box<dyn StoragePlugin> = Box::new(plugin);
    Box::into_raw(Box::new(boxed))
}

/// Export the plugin symbols for a storage provider.
///
/// `$plugin` is the provider type and `$constructor` an expression producing
/// it. A panic inside the constructor is caught and reported to the host as a
/// null pointer.
///
/// # Example
///
/// ```rust,ignore
/// export_storage_plugin!(FileStore, FileStore::open_default());
/// ```
#[macro_export]
macro_rules! export_storage_plugin {
    ($plugin:ty, $constructor:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static sen_plugin_api_version: u32 = $crate::API_VERSION;

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn sen_plugin_create() -> *mut ::std::boxed::Box<dyn $crate::StoragePlugin>
        {
            match ::std::panic::catch_unwind(|| -> $plugin { $constructor }) {
                Ok(plugin) => $crate::into_raw_plugin(plugin),
                Err(_) => ::std::ptr::null_mut(),
            }
        }
    };
}

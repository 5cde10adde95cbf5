//! Storage CLI - drives a native storage plugin from the command line
//!
//! ```sh
//! storage-cli host.json set greeting hello
//! storage-cli host.json get greeting
//! storage-cli host.json list
//! storage-cli host.json plugins
//! ```
//!
//! `host.json` is a `HostConfig`: plugin policy plus the storage provider to
//! load. Without a `storage` section the `memory` provider is used.

use sen_plugin_host::{Context, HostConfig, PluginManager, StorageConfig};
use sen_security::{InputValidator, ValidationConfig};
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    sen::init_subscriber();

    match run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.report());
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(args: Vec<String>) -> sen::Result<()> {
    let (config_path, command) = match args.split_first() {
        Some((path, rest)) if !rest.is_empty() => (path.clone(), rest.to_vec()),
        _ => {
            return Err(sen::Error::validation(
                "usage: storage-cli <config.json> <get|set|delete|list|plugins> [args...]",
            ))
        }
    };

    let validator = InputValidator::new(ValidationConfig::default());
    validator
        .validate_path_flag("config", &config_path)
        .into_result()?;
    validator.validate_args(&command)?;

    let config = HostConfig::load(&config_path)?;
    let manager = PluginManager::new(&config.plugins).with_audit_sink(config.audit_sink()?);
    let storage = config
        .storage
        .unwrap_or_else(|| StorageConfig::provider("memory"));

    let ctx = Context::background().with_timeout(Duration::from_secs(10));
    let loaded = {
        let manager = manager.clone();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || manager.load_plugins_from_config(&ctx, &storage))
            .await
            .map_err(|e| sen::Error::internal("plugin task failed").with_source(e))??
    };
    tracing::info!(plugin = %loaded.name(), version = %loaded.version(), "storage ready");

    let store = &loaded.plugin;
    match (command[0].as_str(), &command[1..]) {
        ("get", [key]) => {
            let value = store.get(key)?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        ("set", [key, value]) => store.set(key, value.as_bytes())?,
        ("delete", [key]) => store.delete(key)?,
        ("list", rest) => {
            let prefix = rest.first().map(String::as_str).unwrap_or("");
            for key in store.list(prefix)? {
                println!("{}", key);
            }
        }
        ("plugins", []) => {
            for (name, plugin) in manager.list_loaded_plugins() {
                println!(
                    "{}\t{}\t{}\t{}",
                    name,
                    plugin.version(),
                    plugin.path.display(),
                    plugin.checksum
                );
            }
        }
        (other, _) => {
            return Err(sen::Error::validation(format!("unknown command or arity: {}", other)))
        }
    }
    Ok(())
}

//! Discovery through the manager: bounds, audit trail and async wrappers

mod common;

use common::{plugin_file, write_plugin, FakeLoader};
use sen_plugin_host::{
    audit::AuditDetails, AuditEventType, Context, DiscoveryLimit, DiscoveryLimits,
    MemoryAuditSink, PluginError, PluginManager, PluginSecurityConfig,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// `levels` nested directories, each holding one plugin file
fn deep_tree(root: &std::path::Path, levels: usize) -> PathBuf {
    let mut dir = root.to_path_buf();
    for level in 0..levels {
        write_plugin(&dir, &format!("libstore{}", level));
        dir = dir.join("nested");
        fs::create_dir(&dir).unwrap();
    }
    dir
}

#[test]
fn test_discovers_plugins_in_name_order() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "libzeta");
    write_plugin(temp.path(), "libalpha");
    fs::write(temp.path().join("README.txt"), "not a plugin").unwrap();

    let config = PluginSecurityConfig::default().with_allowed_dir(temp.path());
    let manager = PluginManager::with_loader(&config, FakeLoader::memory());
    let found = manager.discover_plugins(&Context::background()).unwrap();

    let names: Vec<_> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![plugin_file("libalpha"), plugin_file("libzeta")]);
}

#[test]
fn test_deep_tree_is_bounded_and_audited() {
    let temp = TempDir::new().unwrap();
    deep_tree(temp.path(), 30);

    let config = PluginSecurityConfig::default()
        .with_allowed_dir(temp.path())
        .with_discovery_limits(DiscoveryLimits::default().with_max_depth(10));
    let audit = Arc::new(MemoryAuditSink::new());
    let manager =
        PluginManager::with_loader(&config, FakeLoader::memory()).with_audit_sink(audit.clone());

    let found = manager.discover_plugins(&Context::background()).unwrap();
    assert!(!found.is_empty());
    assert!(found.len() <= 11, "walked too deep: {}", found.len());

    let events = audit.find_by_type(AuditEventType::DiscoveryLimitReached);
    assert_eq!(events.len(), 1);
    match &events[0].details {
        AuditDetails::DiscoveryLimit { limit, found: n, .. } => {
            assert_eq!(*limit, DiscoveryLimit::Depth);
            assert_eq!(*n, found.len());
        }
        other => panic!("unexpected details: {:?}", other),
    }
}

#[test]
fn test_file_limit_keeps_partial_results() {
    let temp = TempDir::new().unwrap();
    for i in 0..20 {
        write_plugin(temp.path(), &format!("libstore{:02}", i));
    }

    let config = PluginSecurityConfig::default()
        .with_allowed_dir(temp.path())
        .with_discovery_limits(DiscoveryLimits::default().with_max_files(5));
    let audit = Arc::new(MemoryAuditSink::new());
    let manager =
        PluginManager::with_loader(&config, FakeLoader::memory()).with_audit_sink(audit.clone());

    let found = manager.discover_plugins(&Context::background()).unwrap();
    assert_eq!(found.len(), 5);
    assert_eq!(audit.count(), 1);
}

#[test]
fn test_zero_timeout_returns_promptly() {
    let temp = TempDir::new().unwrap();
    deep_tree(temp.path(), 30);

    let config = PluginSecurityConfig::default()
        .with_allowed_dir(temp.path())
        .with_discovery_limits(
            DiscoveryLimits::default()
                .with_max_depth(100)
                .with_timeout(Duration::ZERO),
        );
    let manager = PluginManager::with_loader(&config, FakeLoader::memory());

    let started = Instant::now();
    let found = manager.discover_plugins(&Context::background()).unwrap();
    assert!(found.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_cancelled_discovery_is_an_error() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "libmemory");
    let config = PluginSecurityConfig::default().with_allowed_dir(temp.path());
    let manager = PluginManager::with_loader(&config, FakeLoader::memory());

    let ctx = Context::background();
    ctx.cancel();
    assert!(matches!(
        manager.discover_plugins(&ctx),
        Err(PluginError::Discovery(_))
    ));
}

#[test]
fn test_missing_allowed_dir_is_skipped() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "libmemory");
    let config = PluginSecurityConfig::default()
        .with_allowed_dir(temp.path().join("does-not-exist"))
        .with_allowed_dir(temp.path());
    let manager = PluginManager::with_loader(&config, FakeLoader::memory());

    let found = manager.discover_plugins(&Context::background()).unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_discover_then_load_async() {
    let temp = TempDir::new().unwrap();
    write_plugin(temp.path(), "libmemory");
    let config = PluginSecurityConfig::default().with_allowed_dir(temp.path());
    let manager = PluginManager::with_loader(&config, FakeLoader::memory());
    let ctx = Context::background().with_timeout(Duration::from_secs(5));

    let found = manager.discover_plugins_async(ctx.clone()).await.unwrap();
    assert_eq!(found.len(), 1);

    let plugin = manager
        .load_plugin_async(ctx, found[0].clone())
        .await
        .unwrap();
    assert_eq!(plugin.name(), "memory");
}

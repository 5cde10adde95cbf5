//! Integration tests for validators driven by loaded configuration

use sen_security::{
    analyze_file_permissions, validate_secure_path, FileOperation, InputValidator,
    RecommendedAction, RiskLevel, SecurityConfig, ValidationConfig,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_file_drives_validation() {
    let temp = TempDir::new().expect("tempdir");
    let config_path = temp.path().join("security.json");
    fs::write(
        &config_path,
        r#"{
            "max_arg_length": 32,
            "trusted_env_prefixes": ["MYAPP_"],
            "security": { "allowed_paths": ["/srv/app"], "max_path_depth": 4 }
        }"#,
    )
    .expect("write config");

    let config: ValidationConfig = sen::config::load_json(&config_path).expect("load config");
    let validator = InputValidator::new(config);

    assert!(validator.validate_path_flag("data", "/srv/app/data.db").valid);
    let outside = validator.validate_path_flag("data", "/srv/other/data.db");
    assert!(!outside.valid);
    assert_eq!(
        outside.recommended_action,
        RecommendedAction::RejectDangerousPath
    );

    assert!(!validator.validate_string_flag("name", &"x".repeat(33)).valid);

    let env = validator.validate_environment_value("MYAPP_MODE", "fast");
    assert!(env.warnings.is_empty());
    let env = validator.validate_environment_value("SEN_MODE", "fast");
    assert_eq!(env.warnings.len(), 1);
}

#[test]
fn test_path_rejection_becomes_error() {
    let err = validate_secure_path("../../etc/shadow", &SecurityConfig::default())
        .into_result()
        .unwrap_err();
    assert_eq!(err.code(), sen::ErrorCode::Validation);
    assert_eq!(err.severity(), sen::Severity::Critical);
    assert_eq!(err.context_value("risk"), Some("critical"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_input_rejection_becomes_error() {
    let validator = InputValidator::default();
    let err = validator
        .validate_environment_value("UNTRUSTED", "$(curl evil)")
        .into_result()
        .unwrap_err();
    assert!(err.message().starts_with("input rejected"));
    assert_eq!(err.context_value("action"), Some("reject_untrusted_env"));
}

#[test]
fn test_directory_report() {
    let temp = TempDir::new().expect("tempdir");
    let report = analyze_file_permissions(
        temp.path().to_str().expect("utf-8 tempdir"),
        &SecurityConfig::default(),
    )
    .expect("analyze");
    assert!(report.is_directory);
    assert!(report.permits(FileOperation::Read));
}

#[test]
fn test_missing_file_is_not_found() {
    let temp = TempDir::new().expect("tempdir");
    let missing = temp.path().join("absent.txt");
    let err: sen::Error = analyze_file_permissions(
        missing.to_str().expect("utf-8 tempdir"),
        &SecurityConfig::default(),
    )
    .unwrap_err()
    .into();
    assert_eq!(err.code(), sen::ErrorCode::NotFound);
}

#[cfg(unix)]
#[test]
fn test_world_writable_file_flagged() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().expect("tempdir");
    let file = temp.path().join("shared.txt");
    fs::write(&file, "data").expect("write");
    fs::set_permissions(&file, fs::Permissions::from_mode(0o666)).expect("chmod");

    let validator = InputValidator::default();
    let result = validator.validate_file_operation(file.to_str().expect("utf-8"), FileOperation::Read);
    assert!(result.valid);
    assert_eq!(result.recommended_action, RecommendedAction::ReviewPermissions);
    assert_eq!(
        result.permission.expect("permission report").risk,
        RiskLevel::Critical
    );

    let flag = validator.validate_path_flag("input", file.to_str().expect("utf-8"));
    assert!(flag.valid);
    assert_eq!(flag.recommended_action, RecommendedAction::ReviewPermissions);
}

#[test]
fn test_concurrent_validation_shares_cache() {
    let validator = std::sync::Arc::new(InputValidator::default());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let validator = validator.clone();
            std::thread::spawn(move || {
                for j in 0..50 {
                    let value = format!("value-{}", (i + j) % 10);
                    assert!(validator.validate_string_flag("flag", &value).valid);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    let stats = validator.cache_stats();
    assert_eq!(stats.hits + stats.misses, 400);
    assert!(stats.entries <= 10);
}

//! JSON configuration loading.
//!
//! Policy structs across the workspace derive `Deserialize` with
//! `#[serde(default)]`, so a config file only needs the keys it overrides.

use crate::error::{display_safe, Error, ErrorCode, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Parse a configuration value from a JSON string.
pub fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        Error::validation(format!("invalid configuration: {}", e))
            .with_context("line", e.line().to_string())
            .with_source(e)
    })
}

/// Load a configuration value from a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let shown = display_safe(&path.to_string_lossy());
    let content = std::fs::read_to_string(path).map_err(|e| {
        let code = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCode::NotFound
        } else {
            ErrorCode::Internal
        };
        Error::new(code, format!("failed to read configuration file {}", shown))
            .with_context("path", shown.clone())
            .with_source(e)
    })?;

    from_json_str(&content).map_err(|e| e.with_context("path", shown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        limit: usize,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".into(),
                limit: 10,
            }
        }
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let sample: Sample = from_json_str(r#"{"limit": 3}"#).unwrap();
        assert_eq!(sample.name, "default");
        assert_eq!(sample.limit, 3);
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = from_json_str::<Sample>("{ not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_json::<Sample>(dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sen.json");
        std::fs::write(&path, r#"{"name": "custom"}"#).unwrap();

        let sample: Sample = load_json(&path).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "custom".into(),
                limit: 10
            }
        );
    }
}

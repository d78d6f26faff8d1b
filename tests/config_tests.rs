//! EngineConfig file handling

use mdnote::auth::AuthMethod;
use mdnote::config::EngineConfig;
use mdnote::editor::SessionOptions;
use mdnote::error::EngineError;
use tempfile::TempDir;

#[test]
fn test_save_then_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = EngineConfig {
        preferred_auth_method: AuthMethod::Password,
        preview_visible_default: false,
        notification_default_duration_ms: 0,
        ..EngineConfig::default()
    };
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.notification_default_duration().is_zero());
    assert!(!SessionOptions::from_config(&loaded).preview_visible);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_invalid_json_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        EngineConfig::load(&path),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn test_loaded_zero_attempts_are_coerced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "max_password_attempts": 0 }"#).unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.max_password_attempts, 3);
}

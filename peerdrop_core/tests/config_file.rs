//! Config persistence through the PEERDROP_CONFIG_DIR override.
//! Kept alone in this binary because it mutates the process environment.

use peerdrop_core::config::{AppConfig, CONFIG_DIR_ENV, get_config_dir};
use std::time::Duration;

#[test]
fn test_config_save_load_and_fallbacks() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var(CONFIG_DIR_ENV, dir.path());
    }
    assert_eq!(get_config_dir().unwrap(), dir.path());

    // 1. Nothing on disk yet
    assert_eq!(AppConfig::load(), AppConfig::default());

    // 2. Round trip
    let config = AppConfig {
        handshake_interval_ms: 120,
        handshake_max_attempts: Some(7),
        handshake_deadline_ms: Some(5_000),
        download_path: dir.path().join("inbox"),
        ..AppConfig::default()
    };
    config.save().unwrap();
    let loaded = AppConfig::load();
    assert_eq!(loaded, config);
    assert_eq!(loaded.retry_policy().deadline, Some(Duration::from_secs(5)));

    // 3. Corrupt file falls back to defaults
    std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
    assert_eq!(AppConfig::load(), AppConfig::default());
}

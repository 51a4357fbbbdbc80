//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! and loaded back with identical field values.

use agentlink_core::config::RealtimeConfig;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("realtime.json");

    let config = RealtimeConfig::default();
    config.save(&path).unwrap();

    let loaded = RealtimeConfig::load(&path).unwrap();
    // Backoff defaults should survive the roundtrip
    assert_eq!(loaded.reconnect.base_delay_ms, config.reconnect.base_delay_ms);
    assert_eq!(loaded.reconnect.max_attempts, config.reconnect.max_attempts);
    // Heartbeat and queue defaults should survive the roundtrip
    assert_eq!(loaded.heartbeat.interval_secs, config.heartbeat.interval_secs);
    assert_eq!(loaded.queue.dedup_window_ms, config.queue.dedup_window_ms);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("realtime.json");

    let mut config = RealtimeConfig::default();
    config.endpoint.base_url = "wss://agents.example.com/ws".to_string();
    config.reconnect.max_attempts = 5;
    config.save(&path).unwrap();

    let loaded = RealtimeConfig::load(&path).unwrap();
    assert_eq!(loaded.endpoint.base_url, "wss://agents.example.com/ws");
    assert_eq!(loaded.reconnect.max_attempts, 5);
}

#[test]
fn test_config_load_nonexistent() {
    let result = RealtimeConfig::load(Path::new("/nonexistent/realtime.json"));
    assert!(result.is_err());
}

#[test]
fn test_config_partial_file_keeps_defaults() {
    let config = RealtimeConfig::parse(r#"{"heartbeat":{"interval_secs":5}}"#).unwrap();
    assert_eq!(config.heartbeat.interval_secs, 5);
    assert_eq!(config.reconnect.base_delay_ms, 1000);
    assert_eq!(config.queue.max_retries, 3);
}

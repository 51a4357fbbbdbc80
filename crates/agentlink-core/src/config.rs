//! Realtime client configuration.
//!
//! All knobs the connection layer exposes, with serde defaults so a partial
//! config file only needs to name the sections it overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level configuration for the realtime client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Endpoint settings.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Reconnection backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Keep-alive heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Outbound message queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Correlated request settings.
    #[serde(default)]
    pub request: RequestConfig,
}

impl RealtimeConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse configuration from a JSON string.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants a supplied configuration must satisfy. `parse` and
    /// `load` apply this automatically.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.interval_secs == 0 {
            return Err(Error::config("heartbeat.interval_secs must be at least 1"));
        }
        Ok(())
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Build the connection URL, appending the optional session/agent
    /// identifier to the base path.
    pub fn endpoint_url(&self, target: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint.base_url)?;
        if let Some(target) = target {
            let path = if url.path().ends_with('/') {
                format!("{}{}", url.path(), target)
            } else {
                format!("{}/{}", url.path(), target)
            };
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base WebSocket URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive failed attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

/// Keep-alive heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between keep-alive probes.
    #[serde(default = "default_heartbeat_secs")]
    pub interval_secs: u64,
}

impl HeartbeatConfig {
    /// Probe interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_secs(),
        }
    }
}

fn default_heartbeat_secs() -> u64 {
    30
}

/// Outbound message queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failed delivery attempts before a message is dropped.
    #[serde(default = "default_queue_retries")]
    pub max_retries: u32,

    /// Window within which an identical payload on the same channel is
    /// treated as one logical send, in milliseconds.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Maximum number of buffered messages.
    #[serde(default = "default_queue_size")]
    pub max_size: usize,
}

impl QueueConfig {
    /// Dedup window as a `Duration`.
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_queue_retries(),
            dedup_window_ms: default_dedup_window_ms(),
            max_size: default_queue_size(),
        }
    }
}

fn default_queue_retries() -> u32 {
    3
}

fn default_dedup_window_ms() -> u64 {
    5000
}

fn default_queue_size() -> usize {
    1000
}

/// Correlated request configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Timeout for a single attempt, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,

    /// Resends after the first timeout before rejecting.
    #[serde(default = "default_request_retries")]
    pub max_retries: u32,
}

impl RequestConfig {
    /// Per-attempt timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_request_timeout_ms(),
            max_retries: default_request_retries(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_request_retries() -> u32 {
    2
}

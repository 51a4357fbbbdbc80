//! Reconnect backoff policy.

use agentlink_core::config::ReconnectConfig;
use std::time::Duration;

/// Computes reconnect delays: `min(base * 2^attempt, cap)`, with a ceiling
/// on total attempts. Exceeding the ceiling is a terminal failure, not a
/// silent retry.
#[derive(Debug, Clone)]
pub struct BackoffController {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffController {
    /// Create a backoff controller.
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Create from configuration.
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
        )
    }

    /// Delay before reconnect attempt number `attempt` (zero-based).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// True once `attempt` reaches the ceiling; no further reconnects.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// The configured attempt ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

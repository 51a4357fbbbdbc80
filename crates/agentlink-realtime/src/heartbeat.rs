//! Keep-alive probe bookkeeping.

use std::time::Duration;

/// Tracks outstanding keep-alive probes on an open connection.
///
/// The connection driver owns the timer; this type only records whether the
/// previous probe was acknowledged before the next one is due. A probe left
/// unanswered for a full interval means the connection is open at the
/// transport level but no longer functional.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    awaiting_pong: bool,
}

impl HeartbeatMonitor {
    /// Create a monitor with the given probe interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            awaiting_pong: false,
        }
    }

    /// The probe interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that a probe was sent.
    pub fn on_ping_sent(&mut self) {
        self.awaiting_pong = true;
    }

    /// Record an acknowledgement.
    pub fn on_pong(&mut self) {
        self.awaiting_pong = false;
    }

    /// True when the previous probe went unanswered for a full interval.
    pub fn is_overdue(&self) -> bool {
        self.awaiting_pong
    }
}

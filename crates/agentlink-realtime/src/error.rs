//! Realtime client error types.

use thiserror::Error;

/// Errors that can occur in the realtime connection layer.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Core protocol/configuration error.
    #[error("Core error: {0}")]
    Core(#[from] agentlink_core::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No open connection.
    #[error("Not connected")]
    NotConnected,

    /// The outbound queue is at capacity.
    #[error("Outbound queue is full")]
    QueueFull,

    /// A correlated request received no response.
    #[error("Request {id} timed out after {attempts} attempts")]
    RequestTimeout {
        /// The correlation ID of the request.
        id: String,
        /// Total attempts made, including resends.
        attempts: u32,
    },

    /// A correlated request was abandoned before a response arrived.
    #[error("Request abandoned before a response arrived")]
    RequestAbandoned,

    /// The reconnect attempt ceiling was reached.
    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }
}

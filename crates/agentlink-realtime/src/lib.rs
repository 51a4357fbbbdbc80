//! # agentlink-realtime
//!
//! Resilient realtime connection layer for AgentLink.
//!
//! This crate owns the stateful part of the client:
//!
//! - **ConnectionManager**: connection lifecycle state machine with
//!   automatic reconnection and exponential backoff
//! - **MessageQueue**: buffering and retry of sends made while disconnected
//! - **HeartbeatMonitor**: keep-alive probes detecting silently-dead
//!   connections
//! - **EventDispatcher**: pub/sub fan-out of decoded events
//! - **RequestCorrelator**: async request/response over the duplex stream

pub mod backoff;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod queue;
pub mod transport;

pub use backoff::BackoffController;
pub use connection::{ConnectionManager, ConnectionState, SendStatus};
pub use correlator::{RequestCorrelator, RequestKind};
pub use dispatcher::{EventDispatcher, EventListener, Subscription};
pub use error::RealtimeError;
pub use heartbeat::HeartbeatMonitor;
pub use queue::{MessageQueue, QueueStats};
pub use transport::{Transport, TransportEvent, TransportSink, TransportStream, WsTransport};

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

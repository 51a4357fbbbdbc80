//! # agentlink-core
//!
//! Wire protocol types, events, and configuration for AgentLink.
//!
//! This crate provides the shared vocabulary of the realtime layer:
//!
//! - **Frames**: the JSON wire protocol exchanged with the agent backend
//! - **Events**: the decoded event union delivered to subscribers
//! - **Configuration**: loading, validation, and defaults for the client
//! - **Utilities**: ID generation

pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod id;

// Re-exports for convenience
pub use config::RealtimeConfig;
pub use error::{Error, Result};
pub use event::ClientEvent;
pub use frame::{Attachment, ChatMessage, ClientFrame, ServerFrame};

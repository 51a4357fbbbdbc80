//! Decoded client events.
//!
//! `ClientEvent` is the closed union delivered to dispatcher subscribers.
//! Most variants are decoded wire frames; `Connect`, `Disconnect`, `Error`,
//! and `SendFailed` are produced by the connection layer itself.

use crate::frame::{ChatMessage, ServerFrame};

/// An event delivered to subscribers. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection was established.
    Connect,

    /// The connection closed.
    Disconnect { reason: Option<String> },

    /// A chat message arrived.
    Message { message: ChatMessage },

    /// An agent is composing a response.
    Typing { source_id: String },

    /// Incremental log output tied to a message.
    LogUpdate {
        log: String,
        correlation_id: String,
    },

    /// A terminal or protocol-level failure.
    Error { detail: String },

    /// Keep-alive acknowledgement.
    Pong,

    /// Event addressed to a UI component.
    UiEvent {
        component_id: String,
        action: String,
        data: serde_json::Value,
    },

    /// The set of UI components the backend exposes.
    ComponentRegistrations { list: Vec<serde_json::Value> },

    /// A queued message exceeded its retry ceiling and was dropped.
    SendFailed { message_id: String },
}

impl ClientEvent {
    /// Convert a decoded wire frame into its event form.
    pub fn from_frame(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Message { message } => Self::Message { message },
            ServerFrame::Typing { agent_id } => Self::Typing { source_id: agent_id },
            ServerFrame::LogUpdate { log, message_id } => Self::LogUpdate {
                log,
                correlation_id: message_id,
            },
            ServerFrame::Pong => Self::Pong,
            ServerFrame::UiEvent { data } => {
                let component_id = data
                    .get("component")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let action = data
                    .get("action")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Self::UiEvent {
                    component_id,
                    action,
                    data,
                }
            }
            ServerFrame::ComponentRegistrations { data } => {
                Self::ComponentRegistrations { list: data }
            }
        }
    }

    /// Channel this event is scoped to, if any. Used by channel-scoped
    /// subscriptions.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Message { message } => Some(&message.agent_id),
            Self::Typing { source_id } => Some(source_id),
            Self::UiEvent { component_id, .. } if !component_id.is_empty() => Some(component_id),
            _ => None,
        }
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::LogUpdate { .. } => "log_update",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
            Self::UiEvent { .. } => "ui_event",
            Self::ComponentRegistrations { .. } => "component_registrations",
            Self::SendFailed { .. } => "send_failed",
        }
    }
}

impl From<ServerFrame> for ClientEvent {
    fn from(frame: ServerFrame) -> Self {
        Self::from_frame(frame)
    }
}

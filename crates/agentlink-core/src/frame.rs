//! Wire protocol frames.
//!
//! One JSON text frame per message, tagged by a `type` field. `ClientFrame`
//! covers the client-to-server direction, `ServerFrame` the reverse.
//! Decoding never panics: malformed input or an unrecognized `type` is
//! logged and dropped.

use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A chat message payload carried in `message` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message author role (`user`, `assistant`, ...).
    pub role: String,

    /// Message text.
    pub content: String,

    /// Agent/session the message belongs to.
    pub agent_id: String,

    /// Client-assigned message ID.
    pub id: String,

    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Optional attachments, carried as base64 text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl ChatMessage {
    /// Create a user message with a fresh ID and current timestamp.
    pub fn user(content: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            agent_id: agent_id.into(),
            id: crate::id::uuid(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            attachments: None,
        }
    }

    /// Attach files to the message.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = Some(attachments);
        self
    }
}

/// A file attachment, content pre-encoded as base64 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File name.
    pub name: String,

    /// MIME type.
    pub mime_type: String,

    /// Base64-encoded content.
    pub data: String,
}

/// Frames sent from the client to the agent backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A chat message.
    Message { message: ChatMessage },

    /// Ask the backend to clear the current conversation.
    ClearConversation,

    /// Keep-alive probe.
    Ping,

    /// Correlated data request for a UI component.
    DataRequest {
        component: String,
        action: String,
        data: serde_json::Value,
    },

    /// Correlated user action on a UI component.
    UserAction {
        component: String,
        action: String,
        data: serde_json::Value,
    },
}

impl ClientFrame {
    /// Encode the frame as a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames received from the agent backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A chat message from the agent.
    Message { message: ChatMessage },

    /// The agent is composing a response.
    Typing {
        #[serde(rename = "agentId")]
        agent_id: String,
    },

    /// Incremental log output tied to a message.
    LogUpdate {
        log: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// Keep-alive acknowledgement.
    Pong,

    /// Event addressed to a UI component.
    UiEvent { data: serde_json::Value },

    /// The set of UI components the backend exposes.
    ComponentRegistrations { data: Vec<serde_json::Value> },
}

impl ServerFrame {
    /// Decode a wire frame. Malformed JSON or an unrecognized `type` is
    /// logged and dropped.
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                None
            }
        }
    }
}

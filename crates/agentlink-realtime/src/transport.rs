//! Transport abstraction over the duplex connection.
//!
//! The connection core depends only on the narrow traits here, so a
//! non-WebSocket host (or a test) can supply its own implementation.
//! Production code uses `WsTransport`, backed by tokio-tungstenite.

use crate::error::RealtimeError;
use crate::Result;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

/// Event surfaced by the transport read half.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A text frame arrived.
    Text(String),

    /// The peer closed the connection. `clean` distinguishes a normal
    /// closure from an abnormal one.
    Closed {
        clean: bool,
        reason: Option<String>,
    },

    /// The transport failed.
    Error(String),
}

/// Factory for duplex connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection to `url`, returning its write and read halves.
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)>;
}

/// Write half of a connection.
#[async_trait]
pub trait TransportSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait TransportStream: Send {
    /// Next transport event; `None` once the stream is exhausted.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

/// WebSocket transport backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        Self
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::transport(e.to_string()))?;
        debug!("WebSocket connected to {}", url);

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsReader { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(WsMessage::Text(text.to_string()))
            .await
            .map_err(|e| RealtimeError::transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .send(WsMessage::Close(None))
            .await
            .map_err(|e| RealtimeError::transport(e.to_string()))
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WsReader {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(TransportEvent::Text(text)),
                Ok(WsMessage::Close(frame)) => {
                    let clean = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                    return Some(TransportEvent::Closed { clean, reason });
                }
                Ok(WsMessage::Binary(_)) => {
                    warn!("Ignoring binary frame");
                }
                // Protocol-level ping/pong is handled by tungstenite itself;
                // the application heartbeat uses JSON frames.
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
            }
        }
    }
}

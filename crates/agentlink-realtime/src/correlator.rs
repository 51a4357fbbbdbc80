//! Request/response correlation over the event stream.
//!
//! Component data requests and user actions are fire-and-forget at the
//! transport level; the backend answers with a `ui_event` carrying the
//! request ID back. `RequestCorrelator` tags each outgoing request with a
//! fresh UUID, parks the caller on a oneshot, and completes it when the
//! matching response arrives. Unanswered requests are resent a bounded
//! number of times before failing with a timeout error.

use crate::connection::ConnectionManager;
use crate::dispatcher::{EventDispatcher, EventListener, Subscription};
use crate::error::RealtimeError;
use crate::Result;
use agentlink_core::config::RequestConfig;
use agentlink_core::frame::ClientFrame;
use agentlink_core::{id, ClientEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Which request frame a correlated call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A component asking the backend for data.
    DataRequest,

    /// A user interaction forwarded to the backend.
    UserAction,
}

type PendingMap = Mutex<HashMap<String, oneshot::Sender<Value>>>;

/// Matches backend responses to in-flight requests by ID.
pub struct RequestCorrelator {
    manager: Arc<ConnectionManager>,
    config: RequestConfig,
    pending: Arc<PendingMap>,
    subscription: Subscription,
}

impl RequestCorrelator {
    /// Create a correlator listening for responses on `dispatcher`.
    pub fn new(
        manager: Arc<ConnectionManager>,
        dispatcher: &Arc<EventDispatcher>,
        config: RequestConfig,
    ) -> Self {
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let subscription = dispatcher.subscribe(Arc::new(ResponseListener {
            pending: pending.clone(),
        }));
        Self {
            manager,
            config,
            pending,
            subscription,
        }
    }

    /// Send a correlated request and wait for its response payload.
    ///
    /// The request is retransmitted after each timeout until the retry
    /// budget runs out; a late response to an earlier transmission still
    /// completes the call, since every transmission carries the same ID.
    pub async fn request(
        &self,
        kind: RequestKind,
        component: &str,
        action: &str,
        data: Value,
    ) -> Result<Value> {
        let request_id = id::uuid();
        let data = tag_payload(data, &request_id);

        let frame = match kind {
            RequestKind::DataRequest => ClientFrame::DataRequest {
                component: component.to_string(),
                action: action.to_string(),
                data,
            },
            RequestKind::UserAction => ClientFrame::UserAction {
                component: component.to_string(),
                action: action.to_string(),
                data,
            },
        };

        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);
        // the caller may drop this future at any await point; the guard
        // keeps the pending map from accumulating dead entries
        let _cleanup = PendingEntry {
            pending: self.pending.clone(),
            id: request_id.clone(),
        };

        let attempts = self.config.max_retries + 1;
        for attempt in 0..attempts {
            if let Err(e) = self.manager.send_frame(&frame).await {
                // keep waiting out the window; a reconnect may land the
                // retransmission
                warn!(
                    "Request {} transmit failed (attempt {}): {}",
                    request_id,
                    attempt + 1,
                    e
                );
            }

            match timeout(self.config.timeout(), &mut rx).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(_)) => return Err(RealtimeError::RequestAbandoned),
                Err(_) => {
                    debug!(
                        "Request {} timed out (attempt {} of {})",
                        request_id,
                        attempt + 1,
                        attempts
                    );
                }
            }
        }

        Err(RealtimeError::RequestTimeout {
            id: request_id,
            attempts,
        })
    }

    /// Number of requests awaiting a response.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Stop listening and fail every in-flight request.
    pub fn shutdown(&self) {
        self.subscription.unsubscribe();
        // dropping the senders wakes the waiters with RequestAbandoned
        self.pending.lock().clear();
    }
}

/// Removes its pending-map entry when dropped, so a request future that is
/// cancelled mid-flight cannot leak its entry. Removal is a no-op when the
/// response listener or `shutdown` already took the entry out.
struct PendingEntry {
    pending: Arc<PendingMap>,
    id: String,
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Fold arbitrary payload JSON into an object carrying `requestId`.
fn tag_payload(data: Value, request_id: &str) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    map.insert(
        "requestId".to_string(),
        Value::String(request_id.to_string()),
    );
    Value::Object(map)
}

struct ResponseListener {
    pending: Arc<PendingMap>,
}

#[async_trait]
impl EventListener for ResponseListener {
    async fn on_event(&self, event: &ClientEvent) -> Result<()> {
        if let ClientEvent::UiEvent { data, .. } = event {
            if let Some(request_id) = data.get("requestId").and_then(Value::as_str) {
                if let Some(tx) = self.pending.lock().remove(request_id) {
                    debug!("Correlated response for request {}", request_id);
                    let _ = tx.send(data.clone());
                }
                // responses for unknown or already-completed IDs are ignored
            }
        }
        Ok(())
    }
}

//! Shared support for the integration suite.
//!
//! `MockTransport` stands in for the WebSocket layer: each successful dial
//! hands the test a [`ConnHandle`] that plays the server side of that
//! connection, and dials can be scripted to fail so reconnect behavior is
//! observable without a network.

use agentlink_core::config::RealtimeConfig;
use agentlink_core::ClientEvent;
use agentlink_realtime::{
    ConnectionManager, ConnectionState, EventDispatcher, RealtimeError, Result, Subscription,
    Transport, TransportEvent, TransportSink, TransportStream,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// In-memory transport whose connections are driven by the test.
pub struct MockTransport {
    refuse: AtomicU32,
    dials: AtomicUsize,
    conn_tx: mpsc::UnboundedSender<ConnHandle>,
}

impl MockTransport {
    /// Create a transport plus the receiver yielding one [`ConnHandle`]
    /// per accepted dial.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConnHandle>) {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                refuse: AtomicU32::new(0),
                dials: AtomicUsize::new(0),
                conn_tx,
            }),
            conn_rx,
        )
    }

    /// Refuse the next `n` dials with a transport error.
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Total dials attempted, refused ones included.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>)> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(RealtimeError::transport("connection refused"));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = self.conn_tx.send(ConnHandle {
            url: url.clone(),
            sent: sent_rx,
            events: events_tx,
        });
        Ok((
            Box::new(MockSink { sent: sent_tx }),
            Box::new(MockStream { events: events_rx }),
        ))
    }
}

/// Server side of one mock connection.
pub struct ConnHandle {
    /// URL the client dialed.
    pub url: Url,
    sent: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ConnHandle {
    /// Deliver a text frame to the client.
    pub fn push_text(&self, frame: serde_json::Value) {
        let _ = self.events.send(TransportEvent::Text(frame.to_string()));
    }

    /// Close the connection from the server side.
    pub fn close(&self, clean: bool) {
        let _ = self.events.send(TransportEvent::Closed {
            clean,
            reason: Some("closed by peer".to_string()),
        });
    }

    /// Next frame the client sent, parsed as JSON. Panics if the
    /// connection is gone.
    pub async fn next_sent(&mut self) -> serde_json::Value {
        let text = self.sent.recv().await.expect("client sent no more frames");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Next already-sent frame, if any, without waiting.
    pub fn try_sent(&mut self) -> Option<serde_json::Value> {
        self.sent
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("client sent invalid JSON"))
    }
}

struct MockSink {
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sent
            .send(text.to_string())
            .map_err(|_| RealtimeError::transport("peer gone"))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MockStream {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Records every dispatched event for later assertions.
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ClientEvent>>>,
    _sub: Subscription,
}

impl EventRecorder {
    /// Subscribe a recorder to `dispatcher`.
    pub fn attach(dispatcher: &Arc<EventDispatcher>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let sub = dispatcher.subscribe_fn(move |event| sink.lock().push(event.clone()));
        Self { events, _sub: sub }
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    /// Event kinds in dispatch order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    /// Number of recorded events of the given kind.
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

/// Everything a connection test needs, wired together.
pub struct Rig {
    pub manager: Arc<ConnectionManager>,
    pub transport: Arc<MockTransport>,
    pub connections: mpsc::UnboundedReceiver<ConnHandle>,
    pub dispatcher: Arc<EventDispatcher>,
    pub recorder: EventRecorder,
}

/// Build a rig with the given configuration.
pub fn rig_with(config: RealtimeConfig) -> Rig {
    let dispatcher = EventDispatcher::new();
    let (transport, connections) = MockTransport::new();
    let manager = Arc::new(ConnectionManager::new(
        config,
        transport.clone(),
        dispatcher.clone(),
    ));
    let recorder = EventRecorder::attach(&dispatcher);
    Rig {
        manager,
        transport,
        connections,
        dispatcher,
        recorder,
    }
}

/// Build a rig with [`test_config`].
pub fn rig() -> Rig {
    rig_with(test_config())
}

/// Default configuration with the keep-alive pushed out of the way, so
/// tests that pause time do not trip heartbeat probes by accident.
pub fn test_config() -> RealtimeConfig {
    let mut config = RealtimeConfig::default();
    config.heartbeat.interval_secs = 600;
    config
}

/// Poll until the manager reaches `state`, panicking after a grace period.
pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    for _ in 0..2000 {
        if manager.state().await == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "timed out waiting for state {}, still {}",
        state,
        manager.state().await
    );
}

//! Connection lifecycle management.
//!
//! `ConnectionManager` owns the single transport connection and its state
//! machine. A driver task per connection generation dials the endpoint,
//! pumps inbound frames into the dispatcher, runs the heartbeat, and walks
//! the backoff schedule after an unclean close. Sends made while
//! disconnected are buffered in the message queue and replayed once the
//! connection is established.

use crate::backoff::BackoffController;
use crate::dispatcher::EventDispatcher;
use crate::error::RealtimeError;
use crate::heartbeat::HeartbeatMonitor;
use crate::queue::MessageQueue;
use crate::transport::{Transport, TransportEvent, TransportSink, TransportStream};
use crate::Result;
use agentlink_core::config::RealtimeConfig;
use agentlink_core::frame::{ChatMessage, ClientFrame, ServerFrame};
use agentlink_core::ClientEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A dial is in progress.
    Connecting,

    /// The connection is open.
    Connected,

    /// No connection, and none scheduled.
    Disconnected,

    /// Waiting out the backoff delay before the next dial.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Outcome of a `send` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Transmitted on the open connection.
    Sent,

    /// Buffered for delivery after the next successful connect. Callers
    /// needing immediate delivery should treat this as "not delivered" and
    /// may fall back to another path.
    Queued,
}

impl SendStatus {
    /// True when the message actually left over the realtime channel.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Owns the transport connection and the reconnect state machine.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: RealtimeConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<EventDispatcher>,
    queue: MessageQueue,
    backoff: BackoffController,
    state: RwLock<ConnectionState>,
    sink: Mutex<Option<Box<dyn TransportSink>>>,
    target: RwLock<Option<String>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    /// Bumped on every connect/disconnect. A driver observing a newer value
    /// than its own is superseded and must exit without touching shared
    /// state, which makes stale timer callbacks a guaranteed no-op.
    generation: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager. Nothing is dialed until `connect` is called.
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let backoff = BackoffController::from_config(&config.reconnect);
        let queue = MessageQueue::new(config.queue.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                dispatcher,
                queue,
                backoff,
                state: RwLock::new(ConnectionState::Disconnected),
                sink: Mutex::new(None),
                target: RwLock::new(None),
                shutdown: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    /// True while the connection is open.
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// The event dispatcher fed by this connection.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }

    /// The outbound message queue.
    pub fn queue(&self) -> &MessageQueue {
        &self.shared.queue
    }

    /// Open the connection, optionally scoped to a session/agent id that is
    /// appended to the endpoint path. A no-op while a connection or
    /// reconnection is already in flight, so duplicate sockets cannot be
    /// created.
    pub async fn connect(&self, target: Option<&str>) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if *state != ConnectionState::Disconnected {
                debug!("connect() ignored in state {}", state);
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        if let Some(target) = target {
            *self.shared.target.write().await = Some(target.to_string());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shared.shutdown.lock().await = Some(shutdown_tx);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            drive(shared, generation, shutdown_rx).await;
        });
        Ok(())
    }

    /// Intentionally close the connection from any state. Cancels the
    /// backoff timer and heartbeat, never triggers auto-reconnect, and
    /// keeps queued messages for the next explicit `connect`.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(shutdown_tx) = self.shared.shutdown.lock().await.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }

        let mut state = self.shared.state.write().await;
        if *state != ConnectionState::Disconnected {
            info!("Disconnected (intentional)");
            *state = ConnectionState::Disconnected;
            drop(state);
            self.shared
                .dispatcher
                .dispatch(&ClientEvent::Disconnect { reason: None })
                .await;
        }
        Ok(())
    }

    /// Send a chat message. Returns `Sent` when transmitted on the open
    /// connection; otherwise the message is buffered, a `connect` is
    /// triggered as a side effect, and `Queued` is returned. An immediate
    /// transmit failure on an open socket is an error.
    pub async fn send(&self, message: ChatMessage) -> Result<SendStatus> {
        if self.is_connected().await {
            let mut sink_guard = self.shared.sink.lock().await;
            if let Some(sink) = sink_guard.as_mut() {
                let text = ClientFrame::Message { message }.encode()?;
                sink.send_text(&text).await?;
                return Ok(SendStatus::Sent);
            }
        }

        let id = self.shared.queue.enqueue(message).await?;
        debug!("Buffered message {} while not connected", id);
        self.connect(None).await?;
        Ok(SendStatus::Queued)
    }

    /// Send a control frame directly, without queueing. Fails with
    /// `NotConnected` when no connection is open.
    pub async fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let mut sink_guard = self.shared.sink.lock().await;
        match sink_guard.as_mut() {
            Some(sink) => {
                let text = frame.encode()?;
                sink.send_text(&text).await
            }
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Ask the backend to clear the current conversation.
    pub async fn clear_conversation(&self) -> Result<()> {
        self.send_frame(&ClientFrame::ClearConversation).await
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// Intentional shutdown via `disconnect`.
    Shutdown,

    /// The peer closed normally.
    Clean(Option<String>),

    /// The connection failed or died silently.
    Lost(String),
}

/// Dial, run, and re-dial connections for one generation.
async fn drive(shared: Arc<Shared>, generation: u64, mut shutdown_rx: oneshot::Receiver<()>) {
    let mut attempt: u32 = 0;

    loop {
        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        let target = shared.target.read().await.clone();
        let url = match shared.config.endpoint_url(target.as_deref()) {
            Ok(url) => url,
            Err(e) => {
                error!("Invalid endpoint configuration: {}", e);
                set_state(&shared, generation, ConnectionState::Disconnected).await;
                shared
                    .dispatcher
                    .dispatch(&ClientEvent::Error {
                        detail: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        debug!("Dialing {} (attempt {})", url, attempt);
        match shared.transport.connect(&url).await {
            Ok((sink, mut stream)) => {
                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                attempt = 0;
                *shared.sink.lock().await = Some(sink);
                set_state(&shared, generation, ConnectionState::Connected).await;
                info!("Connected to {}", url);
                shared.dispatcher.dispatch(&ClientEvent::Connect).await;
                flush_queue(&shared).await;

                let end = run_session(&shared, stream.as_mut(), &mut shutdown_rx).await;

                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                if let Some(mut sink) = shared.sink.lock().await.take() {
                    let _ = sink.close().await;
                }

                match end {
                    SessionEnd::Shutdown => {
                        set_state(&shared, generation, ConnectionState::Disconnected).await;
                        return;
                    }
                    SessionEnd::Clean(reason) => {
                        info!("Connection closed by peer");
                        set_state(&shared, generation, ConnectionState::Disconnected).await;
                        shared
                            .dispatcher
                            .dispatch(&ClientEvent::Disconnect { reason })
                            .await;
                        return;
                    }
                    SessionEnd::Lost(reason) => {
                        warn!("Connection lost: {}", reason);
                        shared
                            .dispatcher
                            .dispatch(&ClientEvent::Disconnect {
                                reason: Some(reason),
                            })
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!("Dial attempt {} failed: {}", attempt, e);
            }
        }

        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        // reconnect with backoff, or give up once attempts are exhausted
        if shared.backoff.is_exhausted(attempt) {
            let failure = RealtimeError::ReconnectExhausted { attempts: attempt };
            error!("{}", failure);
            set_state(&shared, generation, ConnectionState::Disconnected).await;
            shared
                .dispatcher
                .dispatch(&ClientEvent::Error {
                    detail: failure.to_string(),
                })
                .await;
            return;
        }

        set_state(&shared, generation, ConnectionState::Reconnecting).await;
        let delay = shared.backoff.next_delay(attempt);
        debug!("Reconnecting in {:?}", delay);
        // the counter reflects attempts scheduled, not just failures seen
        attempt += 1;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                set_state(&shared, generation, ConnectionState::Disconnected).await;
                return;
            }
        }

        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        set_state(&shared, generation, ConnectionState::Connecting).await;
    }
}

/// Pump one connected session until it ends.
async fn run_session(
    shared: &Arc<Shared>,
    stream: &mut dyn TransportStream,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let mut heartbeat = HeartbeatMonitor::new(shared.config.heartbeat.interval());
    let mut ticker = tokio::time::interval(heartbeat.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick resolves immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(TransportEvent::Text(text)) => {
                    if let Some(frame) = ServerFrame::decode(&text) {
                        if matches!(frame, ServerFrame::Pong) {
                            heartbeat.on_pong();
                        }
                        shared.dispatcher.dispatch(&ClientEvent::from_frame(frame)).await;
                    }
                }
                Some(TransportEvent::Closed { clean: true, reason }) => {
                    return SessionEnd::Clean(reason);
                }
                Some(TransportEvent::Closed { clean: false, reason }) => {
                    return SessionEnd::Lost(
                        reason.unwrap_or_else(|| "connection closed".to_string()),
                    );
                }
                Some(TransportEvent::Error(e)) => return SessionEnd::Lost(e),
                None => return SessionEnd::Lost("transport stream ended".to_string()),
            },
            _ = ticker.tick() => {
                if heartbeat.is_overdue() {
                    return SessionEnd::Lost("heartbeat timeout".to_string());
                }
                if let Err(e) = send_ping(shared).await {
                    return SessionEnd::Lost(format!("ping failed: {}", e));
                }
                heartbeat.on_ping_sent();
            },
            _ = &mut *shutdown_rx => return SessionEnd::Shutdown,
        }
    }
}

async fn send_ping(shared: &Arc<Shared>) -> Result<()> {
    let text = ClientFrame::Ping.encode()?;
    let mut sink_guard = shared.sink.lock().await;
    match sink_guard.as_mut() {
        Some(sink) => sink.send_text(&text).await,
        None => Err(RealtimeError::NotConnected),
    }
}

async fn flush_queue(shared: &Arc<Shared>) {
    // the sink guard must be released before any event dispatch: a
    // listener reacting to SendFailed may itself call send/send_frame,
    // which waits on the same lock
    let dropped = {
        let mut sink_guard = shared.sink.lock().await;
        match sink_guard.as_mut() {
            Some(sink) => shared.queue.flush(sink.as_mut()).await,
            None => return,
        }
    };
    for message_id in dropped {
        shared
            .dispatcher
            .dispatch(&ClientEvent::SendFailed { message_id })
            .await;
    }
}

/// Write a state transition, unless this driver generation has been
/// superseded. The generation is checked under the state lock, so a stale
/// driver can never clobber a transition made by `disconnect` or by a
/// newer driver.
async fn set_state(shared: &Arc<Shared>, generation: u64, state: ConnectionState) {
    let mut current = shared.state.write().await;
    if shared.generation.load(Ordering::SeqCst) != generation {
        return;
    }
    if *current != state {
        debug!("Connection state {} -> {}", current, state);
        *current = state;
    }
}

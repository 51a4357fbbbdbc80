//! Publish/subscribe event dispatch.
//!
//! `EventDispatcher` fans decoded events out to subscribers. Delivery is in
//! registration order against a snapshot of the listener list, so a listener
//! registered or removed mid-dispatch does not affect the in-flight
//! delivery, and one failing listener cannot prevent delivery to the rest.

use crate::Result;
use agentlink_core::ClientEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Handler for dispatched client events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event. An error is logged and isolated from other
    /// listeners.
    async fn on_event(&self, event: &ClientEvent) -> Result<()>;
}

#[derive(Clone)]
struct Entry {
    id: u64,
    channel: Option<String>,
    listener: Arc<dyn EventListener>,
}

/// Per-process pub/sub bus for client events.
pub struct EventDispatcher {
    listeners: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create a new dispatcher.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a listener for all events.
    pub fn subscribe(self: &Arc<Self>, listener: Arc<dyn EventListener>) -> Subscription {
        self.subscribe_inner(None, listener)
    }

    /// Register a listener scoped to one named channel.
    pub fn subscribe_channel(
        self: &Arc<Self>,
        channel: impl Into<String>,
        listener: Arc<dyn EventListener>,
    ) -> Subscription {
        self.subscribe_inner(Some(channel.into()), listener)
    }

    /// Register a closure for all events.
    pub fn subscribe_fn<F>(self: &Arc<Self>, f: F) -> Subscription
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.subscribe_inner(None, Arc::new(FnListener(f)))
    }

    fn subscribe_inner(
        self: &Arc<Self>,
        channel: Option<String>,
        listener: Arc<dyn EventListener>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(Entry {
            id,
            channel,
            listener,
        });
        Subscription {
            id,
            dispatcher: Arc::downgrade(self),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver an event to all matching listeners in registration order.
    pub async fn dispatch(&self, event: &ClientEvent) {
        let snapshot: Vec<Entry> = self.listeners.lock().clone();
        for entry in snapshot {
            if let Some(channel) = &entry.channel {
                if event.channel() != Some(channel.as_str()) {
                    continue;
                }
            }
            if let Err(e) = entry.listener.on_event(event).await {
                warn!("Listener failed on {} event: {}", event.kind(), e);
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|e| e.id != id);
    }
}

/// Handle returned by `subscribe`; detaches its listener when unsubscribed.
pub struct Subscription {
    id: u64,
    dispatcher: Weak<EventDispatcher>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the listener. Idempotent, and a no-op once the dispatcher
    /// itself is gone.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(dispatcher) = self.dispatcher.upgrade() {
                dispatcher.remove(self.id);
            }
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct FnListener<F>(F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&ClientEvent) + Send + Sync,
{
    async fn on_event(&self, event: &ClientEvent) -> Result<()> {
        (self.0)(event);
        Ok(())
    }
}

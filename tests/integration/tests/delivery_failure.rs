//! Delivery-failure event tests.
//!
//! A listener reacting to a dropped message may call back into the
//! connection (a caller falling back to another path typically does); the
//! driver must stay responsive while those listeners run.

use agentlink_core::frame::ChatMessage;
use agentlink_core::ClientEvent;
use agentlink_integration_tests::{test_config, ConnHandle, MockTransport};
use agentlink_realtime::{ConnectionManager, EventDispatcher, EventListener, SendStatus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Severs each new connection before the queue can flush, then exercises
/// the connection again from inside the failure notification.
struct ResendingListener {
    manager: Arc<ConnectionManager>,
    connections: parking_lot::Mutex<mpsc::UnboundedReceiver<ConnHandle>>,
    failures: Arc<AtomicUsize>,
}

#[async_trait]
impl EventListener for ResendingListener {
    async fn on_event(&self, event: &ClientEvent) -> agentlink_realtime::Result<()> {
        match event {
            ClientEvent::Connect => {
                // dropping the handle closes the peer side, so the flush
                // that follows this event fails to send
                let handle = self.connections.lock().try_recv().ok();
                drop(handle);
            }
            ClientEvent::SendFailed { .. } => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                // hitting the connection from here must not wedge the driver
                let _ = self.manager.clear_conversation().await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_send_failed_listener_can_use_the_connection() {
    let dispatcher = EventDispatcher::new();
    let (transport, connections) = MockTransport::new();
    let mut config = test_config();
    // first failed send drops the message
    config.queue.max_retries = 0;
    let manager = Arc::new(ConnectionManager::new(
        config,
        transport.clone(),
        dispatcher.clone(),
    ));

    let failures = Arc::new(AtomicUsize::new(0));
    let _sub = dispatcher.subscribe(Arc::new(ResendingListener {
        manager: manager.clone(),
        connections: parking_lot::Mutex::new(connections),
        failures: failures.clone(),
    }));

    let status = manager
        .send(ChatMessage::user("doomed", "agent-1"))
        .await
        .unwrap();
    assert_eq!(status, SendStatus::Queued);

    // the failure notification runs to completion instead of deadlocking
    for _ in 0..200 {
        if failures.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(manager.queue().is_empty().await);
    assert_eq!(manager.queue().stats().await.dropped, 1);
}

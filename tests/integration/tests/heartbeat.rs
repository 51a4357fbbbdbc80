//! Keep-alive integration tests, run under paused time.

use agentlink_core::config::RealtimeConfig;
use agentlink_core::ClientEvent;
use agentlink_integration_tests::{rig_with, wait_for_state};
use agentlink_realtime::ConnectionState;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_ping_sent_each_interval() {
    // default 30s heartbeat
    let mut rig = rig_with(RealtimeConfig::default());
    rig.manager.connect(None).await.unwrap();
    let mut conn = rig.connections.recv().await.unwrap();
    wait_for_state(&rig.manager, ConnectionState::Connected).await;

    let frame = conn.next_sent().await;
    assert_eq!(frame, json!({"type": "ping"}));
    conn.push_text(json!({"type": "pong"}));

    // an answered probe keeps the connection through the next cycle
    let frame = conn.next_sent().await;
    assert_eq!(frame, json!({"type": "ping"}));
    conn.push_text(json!({"type": "pong"}));

    assert!(rig.manager.is_connected().await);
    assert_eq!(rig.transport.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missed_pong_forces_reconnect() {
    let mut rig = rig_with(RealtimeConfig::default());
    rig.manager.connect(None).await.unwrap();
    let mut conn = rig.connections.recv().await.unwrap();
    wait_for_state(&rig.manager, ConnectionState::Connected).await;

    let frame = conn.next_sent().await;
    assert_eq!(frame, json!({"type": "ping"}));
    // no pong: the next probe deadline declares the connection dead

    let _conn2 = rig.connections.recv().await.unwrap();
    wait_for_state(&rig.manager, ConnectionState::Connected).await;

    assert_eq!(rig.transport.dial_count(), 2);
    let overdue_disconnect = rig.recorder.events().iter().any(|event| {
        matches!(
            event,
            ClientEvent::Disconnect { reason: Some(reason) } if reason.contains("heartbeat")
        )
    });
    assert!(overdue_disconnect);
}

#[tokio::test(start_paused = true)]
async fn test_pong_is_dispatched_to_subscribers() {
    let mut rig = rig_with(RealtimeConfig::default());
    rig.manager.connect(None).await.unwrap();
    let mut conn = rig.connections.recv().await.unwrap();
    wait_for_state(&rig.manager, ConnectionState::Connected).await;

    let _ping = conn.next_sent().await;
    conn.push_text(json!({"type": "pong"}));

    // the next probe proves the pong was consumed in between
    let _ping = conn.next_sent().await;
    assert_eq!(rig.recorder.count("pong"), 1);
}

//! Outbound message queue with retry and duplicate suppression.
//!
//! Sends attempted while disconnected land here and are replayed in FIFO
//! order on the next transition into the connected state. Each message
//! carries a bounded retry budget; exceeding it removes the message, and
//! its ID is reported so the connection layer can emit a single
//! delivery-failure event for it.

use crate::error::RealtimeError;
use crate::transport::TransportSink;
use crate::Result;
use agentlink_core::config::QueueConfig;
use agentlink_core::frame::{ChatMessage, ClientFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A message awaiting delivery.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Message ID, also named in delivery-failure events.
    pub id: String,

    /// Agent/session the message targets.
    pub target_channel: String,

    /// The message payload.
    pub message: ChatMessage,

    /// Failed delivery attempts so far.
    pub retries: u32,

    /// Wall-clock enqueue time.
    pub queued_at: DateTime<Utc>,

    /// Monotonic enqueue time, anchoring the dedup window.
    enqueued_at: Instant,
}

/// Queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Messages awaiting delivery.
    pub pending: usize,

    /// Messages delivered by flush.
    pub delivered: u64,

    /// Messages dropped after exhausting their retry budget.
    pub dropped: u64,

    /// Sends collapsed into an existing queued entry.
    pub deduplicated: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: u64,
    dropped: u64,
    deduplicated: u64,
}

/// FIFO queue of outbound messages made while disconnected.
pub struct MessageQueue {
    queue: Mutex<VecDeque<QueuedMessage>>,
    counters: parking_lot::Mutex<Counters>,
    config: QueueConfig,
}

impl MessageQueue {
    /// Create a queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            counters: parking_lot::Mutex::new(Counters::default()),
            config,
        }
    }

    /// Buffer a message for later delivery, collapsing rapid duplicates.
    ///
    /// An identical payload for the same target channel within the dedup
    /// window updates the existing entry in place instead of appending a
    /// second one. Returns the ID of the queued entry.
    pub async fn enqueue(&self, message: ChatMessage) -> Result<String> {
        let mut queue = self.queue.lock().await;
        let window = self.config.dedup_window();

        if let Some(existing) = queue.iter_mut().find(|q| {
            q.target_channel == message.agent_id
                && q.message.content == message.content
                && q.enqueued_at.elapsed() <= window
        }) {
            debug!(
                "Collapsing duplicate send on channel {} into {}",
                existing.target_channel, existing.id
            );
            existing.message.timestamp = message.timestamp;
            existing.message.attachments = message.attachments;
            self.counters.lock().deduplicated += 1;
            return Ok(existing.id.clone());
        }

        if queue.len() >= self.config.max_size {
            return Err(RealtimeError::QueueFull);
        }

        let queued = QueuedMessage {
            id: message.id.clone(),
            target_channel: message.agent_id.clone(),
            message,
            retries: 0,
            queued_at: Utc::now(),
            enqueued_at: Instant::now(),
        };
        let id = queued.id.clone();
        queue.push_back(queued);
        debug!("Queued message {} for delivery", id);
        Ok(id)
    }

    /// Send every queued message over `sink` in enqueue order.
    ///
    /// Success removes the entry; failure increments its retry count and
    /// keeps it (FIFO position preserved) unless the ceiling is exceeded,
    /// in which case it is dropped. Returns the IDs of dropped messages so
    /// the caller can emit one `SendFailed` event each, after it has
    /// released any locks a listener might need.
    pub async fn flush(&self, sink: &mut dyn TransportSink) -> Vec<String> {
        let mut pending: VecDeque<QueuedMessage> = self.queue.lock().await.drain(..).collect();
        let mut leftover: VecDeque<QueuedMessage> = VecDeque::new();
        let mut dropped: Vec<String> = Vec::new();

        while let Some(mut item) = pending.pop_front() {
            let frame = ClientFrame::Message {
                message: item.message.clone(),
            };
            let text = match frame.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unencodable message {}: {}", item.id, e);
                    self.counters.lock().dropped += 1;
                    dropped.push(item.id);
                    continue;
                }
            };

            match sink.send_text(&text).await {
                Ok(()) => {
                    debug!("Flushed queued message {}", item.id);
                    self.counters.lock().delivered += 1;
                }
                Err(e) => {
                    item.retries += 1;
                    if item.retries > self.config.max_retries {
                        warn!(
                            "Dropping message {} after {} failed attempts: {}",
                            item.id, item.retries, e
                        );
                        self.counters.lock().dropped += 1;
                        dropped.push(item.id);
                    } else {
                        debug!(
                            "Send failed for {} (attempt {}): {}",
                            item.id, item.retries, e
                        );
                        leftover.push_back(item);
                    }
                }
            }
        }

        if !leftover.is_empty() {
            let mut queue = self.queue.lock().await;
            // put survivors back ahead of anything enqueued mid-flush
            while let Some(item) = leftover.pop_back() {
                queue.push_front(item);
            }
        }
        dropped
    }

    /// Number of messages awaiting delivery.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// True when nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Snapshot of queue statistics.
    pub async fn stats(&self) -> QueueStats {
        let pending = self.queue.lock().await.len();
        let counters = self.counters.lock();
        QueueStats {
            pending,
            delivered: counters.delivered,
            dropped: counters.dropped,
            deduplicated: counters.deduplicated,
        }
    }
}

//! Matchmaking Queue
//!
//! At-least-once message queue seam. Received messages stay hidden for the
//! visibility timeout and reappear unless they are deleted by receipt handle
//! or explicitly released.

use std::collections::VecDeque;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Stable id assigned on send
    pub message_id: String,
    /// Handle for this delivery; changes on every receive
    pub receipt_handle: String,
    /// Raw body
    pub body: String,
}

/// Queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Backend could not be reached.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Matchmaking queue.
#[async_trait]
pub trait MatchQueue: Send + Sync {
    /// Enqueue a body. Returns the message id.
    async fn send(&self, body: String) -> Result<String, QueueError>;

    /// Receive up to `max` visible messages, waiting at most `wait` for the first one.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, QueueError>;

    /// Delete messages by receipt handle. Unknown or stale handles are ignored.
    async fn delete_batch(&self, receipts: &[String]) -> Result<(), QueueError>;

    /// Make received messages visible again immediately.
    async fn release(&self, receipts: &[String]) -> Result<(), QueueError>;

    /// Messages in the queue, visible or in flight.
    async fn len(&self) -> Result<usize, QueueError>;
}

// =============================================================================
// IN-MEMORY QUEUE
// =============================================================================

struct Entry {
    message_id: String,
    body: String,
    receipt: Option<String>,
    visible_at: Instant,
}

/// Process-local queue.
pub struct InMemoryQueue {
    entries: Mutex<VecDeque<Entry>>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    /// Create an empty queue.
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    /// Take up to `max` visible entries, or report when the next one becomes visible.
    async fn take_visible(&self, max: usize) -> Result<Vec<QueueMessage>, Option<Instant>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut taken = Vec::new();
        let mut next_visible: Option<Instant> = None;

        for entry in entries.iter_mut() {
            if taken.len() >= max {
                break;
            }
            if entry.visible_at > now {
                next_visible = Some(next_visible.map_or(entry.visible_at, |t| t.min(entry.visible_at)));
                continue;
            }

            let receipt = uuid::Uuid::new_v4().simple().to_string();
            entry.receipt = Some(receipt.clone());
            entry.visible_at = now + self.visibility_timeout;
            taken.push(QueueMessage {
                message_id: entry.message_id.clone(),
                receipt_handle: receipt,
                body: entry.body.clone(),
            });
        }

        if taken.is_empty() {
            Err(next_visible)
        } else {
            Ok(taken)
        }
    }
}

#[async_trait]
impl MatchQueue for InMemoryQueue {
    async fn send(&self, body: String) -> Result<String, QueueError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        self.entries.lock().await.push_back(Entry {
            message_id: message_id.clone(),
            body,
            receipt: None,
            visible_at: Instant::now(),
        });
        self.notify.notify_waiters();
        Ok(message_id)
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before looking so a send in between is not missed
            let notified = self.notify.notified();

            let next_visible = match self.take_visible(max).await {
                Ok(messages) => return Ok(messages),
                Err(next_visible) => next_visible,
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn delete_batch(&self, receipts: &[String]) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| match &e.receipt {
            Some(r) => !receipts.contains(r),
            None => true,
        });
        debug!(deleted = before - entries.len(), "queue messages deleted");
        Ok(())
    }

    async fn release(&self, receipts: &[String]) -> Result<(), QueueError> {
        let now = Instant::now();
        {
            let mut entries = self.entries.lock().await;
            for entry in entries.iter_mut() {
                if entry.receipt.as_ref().is_some_and(|r| receipts.contains(r)) {
                    entry.receipt = None;
                    entry.visible_at = now;
                }
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.entries.lock().await.len())
    }
}

//! Connection Push and Broadcast
//!
//! [`ConnectionPush`] delivers one frame to one connection. The
//! [`ConnectionRegistry`] implements it for sockets owned by this process;
//! the [`Broadcaster`] fans frames out and never lets one failed recipient
//! stop the rest.

use std::collections::BTreeMap;
use std::sync::Arc;
use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::game::state::ConnectionId;
use crate::network::protocol::OutboundMessage;

/// Push failures. Always non-fatal to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PushError {
    /// The connection no longer exists.
    #[error("connection {0} is gone")]
    Gone(ConnectionId),

    /// Delivery failed for another reason.
    #[error("push to {connection_id} failed: {reason}")]
    Failed {
        /// Recipient
        connection_id: ConnectionId,
        /// Cause
        reason: String,
    },
}

/// Delivery of one frame to one connection.
#[async_trait]
pub trait ConnectionPush: Send + Sync {
    /// Push a text frame.
    async fn post_to_connection(&self, connection_id: &ConnectionId, data: &str) -> Result<(), PushError>;
}

// =============================================================================
// CONNECTION REGISTRY
// =============================================================================

/// Outbound channels of the sockets held by this process.
pub struct ConnectionRegistry {
    senders: RwLock<BTreeMap<ConnectionId, mpsc::Sender<String>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a connection's outbound channel.
    pub async fn register(&self, connection_id: ConnectionId, sender: mpsc::Sender<String>) {
        self.senders.write().await.insert(connection_id, sender);
    }

    /// Forget a connection.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.senders.write().await.remove(connection_id).is_some()
    }

    /// Check if a connection is registered.
    pub async fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.senders.read().await.contains_key(connection_id)
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }

    /// Check if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.senders.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionPush for ConnectionRegistry {
    async fn post_to_connection(&self, connection_id: &ConnectionId, data: &str) -> Result<(), PushError> {
        let sender = self
            .senders
            .read()
            .await
            .get(connection_id)
            .cloned()
            .ok_or_else(|| PushError::Gone(connection_id.clone()))?;

        // Never block a tick on one slow socket
        sender.try_send(data.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Failed {
                connection_id: connection_id.clone(),
                reason: "outbound buffer full".to_string(),
            },
            TrySendError::Closed(_) => PushError::Gone(connection_id.clone()),
        })
    }
}

// =============================================================================
// BROADCASTER
// =============================================================================

/// Outcome of a batch delivery.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Frames accepted by the push backend
    pub delivered: usize,
    /// Per-recipient failures
    pub failed: Vec<(ConnectionId, PushError)>,
}

impl DeliveryReport {
    /// Check if every frame was delivered.
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, connection_id: &ConnectionId, result: Result<(), PushError>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "delivery failed");
                self.failed.push((connection_id.clone(), e));
            }
        }
    }
}

/// Fan-out delivery.
pub struct Broadcaster {
    push: Arc<dyn ConnectionPush>,
}

impl Broadcaster {
    /// Create a broadcaster over a push backend.
    pub fn new(push: Arc<dyn ConnectionPush>) -> Self {
        Self { push }
    }

    /// Deliver one frame to one connection.
    pub async fn send(&self, connection_id: &ConnectionId, data: &str) -> Result<(), PushError> {
        self.push.post_to_connection(connection_id, data).await
    }

    /// Deliver the same frame to every recipient.
    pub async fn broadcast(&self, recipients: &[ConnectionId], data: &str) -> DeliveryReport {
        let results = join_all(recipients.iter().map(|cid| self.send(cid, data))).await;

        let mut report = DeliveryReport::default();
        for (cid, result) in recipients.iter().zip(results) {
            report.record(cid, result);
        }
        debug!(delivered = report.delivered, failed = report.failed.len(), "broadcast complete");
        report
    }

    /// Deliver individually addressed frames.
    pub async fn deliver_all(&self, messages: &[OutboundMessage]) -> DeliveryReport {
        let results = join_all(messages.iter().map(|m| self.send(&m.cid, &m.data))).await;

        let mut report = DeliveryReport::default();
        for (message, result) in messages.iter().zip(results) {
            report.record(&message.cid, result);
        }
        report
    }
}

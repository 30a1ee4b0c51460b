//! Matchmaker
//!
//! Drains the matchmaking queue and groups players into sessions once a
//! quorum is reached. Queue entries are deleted only after the session
//! record exists and its tick chain has been dispatched, so a failed sweep
//! leaves them to be redelivered.
//!
//! Also relays pre-serialized frames for other in-process components
//! (proxy broadcast). Clients never reach the relay directly.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, instrument};

use crate::config::EngineConfig;
use crate::game::state::ConnectionId;
use crate::network::protocol::{
    MatchmakerInvocation, OutboundMessage, QueueEntry, ServerMessage, TickInvocation,
};
use crate::network::queue::{MatchQueue, QueueError, QueueMessage};
use crate::network::scheduler::{DispatchError, TickDispatcher};
use crate::network::session::{MatchId, SessionRecord};
use crate::network::store::{SessionStore, StoreError};
use crate::network::transport::{Broadcaster, DeliveryReport};

/// Matchmaker errors. Each one aborts the current sweep.
#[derive(Debug, thiserror::Error)]
pub enum MatchmakerError {
    /// Queue receive, delete or release failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Session record could not be created.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Tick chain could not be started.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Notification could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Nothing arrived within the receive wait.
    QueueEmpty,
    /// Below quorum; entries released back to the queue.
    WaitingForPlayers {
        /// Distinct valid players in the batch
        found: usize,
        /// Quorum
        needed: usize,
    },
    /// A session was created and its tick chain dispatched.
    MatchStarted {
        /// New session
        match_id: MatchId,
        /// Participants in queue order
        players: Vec<ConnectionId>,
    },
}

/// Reply to a matchmaker invocation.
#[derive(Debug)]
pub enum InvocationReply {
    /// A sweep ran.
    Swept(SweepOutcome),
    /// Frames were relayed.
    Relayed(DeliveryReport),
}

/// Valid and poison entries of one received batch.
#[derive(Debug, Default)]
struct Batch {
    players: Vec<ConnectionId>,
    receipts: Vec<String>,
    poison: Vec<String>,
}

impl Batch {
    fn parse(messages: Vec<QueueMessage>) -> Self {
        let mut batch = Batch::default();
        let mut seen = BTreeSet::new();

        for message in messages {
            match QueueEntry::from_body(&message.body) {
                Ok(entry) => {
                    if seen.insert(entry.connection_id.clone()) {
                        batch.players.push(entry.connection_id);
                    } else {
                        debug!(connection = %entry.connection_id, "duplicate queue entry collapsed");
                    }
                    batch.receipts.push(message.receipt_handle);
                }
                Err(e) => {
                    warn!(message_id = %message.message_id, error = %e, "malformed queue entry dropped");
                    batch.poison.push(message.receipt_handle);
                }
            }
        }
        batch
    }
}

/// Groups queued players into sessions.
pub struct Matchmaker {
    queue: Arc<dyn MatchQueue>,
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<Broadcaster>,
    dispatcher: Arc<dyn TickDispatcher>,
    min_players: usize,
    batch_size: usize,
    receive_wait: Duration,
}

impl Matchmaker {
    /// Create a matchmaker.
    pub fn new(
        queue: Arc<dyn MatchQueue>,
        store: Arc<dyn SessionStore>,
        broadcaster: Arc<Broadcaster>,
        dispatcher: Arc<dyn TickDispatcher>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            queue,
            store,
            broadcaster,
            dispatcher,
            // A session never starts empty
            min_players: config.min_players.max(1),
            batch_size: config.batch_size,
            receive_wait: config.receive_wait,
        }
    }

    /// Handle an invocation payload: a proxy broadcast or a sweep.
    pub async fn invoke(&self, payload: &serde_json::Value) -> Result<InvocationReply, MatchmakerError> {
        match MatchmakerInvocation::from_value(payload) {
            MatchmakerInvocation::Broadcast(messages) => {
                Ok(InvocationReply::Relayed(self.proxy_broadcast(&messages).await))
            }
            MatchmakerInvocation::Sweep => Ok(InvocationReply::Swept(self.sweep().await?)),
        }
    }

    /// Relay frames, ignoring individual failures.
    pub async fn proxy_broadcast(&self, messages: &[OutboundMessage]) -> DeliveryReport {
        let report = self.broadcaster.deliver_all(messages).await;
        debug!(delivered = report.delivered, failed = report.failed.len(), "proxy broadcast relayed");
        report
    }

    /// Run one sweep over the queue.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepOutcome, MatchmakerError> {
        let messages = self.queue.receive(self.batch_size, self.receive_wait).await?;
        if messages.is_empty() {
            return Ok(SweepOutcome::QueueEmpty);
        }

        let batch = Batch::parse(messages);
        if !batch.poison.is_empty() {
            self.queue.delete_batch(&batch.poison).await?;
        }

        if batch.players.len() < self.min_players {
            if !batch.receipts.is_empty() {
                self.queue.release(&batch.receipts).await?;
            }
            debug!(found = batch.players.len(), needed = self.min_players, "waiting for players");
            return Ok(SweepOutcome::WaitingForPlayers {
                found: batch.players.len(),
                needed: self.min_players,
            });
        }

        let match_id = MatchId::generate();
        self.store
            .create(SessionRecord::new(match_id.clone(), batch.players.clone()))
            .await?;
        info!(%match_id, players = batch.players.len(), "session created");

        let notice = ServerMessage::MatchFound { match_id: match_id.clone() }.to_json()?;
        self.broadcaster.broadcast(&batch.players, &notice).await;

        self.dispatcher.dispatch(TickInvocation::new(match_id.clone())).await?;

        // Only now are the entries consumed
        self.queue.delete_batch(&batch.receipts).await?;

        Ok(SweepOutcome::MatchStarted {
            match_id,
            players: batch.players,
        })
    }
}

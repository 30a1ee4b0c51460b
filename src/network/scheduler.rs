//! Tick Scheduler
//!
//! Runs one worker task per session: step, sleep for the tick delay, step
//! again, until the engine reports the session is over or a step fails.
//! At most one chain exists per match id in this process.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::network::engine::{StepOutcome, TickEngine, TickError};
use crate::network::protocol::TickInvocation;
use crate::network::session::MatchId;

/// Dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A chain for this session is already in flight.
    #[error("tick chain already running for session {0}")]
    AlreadyRunning(MatchId),

    /// The scheduler no longer accepts work.
    #[error("scheduler is shut down")]
    ShutDown,
}

/// Starts the tick chain for a session.
#[async_trait]
pub trait TickDispatcher: Send + Sync {
    /// Begin advancing the invocation's session asynchronously.
    async fn dispatch(&self, invocation: TickInvocation) -> Result<(), DispatchError>;
}

/// How a chain finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainExit {
    /// The last snake died on this tick.
    Ended {
        /// Final tick
        tick: u64,
    },
    /// Record not found.
    Missing,
    /// Record was already ENDED.
    AlreadyEnded,
    /// Another writer advanced the session first.
    Superseded,
    /// A step failed.
    Failed,
    /// The scheduler shut down.
    Shutdown,
}

/// Single-flight tick loops.
pub struct TickScheduler {
    engine: Arc<TickEngine>,
    tick_delay: Duration,
    running: Arc<Mutex<BTreeSet<MatchId>>>,
    closed: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl TickScheduler {
    /// Create a scheduler.
    pub fn new(engine: Arc<TickEngine>, tick_delay: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            engine,
            tick_delay,
            running: Arc::new(Mutex::new(BTreeSet::new())),
            closed: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Start a chain for `match_id`.
    pub async fn start(&self, match_id: MatchId) -> Result<JoinHandle<ChainExit>, DispatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        if !self.running.lock().await.insert(match_id.clone()) {
            return Err(DispatchError::AlreadyRunning(match_id));
        }

        let engine = self.engine.clone();
        let running = self.running.clone();
        let tick_delay = self.tick_delay;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(%match_id, "tick chain started");
        Ok(tokio::spawn(async move {
            let exit = run_chain(&engine, &match_id, tick_delay, &mut shutdown_rx).await;
            running.lock().await.remove(&match_id);
            info!(%match_id, ?exit, "tick chain finished");
            exit
        }))
    }

    /// Check if a chain is in flight for `match_id`.
    pub async fn is_running(&self, match_id: &MatchId) -> bool {
        self.running.lock().await.contains(match_id)
    }

    /// Number of chains in flight.
    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }

    /// End orphaned sessions, skipping any with a chain in flight.
    pub async fn reconcile_orphans(&self, max_idle: Duration) -> Result<Vec<MatchId>, TickError> {
        let running = self.running.lock().await.clone();
        self.engine.reconcile_orphans(max_idle, &running).await
    }

    /// Stop accepting chains and stop the ones in flight after their current step.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }
}

#[async_trait]
impl TickDispatcher for TickScheduler {
    async fn dispatch(&self, invocation: TickInvocation) -> Result<(), DispatchError> {
        self.start(invocation.match_id).await.map(|_| ())
    }
}

async fn run_chain(
    engine: &TickEngine,
    match_id: &MatchId,
    tick_delay: Duration,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> ChainExit {
    loop {
        match engine.step(match_id).await {
            Ok(StepOutcome::Continue { .. }) => {}
            Ok(StepOutcome::Ended { tick }) => return ChainExit::Ended { tick },
            Ok(StepOutcome::Missing) => return ChainExit::Missing,
            Ok(StepOutcome::AlreadyEnded) => return ChainExit::AlreadyEnded,
            Err(e) if e.is_superseded() => {
                warn!(%match_id, error = %e, "another chain owns this session, stopping");
                return ChainExit::Superseded;
            }
            Err(e) => {
                // No retry either way; the session is left for reconciliation
                if e.is_transient() {
                    error!(%match_id, error = %e, "tick failed on a transient error, chain stopped");
                } else {
                    error!(%match_id, error = %e, "tick failed, chain stopped");
                }
                return ChainExit::Failed;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(tick_delay) => {}
            _ = shutdown_rx.recv() => return ChainExit::Shutdown,
        }
    }
}

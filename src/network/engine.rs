//! Tick Engine
//!
//! One step of a session's lifecycle: load the record, initialize the game
//! on first use, apply pending inputs, persist, broadcast and decide whether
//! the session continues. Looping and delays belong to the scheduler.
//!
//! ```text
//! Initializing ──first step──▶ Running ──no snake alive──▶ Ended
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tracing::{debug, info, warn, instrument};

use crate::config::EngineConfig;
use crate::core::rng::DeterministicRng;
use crate::game::events::GameEventData;
use crate::game::state::{GameState, GameStateError};
use crate::game::tick::{tick, TickConfig};
use crate::network::protocol::ServerMessage;
use crate::network::session::{MatchId, SessionPhase, SessionStatus};
use crate::network::store::{SessionStore, StoreError};
use crate::network::transport::Broadcaster;

/// Tick errors. Any of them stops the chain.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// Store failure, including a lost version race.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The stepped state broke an invariant.
    #[error("invalid game state for session {match_id}: {source}")]
    InvalidState {
        /// Session
        match_id: MatchId,
        /// Violated invariant
        #[source]
        source: GameStateError,
    },

    /// Snapshot could not be encoded for clients.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TickError {
    /// Outages that a later attempt could get past.
    pub fn is_transient(&self) -> bool {
        matches!(self, TickError::Store(e) if e.is_transient())
    }

    /// Another chain advanced the session first.
    pub fn is_superseded(&self) -> bool {
        matches!(self, TickError::Store(StoreError::VersionConflict { .. }))
    }
}

/// What the scheduler should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// At least one snake alive; step again after the delay.
    Continue {
        /// Tick just completed
        tick: u64,
    },
    /// Last snake died on this step; session marked ENDED.
    Ended {
        /// Final tick
        tick: u64,
    },
    /// No record under this id.
    Missing,
    /// Record already ENDED.
    AlreadyEnded,
}

impl StepOutcome {
    /// Check if another step should follow.
    pub fn should_continue(&self) -> bool {
        matches!(self, StepOutcome::Continue { .. })
    }
}

/// Advances sessions one tick at a time.
pub struct TickEngine {
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<Broadcaster>,
    grid_width: u32,
    grid_height: u32,
    tick_config: TickConfig,
}

impl TickEngine {
    /// Create an engine.
    pub fn new(store: Arc<dyn SessionStore>, broadcaster: Arc<Broadcaster>, config: &EngineConfig) -> Self {
        Self {
            store,
            broadcaster,
            grid_width: config.grid_width,
            grid_height: config.grid_height,
            tick_config: TickConfig {
                food_reward: config.food_reward,
            },
        }
    }

    /// Run one step for a session.
    #[instrument(skip(self), fields(match_id = %match_id))]
    pub async fn step(&self, match_id: &MatchId) -> Result<StepOutcome, TickError> {
        let Some(record) = self.store.get(match_id).await? else {
            debug!("session not found, stopping");
            return Ok(StepOutcome::Missing);
        };

        if record.phase() == SessionPhase::Ended {
            debug!("session already ended");
            return Ok(StepOutcome::AlreadyEnded);
        }

        let mut state = match record.game_state.clone() {
            Some(state) => state,
            None => {
                let mut rng = DeterministicRng::for_tick(match_id.as_str(), 0);
                let state = GameState::initialize(&record.players, self.grid_width, self.grid_height, &mut rng);
                info!(players = state.players.len(), food = ?state.food, "game initialized");
                state
            }
        };

        let mut rng = DeterministicRng::for_tick(match_id.as_str(), state.tick + 1);
        let result = tick(&mut state, &record.inputs, &self.tick_config, &mut rng);

        for event in &result.events {
            match &event.data {
                GameEventData::FoodEaten { player_id, new_score, .. } => {
                    debug!(player = %player_id, score = new_score, "food eaten");
                }
                GameEventData::PlayerDied { player_id, at, final_score } => {
                    info!(player = %player_id, ?at, score = final_score, "player died");
                }
            }
        }

        state.validate().map_err(|source| TickError::InvalidState {
            match_id: match_id.clone(),
            source,
        })?;

        // Inputs are left in place; the last direction stays sticky
        self.store.write_state(match_id, record.state_version, &state).await?;

        let tick_number = state.tick;
        let frame = ServerMessage::GameState { state }.to_json()?;
        let report = self.broadcaster.broadcast(&record.players, &frame).await;
        if !report.all_delivered() {
            debug!(failed = report.failed.len(), "snapshot not delivered to every player");
        }

        if result.session_over {
            self.store.set_status(match_id, SessionStatus::Ended).await?;
            info!(tick = tick_number, "session ended");
            return Ok(StepOutcome::Ended { tick: tick_number });
        }

        Ok(StepOutcome::Continue { tick: tick_number })
    }

    /// End `ACTIVE` sessions that nothing has advanced for longer than
    /// `max_idle` and that have no chain in `running`. Returns the ids ended.
    pub async fn reconcile_orphans(
        &self,
        max_idle: Duration,
        running: &BTreeSet<MatchId>,
    ) -> Result<Vec<MatchId>, TickError> {
        let now = Utc::now();
        let mut ended = Vec::new();

        for record in self.store.list_active().await? {
            if running.contains(&record.match_id) {
                continue;
            }
            let idle = (now - record.updated_at).to_std().unwrap_or_default();
            if idle <= max_idle {
                continue;
            }

            match self.store.set_status(&record.match_id, SessionStatus::Ended).await {
                Ok(()) => {
                    warn!(match_id = %record.match_id, idle_secs = idle.as_secs(), "orphaned session ended");
                    ended.push(record.match_id);
                }
                // Deleted in the meantime
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(ended)
    }
}

//! Session Records
//!
//! The persisted form of one match. This record is the only state shared
//! between the router, the matchmaker and the tick engine.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::input::PendingInputs;
use crate::game::state::{ConnectionId, GameState, GameStateError};

/// Unique session identifier (UUID v4 text).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    /// Wrap a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Tick chain expected to be advancing it
    Active,
    /// Terminal
    Ended,
}

/// Tick engine view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created by the matchmaker, no game state yet.
    Initializing,
    /// Game state present, still active.
    Running,
    /// No further ticks.
    Ended,
}

/// The persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id
    pub match_id: MatchId,

    /// Participants in join order
    pub players: Vec<ConnectionId>,

    /// Lifecycle status
    pub status: SessionStatus,

    /// Lazily created by the first tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameState>,

    /// Latest requested direction per player, written by the input router
    #[serde(default)]
    pub inputs: PendingInputs,

    /// Bumped on every game state write; guards against concurrent tick chains
    #[serde(default)]
    pub state_version: u64,

    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last engine write (state or status). Input merges do not touch it.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// New active session with no game state yet.
    pub fn new(match_id: MatchId, players: Vec<ConnectionId>) -> Self {
        let now = Utc::now();
        Self {
            match_id,
            players,
            status: SessionStatus::Active,
            game_state: None,
            inputs: PendingInputs::new(),
            state_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lifecycle phase as seen by the tick engine.
    pub fn phase(&self) -> SessionPhase {
        match (self.status, &self.game_state) {
            (SessionStatus::Ended, _) => SessionPhase::Ended,
            (SessionStatus::Active, None) => SessionPhase::Initializing,
            (SessionStatus::Active, Some(_)) => SessionPhase::Running,
        }
    }

    /// Check if a connection belongs to this session.
    pub fn is_participant(&self, connection_id: &ConnectionId) -> bool {
        self.players.contains(connection_id)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON, validating any embedded game state.
    pub fn from_json(s: &str) -> Result<Self, GameStateError> {
        let record: SessionRecord = serde_json::from_str(s)?;
        if let Some(state) = &record.game_state {
            state.validate()?;
        }
        Ok(record)
    }
}

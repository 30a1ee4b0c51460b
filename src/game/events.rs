//! Game Events
//!
//! Things that happened during one simulation step. Used for logging;
//! clients only ever see the full state snapshot.

use serde::{Serialize, Deserialize};

use crate::core::grid::Cell;
use crate::game::state::ConnectionId;

/// Event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Snake ate the food
    FoodEaten {
        player_id: ConnectionId,
        at: Cell,
        new_score: u32,
        new_food: Cell,
    },

    /// Snake hit a wall
    PlayerDied {
        player_id: ConnectionId,
        /// Cell it tried to move into
        at: Cell,
        final_score: u32,
    },
}

/// A game event stamped with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick number
    pub tick: u64,
    /// Payload
    pub data: GameEventData,
}

impl GameEvent {
    /// Create food eaten event.
    pub fn food_eaten(tick: u64, player_id: ConnectionId, at: Cell, new_score: u32, new_food: Cell) -> Self {
        Self {
            tick,
            data: GameEventData::FoodEaten { player_id, at, new_score, new_food },
        }
    }

    /// Create player died event.
    pub fn player_died(tick: u64, player_id: ConnectionId, at: Cell, final_score: u32) -> Self {
        Self {
            tick,
            data: GameEventData::PlayerDied { player_id, at, final_score },
        }
    }
}

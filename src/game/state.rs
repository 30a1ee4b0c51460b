//! Game State Definitions
//!
//! The serializable snapshot of one session: players, food, grid size.
//! Players are kept in a BTreeMap so iteration (and therefore simulation
//! order) is stable across invocations.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::grid::{Cell, Direction};
use crate::core::rng::DeterministicRng;
use crate::{PLAYER_COLORS, SPAWN_OFFSET, SPAWN_STAGGER};

/// Current GameState schema version.
///
/// Version 1 blobs written without a `schemaVersion` field are accepted
/// and upgraded in place.
pub const SCHEMA_VERSION: u32 = 1;

/// Random attempts made to find a food cell not covered by a snake.
pub const FOOD_PLACEMENT_ATTEMPTS: u32 = 8;

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Opaque token naming one live transport connection.
///
/// Doubles as the player key inside a session. Carries no ownership,
/// only a lookup key for push delivery.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Wrap a raw token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random token, used by the WebSocket gateway.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// One snake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Owning connection
    pub id: ConnectionId,

    /// Occupied cells, head first
    pub body: Vec<Cell>,

    /// Current heading
    #[serde(rename = "dir")]
    pub direction: Direction,

    /// Display color (CSS hex)
    pub color: String,

    /// Accumulated score
    pub score: u32,

    /// Once false the body and heading are frozen
    pub alive: bool,
}

impl Player {
    /// Create a one-cell snake heading right.
    pub fn new(id: ConnectionId, start: Cell, color: impl Into<String>) -> Self {
        Self {
            id,
            body: vec![start],
            direction: Direction::Right,
            color: color.into(),
            score: 0,
            alive: true,
        }
    }

    /// Head cell. `None` only for a corrupt, empty body.
    #[inline]
    pub fn head(&self) -> Option<Cell> {
        self.body.first().copied()
    }

    /// Body length in cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Check if the body is empty (never true for a valid player).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Errors raised while decoding or validating a persisted GameState.
#[derive(Debug, thiserror::Error)]
pub enum GameStateError {
    /// JSON did not match the schema.
    #[error("malformed game state: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Written by a newer (or bogus) schema.
    #[error("unsupported game state schema version {found} (supported up to {supported})")]
    UnsupportedSchema {
        /// Version found in the blob
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// Zero-sized grid.
    #[error("invalid grid {width}x{height}")]
    InvalidGrid {
        /// Width
        width: u32,
        /// Height
        height: u32,
    },

    /// Food outside the grid.
    #[error("food out of bounds at {0:?}")]
    FoodOutOfBounds(Cell),

    /// Player with no cells.
    #[error("player {0} has an empty body")]
    EmptyBody(ConnectionId),

    /// Living player whose head is off the grid.
    #[error("living player {0} has its head out of bounds")]
    HeadOutOfBounds(ConnectionId),

    /// Map key disagrees with the player's own id.
    #[error("player keyed {key} carries id {id}")]
    MismatchedId {
        /// Map key
        key: ConnectionId,
        /// Embedded id
        id: ConnectionId,
    },
}

fn legacy_schema_version() -> u32 {
    1
}

/// Snapshot of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Schema version of this blob
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,

    /// Steps simulated so far
    #[serde(default)]
    pub tick: u64,

    /// Players keyed by connection id
    pub players: BTreeMap<ConnectionId, Player>,

    /// The single food cell
    pub food: Cell,

    /// Grid width in cells
    pub width: u32,

    /// Grid height in cells
    pub height: u32,
}

impl GameState {
    /// Empty state with food at `food`.
    pub fn new(width: u32, height: u32, food: Cell) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tick: 0,
            players: BTreeMap::new(),
            food,
            width,
            height,
        }
    }

    /// Build the opening state for a freshly matched session.
    ///
    /// Player `i` starts at `(10 + 5i, 10 + 5i)` wrapped into the grid,
    /// heading right. Duplicate ids collapse into one player.
    pub fn initialize(
        players: &[ConnectionId],
        width: u32,
        height: u32,
        rng: &mut DeterministicRng,
    ) -> Self {
        let mut state = Self::new(width, height, Cell::default());

        for (i, id) in players.iter().enumerate() {
            if state.players.contains_key(id) {
                continue;
            }
            let start = spawn_cell(i, width, height);
            let color = PLAYER_COLORS[i % PLAYER_COLORS.len()];
            state.players.insert(id.clone(), Player::new(id.clone(), start, color));
        }

        state.food = state.pick_food_cell(rng, None);
        state
    }

    /// Add a player directly (tests and tooling).
    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id.clone(), player);
    }

    /// Get a player.
    pub fn get_player(&self, id: &ConnectionId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Number of living players.
    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.alive).count()
    }

    /// Check whether anyone is still moving.
    pub fn any_alive(&self) -> bool {
        self.players.values().any(|p| p.alive)
    }

    /// Check whether a snake covers `cell`.
    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.players.values().any(|p| p.body.contains(&cell))
    }

    /// Choose a food cell.
    ///
    /// Tries a few random cells that no snake covers; falls back to any
    /// random cell. The result never equals `exclude` unless the grid has
    /// a single cell.
    pub fn pick_food_cell(&self, rng: &mut DeterministicRng, exclude: Option<Cell>) -> Cell {
        let mut candidate = rng.random_cell(self.width, self.height);

        for _ in 0..FOOD_PLACEMENT_ATTEMPTS {
            if Some(candidate) != exclude && !self.is_occupied(candidate) {
                return candidate;
            }
            candidate = rng.random_cell(self.width, self.height);
        }

        if Some(candidate) == exclude && u64::from(self.width) * u64::from(self.height) > 1 {
            // Next cell in row-major order
            let width = self.width.max(1) as i32;
            let height = self.height.max(1) as i32;
            let index = (candidate.y * width + candidate.x + 1) % (width * height);
            candidate = Cell::new(index % width, index / width);
        }
        candidate
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<(), GameStateError> {
        if self.schema_version == 0 || self.schema_version > SCHEMA_VERSION {
            return Err(GameStateError::UnsupportedSchema {
                found: self.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(GameStateError::InvalidGrid {
                width: self.width,
                height: self.height,
            });
        }
        if !self.food.in_bounds(self.width, self.height) {
            return Err(GameStateError::FoodOutOfBounds(self.food));
        }
        for (key, player) in &self.players {
            if key != &player.id {
                return Err(GameStateError::MismatchedId {
                    key: key.clone(),
                    id: player.id.clone(),
                });
            }
            let head = player.head().ok_or_else(|| GameStateError::EmptyBody(key.clone()))?;
            if player.alive && !head.in_bounds(self.width, self.height) {
                return Err(GameStateError::HeadOutOfBounds(key.clone()));
            }
        }
        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON and validate.
    pub fn from_json(s: &str) -> Result<Self, GameStateError> {
        let state: GameState = serde_json::from_str(s)?;
        state.validate()?;
        Ok(state)
    }
}

/// Staggered spawn cell for player `index`.
fn spawn_cell(index: usize, width: u32, height: u32) -> Cell {
    let offset = SPAWN_OFFSET as u64 + SPAWN_STAGGER as u64 * index as u64;
    let x = offset % u64::from(width.max(1));
    let y = offset % u64::from(height.max(1));
    Cell::new(x as i32, y as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<ConnectionId> {
        (0..n).map(|i| ConnectionId::new(format!("conn-{i}"))).collect()
    }

    #[test]
    fn test_initialize_staggers_players() {
        let mut rng = DeterministicRng::new(1);
        let state = GameState::initialize(&ids(3), 40, 40, &mut rng);

        assert_eq!(state.players.len(), 3);
        assert_eq!(state.alive_count(), 3);
        assert!(state.food.in_bounds(40, 40));

        let p0 = state.get_player(&ConnectionId::new("conn-0")).unwrap();
        let p2 = state.get_player(&ConnectionId::new("conn-2")).unwrap();
        assert_eq!(p0.body, vec![Cell::new(10, 10)]);
        assert_eq!(p2.body, vec![Cell::new(20, 20)]);
        assert_eq!(p0.direction, Direction::Right);
        assert_eq!(p0.color, "#e74c3c");
        assert_eq!(p2.color, "#2ecc71");
        assert_eq!(p2.score, 0);
        state.validate().unwrap();
    }

    #[test]
    fn test_initialize_wraps_spawns_on_small_grid() {
        let mut rng = DeterministicRng::new(2);
        let state = GameState::initialize(&ids(10), 40, 40, &mut rng);

        for player in state.players.values() {
            assert!(player.head().unwrap().in_bounds(40, 40));
        }
        state.validate().unwrap();
    }

    #[test]
    fn test_initialize_collapses_duplicates() {
        let mut rng = DeterministicRng::new(3);
        let players = vec![ConnectionId::new("a"), ConnectionId::new("a"), ConnectionId::new("b")];
        let state = GameState::initialize(&players, 40, 40, &mut rng);
        assert_eq!(state.players.len(), 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut rng = DeterministicRng::new(4);
        let mut state = GameState::initialize(&ids(2), 40, 40, &mut rng);
        state.tick = 17;
        if let Some(p) = state.players.get_mut(&ConnectionId::new("conn-1")) {
            p.alive = false;
            p.score = 30;
            p.direction = Direction::Up;
        }

        let json = state.to_json().unwrap();
        let parsed = GameState::from_json(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_wire_field_names() {
        let mut state = GameState::new(10, 10, Cell::new(1, 2));
        state.add_player(Player::new(ConnectionId::new("abc"), Cell::new(3, 3), "#3498db"));

        let value: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(value["players"]["abc"]["dir"], "RIGHT");
        assert_eq!(value["players"]["abc"]["body"][0]["x"], 3);
        assert_eq!(value["food"]["y"], 2);
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
    }

    #[test]
    fn test_legacy_blob_is_upgraded() {
        let legacy = r##"{
            "players": {"p1": {"id": "p1", "body": [{"x": 10, "y": 10}], "dir": "RIGHT",
                               "color": "#e74c3c", "score": 0, "alive": true}},
            "food": {"x": 4, "y": 5}, "width": 40, "height": 40
        }"##;
        let state = GameState::from_json(legacy).unwrap();
        assert_eq!(state.schema_version, 1);
        assert_eq!(state.tick, 0);
    }

    #[test]
    fn test_rejects_future_schema() {
        let blob = r#"{"schemaVersion": 99, "players": {}, "food": {"x": 0, "y": 0}, "width": 4, "height": 4}"#;
        assert!(matches!(
            GameState::from_json(blob),
            Err(GameStateError::UnsupportedSchema { found: 99, .. })
        ));
    }

    #[test]
    fn test_rejects_broken_invariants() {
        let mut state = GameState::new(10, 10, Cell::new(0, 0));
        let mut player = Player::new(ConnectionId::new("x"), Cell::new(3, 3), "#fff");
        player.body.clear();
        state.add_player(player);
        assert!(matches!(state.validate(), Err(GameStateError::EmptyBody(_))));

        let mut state = GameState::new(10, 10, Cell::new(0, 0));
        state.add_player(Player::new(ConnectionId::new("x"), Cell::new(10, 3), "#fff"));
        assert!(matches!(state.validate(), Err(GameStateError::HeadOutOfBounds(_))));

        let state = GameState::new(10, 10, Cell::new(12, 0));
        assert!(matches!(state.validate(), Err(GameStateError::FoodOutOfBounds(_))));

        assert!(matches!(GameState::from_json("{\"players\": 3}"), Err(GameStateError::Malformed(_))));
    }

    #[test]
    fn test_pick_food_avoids_excluded_cell() {
        let state = GameState::new(2, 1, Cell::new(0, 0));
        for seed in 0..50 {
            let mut rng = DeterministicRng::new(seed);
            assert_eq!(state.pick_food_cell(&mut rng, Some(Cell::new(0, 0))), Cell::new(1, 0));
        }
    }
}

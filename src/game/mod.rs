//! Game Logic Module
//!
//! Snake simulation. Deterministic given the per-tick RNG.
//!
//! ## Module Structure
//!
//! - `state`: GameState, players, schema validation
//! - `input`: Sticky pending inputs and reverse rejection
//! - `tick`: One authoritative simulation step
//! - `events`: Per-step events for logging

pub mod events;
pub mod input;
pub mod state;
pub mod tick;

// Re-export key types
pub use events::{GameEvent, GameEventData};
pub use input::{PendingInputs, resolve_direction};
pub use state::{ConnectionId, GameState, GameStateError, Player, SCHEMA_VERSION};
pub use tick::{tick, TickConfig, TickResult};

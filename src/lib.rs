//! # Serpent Arena Session Server
//!
//! Session lifecycle engine for short real-time multiplayer snake matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SERPENT ARENA SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── grid.rs     - Cells and cardinal directions             │
//! │  └── rng.rs      - Per-tick seeded Xorshift128+ PRNG         │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── state.rs    - GameState, players, schema validation     │
//! │  ├── input.rs    - Sticky inputs, reverse rejection          │
//! │  ├── tick.rs     - One authoritative simulation step         │
//! │  └── events.rs   - Per-step events                           │
//! │                                                              │
//! │  network/        - Session lifecycle (non-deterministic)     │
//! │  ├── protocol.rs - Transport events and wire messages        │
//! │  ├── session.rs  - Persisted session record                  │
//! │  ├── store.rs    - Session store seam + in-memory store      │
//! │  ├── queue.rs    - Matchmaking queue seam + in-memory queue  │
//! │  ├── transport.rs- Connection push + Broadcaster             │
//! │  ├── router.rs   - InputRouter                               │
//! │  ├── matchmaker.rs - Matchmaker + proxy broadcast            │
//! │  ├── engine.rs   - TickEngine                                │
//! │  ├── scheduler.rs- Single-flight tick loops                  │
//! │  └── server.rs   - WebSocket gateway                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Coordination Model
//!
//! Every unit of work (one routed event, one matchmaker sweep, one tick)
//! is stateless. The persisted session record and the queue are the only
//! shared state. Inputs are merged field-by-field into the record and the
//! game state is written with an optimistic version check, so two tick
//! chains can never both advance the same session.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, ServerConfig};
pub use crate::core::grid::{Cell, Direction};
pub use game::state::{ConnectionId, GameState, Player};
pub use network::session::{MatchId, SessionRecord, SessionStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default grid width and height in cells.
pub const GRID_SIZE: u32 = 40;

/// Score awarded per food eaten.
pub const FOOD_REWARD: u32 = 10;

/// Players required before a session is created.
pub const MIN_PLAYERS: usize = 2;

/// Queue messages pulled per matchmaker sweep.
pub const MATCH_BATCH_SIZE: usize = 10;

/// Pause between ticks (ms). With store and fan-out time this lands near 5 updates/s.
pub const TICK_DELAY_MS: u64 = 150;

/// First spawn coordinate on both axes.
pub const SPAWN_OFFSET: u32 = 10;

/// Diagonal spacing between consecutive spawns.
pub const SPAWN_STAGGER: u32 = 5;

/// Snake colors, assigned round-robin by join order.
pub const PLAYER_COLORS: [&str; 4] = ["#e74c3c", "#3498db", "#2ecc71", "#f1c40f"];

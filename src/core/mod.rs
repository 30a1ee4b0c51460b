//! Core primitives.
//!
//! Grid geometry and the seeded RNG used for food placement.

pub mod grid;
pub mod rng;

// Re-export core types
pub use grid::{Cell, Direction, UnknownDirection};
pub use rng::{DeterministicRng, derive_tick_seed};

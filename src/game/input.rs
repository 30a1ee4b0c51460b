//! Pending Input Handling
//!
//! Inputs are sticky: the last direction a player sent stays in the
//! session record and is re-offered every tick until a newer one replaces it.

use std::collections::BTreeMap;

use crate::core::grid::Direction;
use crate::game::state::ConnectionId;

/// Latest requested direction per player.
pub type PendingInputs = BTreeMap<ConnectionId, Direction>;

/// Resolve the heading for this tick.
///
/// A request that would reverse the snake onto itself is ignored.
#[inline]
pub fn resolve_direction(current: Direction, requested: Option<Direction>) -> Direction {
    match requested {
        Some(next) if !next.is_reverse_of(current) => next,
        _ => current,
    }
}

//! Authoritative Simulation Step
//!
//! One discrete step of a session: apply inputs, move every living snake
//! one cell, resolve walls and food. Pure and deterministic given the
//! RNG; persistence and fan-out live in the network layer.

use crate::core::rng::DeterministicRng;
use crate::game::events::GameEvent;
use crate::game::input::{resolve_direction, PendingInputs};
use crate::game::state::{ConnectionId, GameState};
use crate::FOOD_REWARD;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// No snake is left alive
    pub session_over: bool,
}

/// Configuration for the simulation.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Score awarded per food eaten
    pub food_reward: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            food_reward: FOOD_REWARD,
        }
    }
}

/// Run one simulation step.
///
/// Players are processed in connection-id order. Food eaten by an earlier
/// player is relocated before later players move. Snakes do not collide
/// with each other; only the grid edge is lethal.
pub fn tick(
    state: &mut GameState,
    inputs: &PendingInputs,
    config: &TickConfig,
    rng: &mut DeterministicRng,
) -> TickResult {
    let mut result = TickResult::default();

    state.tick += 1;
    let now = state.tick;
    let (width, height) = (state.width, state.height);

    let ids: Vec<ConnectionId> = state.players.keys().cloned().collect();
    for id in ids {
        let Some(player) = state.players.get_mut(&id) else {
            continue;
        };
        if !player.alive {
            continue;
        }

        player.direction = resolve_direction(player.direction, inputs.get(&id).copied());

        let Some(head) = player.head() else {
            continue;
        };
        let next = head.step(player.direction);

        if !next.in_bounds(width, height) {
            player.alive = false;
            result.events.push(GameEvent::player_died(now, id, next, player.score));
            continue;
        }

        player.body.insert(0, next);

        if next == state.food {
            player.score = player.score.saturating_add(config.food_reward);
            let new_score = player.score;
            state.food = state.pick_food_cell(rng, Some(next));
            result.events.push(GameEvent::food_eaten(now, id.clone(), next, new_score, state.food));
        } else {
            player.body.pop();
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(tick = now, player = %id, ?next, "moved");
    }

    result.session_over = !state.any_alive();
    result
}

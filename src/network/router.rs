//! Input Router
//!
//! Entry point for every transport event. Join requests go to the
//! matchmaking queue, moves are merged into the addressed session's
//! pending inputs. Game state is never read or written here.

use std::sync::Arc;
use tracing::{debug, info, warn, instrument};

use crate::core::grid::Direction;
use crate::game::state::ConnectionId;
use crate::network::protocol::{MoveRequest, QueueEntry, Route, RouteResponse, TransportEvent};
use crate::network::queue::{MatchQueue, QueueError};
use crate::network::session::MatchId;
use crate::network::store::{SessionStore, StoreError};

/// Router errors. Each maps to one non-2xx response.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The join request could not be enqueued.
    #[error("failed to enqueue join request: {0}")]
    QueueUnavailable(#[source] QueueError),

    /// The move could not be merged into the session.
    #[error("failed to register move: {0}")]
    UpdateFailed(#[source] StoreError),

    /// No handler for this route key.
    #[error("route not found: {0}")]
    RouteNotFound(String),
}

/// Successful routing outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Connection acknowledged
    Connected,
    /// Disconnect logged
    Disconnected,
    /// Join request enqueued
    Queued,
    /// Input merged
    MoveRegistered,
    /// Move dropped for missing or invalid fields
    MoveIgnored,
}

impl RouteOutcome {
    /// Response body for this outcome.
    pub fn message(self) -> &'static str {
        match self {
            RouteOutcome::Connected => "Connected",
            RouteOutcome::Disconnected => "Disconnected",
            RouteOutcome::Queued => "Joined Queue",
            RouteOutcome::MoveRegistered => "Move Registered",
            RouteOutcome::MoveIgnored => "Move Ignored",
        }
    }
}

impl From<&RouterError> for RouteResponse {
    fn from(err: &RouterError) -> Self {
        match err {
            RouterError::QueueUnavailable(_) => RouteResponse::internal("Error adding to queue"),
            RouterError::UpdateFailed(_) => RouteResponse::internal("Move Error"),
            RouterError::RouteNotFound(_) => RouteResponse::not_found(),
        }
    }
}

/// Routes transport events.
pub struct InputRouter {
    queue: Arc<dyn MatchQueue>,
    store: Arc<dyn SessionStore>,
}

impl InputRouter {
    /// Create a router.
    pub fn new(queue: Arc<dyn MatchQueue>, store: Arc<dyn SessionStore>) -> Self {
        Self { queue, store }
    }

    /// Route one event and render the transport response.
    pub async fn respond(&self, event: &TransportEvent) -> RouteResponse {
        match self.handle(event).await {
            Ok(outcome) => RouteResponse::ok(outcome.message()),
            Err(e) => {
                warn!(connection = %event.connection_id, route = %event.route_key, error = %e, "route failed");
                RouteResponse::from(&e)
            }
        }
    }

    /// Route one event.
    #[instrument(skip(self, event), fields(connection = %event.connection_id, route = %event.route_key))]
    pub async fn handle(&self, event: &TransportEvent) -> Result<RouteOutcome, RouterError> {
        match event.route() {
            Route::Connect => {
                debug!("connected");
                Ok(RouteOutcome::Connected)
            }
            Route::Disconnect => {
                // Queue entries and session membership are left as they are
                info!("disconnected");
                Ok(RouteOutcome::Disconnected)
            }
            Route::JoinQueue => self.join_queue(&event.connection_id).await,
            Route::PlayerMove => self.player_move(&event.connection_id, event.body.as_deref()).await,
            Route::Unknown(key) => Err(RouterError::RouteNotFound(key)),
        }
    }

    async fn join_queue(&self, connection_id: &ConnectionId) -> Result<RouteOutcome, RouterError> {
        let entry = QueueEntry { connection_id: connection_id.clone() };
        let message_id = self
            .queue
            .send(entry.to_body())
            .await
            .map_err(RouterError::QueueUnavailable)?;

        info!(%message_id, "joined matchmaking queue");
        Ok(RouteOutcome::Queued)
    }

    async fn player_move(
        &self,
        connection_id: &ConnectionId,
        body: Option<&str>,
    ) -> Result<RouteOutcome, RouterError> {
        let Some((match_id, direction)) = parse_move(body) else {
            debug!("move ignored");
            return Ok(RouteOutcome::MoveIgnored);
        };

        self.store
            .merge_input(&match_id, connection_id, direction)
            .await
            .map_err(RouterError::UpdateFailed)?;

        Ok(RouteOutcome::MoveRegistered)
    }
}

/// Extract a complete move, or `None` if anything is missing or malformed.
fn parse_move(body: Option<&str>) -> Option<(MatchId, Direction)> {
    let request: MoveRequest = serde_json::from_str(body?).ok()?;
    let match_id = request.match_id.filter(|id| !id.is_empty())?;
    let direction = request.direction?.parse().ok()?;
    Some((MatchId::new(match_id), direction))
}

//! Network Layer
//!
//! Session lifecycle around the deterministic game core: input routing,
//! matchmaking, the tick loop, fan-out and the WebSocket gateway.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod engine;
pub mod matchmaker;
pub mod protocol;
pub mod queue;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;

pub use engine::{StepOutcome, TickEngine, TickError};
pub use matchmaker::{InvocationReply, Matchmaker, MatchmakerError, SweepOutcome};
pub use protocol::{
    MatchmakerInvocation, OutboundMessage, QueueEntry, Route, RouteResponse, ServerMessage,
    TickInvocation, TransportEvent,
};
pub use queue::{InMemoryQueue, MatchQueue, QueueError, QueueMessage};
pub use router::{InputRouter, RouteOutcome, RouterError};
pub use scheduler::{ChainExit, DispatchError, TickDispatcher, TickScheduler};
pub use server::{GameServer, GameServerError};
pub use session::{MatchId, SessionPhase, SessionRecord, SessionStatus};
pub use store::{InMemorySessionStore, SessionStore, StoreError};
pub use transport::{Broadcaster, ConnectionPush, ConnectionRegistry, DeliveryReport, PushError};

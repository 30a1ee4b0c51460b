//! Protocol Messages
//!
//! Wire formats exchanged with the transport gateway, the queue, clients
//! and the tick/matchmaker invocation payloads. All JSON.

use serde::{Serialize, Deserialize};

use crate::game::state::{ConnectionId, GameState};
use crate::network::session::MatchId;

// =============================================================================
// TRANSPORT EVENTS
// =============================================================================

/// Route selected by the gateway for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Connection opened
    Connect,
    /// Connection closed
    Disconnect,
    /// Player wants a match
    JoinQueue,
    /// Player pressed a direction
    PlayerMove,
    /// Anything else
    Unknown(String),
}

impl Route {
    /// Parse a route key. Accepts both `$connect` and `connect` forms.
    pub fn parse(key: &str) -> Self {
        match key {
            "$connect" | "connect" => Route::Connect,
            "$disconnect" | "disconnect" => Route::Disconnect,
            "joinQueue" => Route::JoinQueue,
            "playerMove" => Route::PlayerMove,
            other => Route::Unknown(other.to_string()),
        }
    }
}

/// One event delivered by the transport for one connection.
#[derive(Debug, Clone)]
pub struct TransportEvent {
    /// Route key as received
    pub route_key: String,
    /// Originating connection
    pub connection_id: ConnectionId,
    /// Raw JSON body, if any
    pub body: Option<String>,
}

impl TransportEvent {
    /// Create an event.
    pub fn new(route_key: impl Into<String>, connection_id: ConnectionId, body: Option<String>) -> Self {
        Self {
            route_key: route_key.into(),
            connection_id,
            body,
        }
    }

    /// Parsed route.
    pub fn route(&self) -> Route {
        Route::parse(&self.route_key)
    }
}

/// Response handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    /// HTTP-style status
    pub status_code: u16,
    /// Short human-readable body
    pub body: String,
}

impl RouteResponse {
    /// 200 response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status_code: 200, body: body.into() }
    }

    /// 404 response.
    pub fn not_found() -> Self {
        Self { status_code: 404, body: "Route not found".to_string() }
    }

    /// 500 response.
    pub fn internal(body: impl Into<String>) -> Self {
        Self { status_code: 500, body: body.into() }
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// `playerMove` body. Fields are optional so missing ones can be dropped quietly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// Target session
    pub match_id: Option<String>,
    /// Requested heading name
    pub direction: Option<String>,
}

// =============================================================================
// QUEUE
// =============================================================================

/// Matchmaking queue message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Queued connection
    pub connection_id: ConnectionId,
}

impl QueueEntry {
    /// Encode as a queue body.
    pub fn to_body(&self) -> String {
        serde_json::json!({ "connectionId": self.connection_id }).to_string()
    }

    /// Decode a queue body.
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Messages pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A session was created for this player.
    MatchFound {
        /// New session id
        #[serde(rename = "matchId")]
        match_id: MatchId,
    },

    /// Full state after a tick.
    GameState {
        /// Snapshot
        state: GameState,
    },
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// INVOCATION PAYLOADS
// =============================================================================

/// Payload that starts a tick chain, carried unchanged from tick to tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickInvocation {
    /// Session to advance
    pub match_id: MatchId,
}

impl TickInvocation {
    /// Invocation for `match_id`.
    pub fn new(match_id: MatchId) -> Self {
        Self { match_id }
    }
}

/// One pre-serialized frame for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient
    pub cid: ConnectionId,
    /// Frame text
    pub data: String,
}

/// What a matchmaker invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakerInvocation {
    /// Regular queue sweep
    Sweep,
    /// Relay frames on behalf of another component
    Broadcast(Vec<OutboundMessage>),
}

#[derive(Deserialize)]
struct BroadcastPayload {
    action: String,
    #[serde(default)]
    messages: Vec<OutboundMessage>,
}

impl MatchmakerInvocation {
    /// Interpret an invocation payload. Anything that is not a well-formed
    /// `{"action": "broadcast", ...}` is a sweep.
    pub fn from_value(payload: &serde_json::Value) -> Self {
        match serde_json::from_value::<BroadcastPayload>(payload.clone()) {
            Ok(p) if p.action == "broadcast" => MatchmakerInvocation::Broadcast(p.messages),
            _ => MatchmakerInvocation::Sweep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Cell;

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("$connect"), Route::Connect);
        assert_eq!(Route::parse("connect"), Route::Connect);
        assert_eq!(Route::parse("$disconnect"), Route::Disconnect);
        assert_eq!(Route::parse("joinQueue"), Route::JoinQueue);
        assert_eq!(Route::parse("playerMove"), Route::PlayerMove);
        assert_eq!(Route::parse("chat"), Route::Unknown("chat".to_string()));
    }

    #[test]
    fn test_queue_entry_body() {
        let entry = QueueEntry { connection_id: ConnectionId::new("abc=") };
        assert_eq!(entry.to_body(), r#"{"connectionId":"abc="}"#);
        assert_eq!(QueueEntry::from_body(&entry.to_body()).unwrap(), entry);
        assert!(QueueEntry::from_body("{}").is_err());
        assert!(QueueEntry::from_body("not json").is_err());
    }

    #[test]
    fn test_match_found_wire_shape() {
        let msg = ServerMessage::MatchFound { match_id: MatchId::new("m-1") };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"type": "matchFound", "matchId": "m-1"}));
    }

    #[test]
    fn test_game_state_wire_shape() {
        let msg = ServerMessage::GameState { state: GameState::new(40, 40, Cell::new(1, 1)) };
        let json = msg.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "gameState");
        assert_eq!(value["state"]["width"], 40);

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::GameState { state } => assert_eq!(state.food, Cell::new(1, 1)),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_move_request_lenient() {
        let req: MoveRequest = serde_json::from_str(r#"{"matchId": "m", "action": "playerMove"}"#).unwrap();
        assert_eq!(req.match_id.as_deref(), Some("m"));
        assert!(req.direction.is_none());
    }

    #[test]
    fn test_matchmaker_invocation() {
        let payload = serde_json::json!({
            "action": "broadcast",
            "messages": [{"cid": "a", "data": "hello"}, {"cid": "b", "data": "world"}]
        });
        match MatchmakerInvocation::from_value(&payload) {
            MatchmakerInvocation::Broadcast(messages) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[1].cid, ConnectionId::new("b"));
            }
            other => panic!("Wrong invocation: {:?}", other),
        }

        assert_eq!(MatchmakerInvocation::from_value(&serde_json::json!({})), MatchmakerInvocation::Sweep);
        assert_eq!(
            MatchmakerInvocation::from_value(&serde_json::json!({"action": "other"})),
            MatchmakerInvocation::Sweep
        );
    }
}

//! WebSocket Gateway
//!
//! Standalone transport for the session engine. Each accepted socket gets
//! a fresh connection id; its text frames `{"action": <route>, ...}` are
//! routed through the [`InputRouter`], and frames pushed by the engine are
//! written back out. Matchmaker sweeps and orphan reconciliation run as
//! background loops.
//!
//! Proxy broadcast is not a client route: a `broadcast` frame from a socket
//! is answered 404. In-process components relay through [`GameServer::relay`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn, instrument};

use crate::config::{EngineConfig, ServerConfig};
use crate::game::state::ConnectionId;
use crate::network::engine::TickEngine;
use crate::network::matchmaker::{Matchmaker, SweepOutcome};
use crate::network::protocol::{OutboundMessage, TransportEvent};
use crate::network::queue::{InMemoryQueue, MatchQueue};
use crate::network::router::InputRouter;
use crate::network::scheduler::TickScheduler;
use crate::network::store::{InMemorySessionStore, SessionStore};
use crate::network::transport::{Broadcaster, ConnectionRegistry, DeliveryReport};

/// Route key used when a frame names no action.
const DEFAULT_ROUTE: &str = "$default";

/// Floor for background loop periods; `interval` rejects zero.
const MIN_LOOP_PERIOD: Duration = Duration::from_millis(1);

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// The gateway process.
pub struct GameServer {
    config: ServerConfig,
    engine_config: EngineConfig,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<dyn MatchQueue>,
    router: Arc<InputRouter>,
    matchmaker: Arc<Matchmaker>,
    scheduler: Arc<TickScheduler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over in-memory store and queue.
    pub fn new(config: ServerConfig, engine_config: EngineConfig) -> Self {
        let store = Arc::new(InMemorySessionStore::new());
        let queue = Arc::new(InMemoryQueue::new(engine_config.visibility_timeout));
        Self::with_backends(config, engine_config, store, queue)
    }

    /// Create a server over the given store and queue.
    pub fn with_backends(
        config: ServerConfig,
        engine_config: EngineConfig,
        store: Arc<dyn SessionStore>,
        queue: Arc<dyn MatchQueue>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));

        let engine = Arc::new(TickEngine::new(store.clone(), broadcaster.clone(), &engine_config));
        let scheduler = Arc::new(TickScheduler::new(engine, engine_config.tick_delay));
        let router = Arc::new(InputRouter::new(queue.clone(), store.clone()));
        let matchmaker = Arc::new(Matchmaker::new(
            queue.clone(),
            store,
            broadcaster,
            scheduler.clone(),
            &engine_config,
        ));

        Self {
            config,
            engine_config,
            registry,
            queue,
            router,
            matchmaker,
            scheduler,
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let sweep_handle = tokio::spawn(Self::run_sweep_loop(
            self.matchmaker.clone(),
            self.engine_config.clone(),
            self.shutdown_tx.subscribe(),
        ));
        let reconcile_handle = self.engine_config.orphan_timeout.map(|max_idle| {
            tokio::spawn(Self::run_reconcile_loop(
                self.scheduler.clone(),
                max_idle,
                self.shutdown_tx.subscribe(),
            ))
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.registry.len().await >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();
        if let Some(handle) = reconcile_handle {
            handle.abort();
        }

        Ok(())
    }

    /// Sweep the queue on a fixed interval.
    async fn run_sweep_loop(
        matchmaker: Arc<Matchmaker>,
        config: EngineConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(config.sweep_interval.max(MIN_LOOP_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
            }

            match matchmaker.sweep().await {
                Ok(SweepOutcome::MatchStarted { match_id, players }) => {
                    info!(%match_id, players = players.len(), "match started");
                }
                Ok(_) => {}
                Err(e) => error!("Matchmaker sweep failed: {}", e),
            }
        }
    }

    /// End orphaned sessions periodically.
    async fn run_reconcile_loop(
        scheduler: Arc<TickScheduler>,
        max_idle: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(max_idle.max(MIN_LOOP_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
            }

            match scheduler.reconcile_orphans(max_idle).await {
                Ok(ended) if !ended.is_empty() => info!(count = ended.len(), "orphaned sessions ended"),
                Ok(_) => {}
                Err(e) => error!("Orphan reconciliation failed: {}", e),
            }
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let router = self.router.clone();
        let outbound_buffer = self.config.outbound_buffer;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (frame_tx, mut frame_rx) = mpsc::channel::<String>(outbound_buffer.max(1));
            let connection_id = ConnectionId::generate();

            registry.register(connection_id.clone(), frame_tx).await;
            router
                .respond(&TransportEvent::new("$connect", connection_id.clone(), None))
                .await;
            debug!(connection = %connection_id, "Client {} registered", addr);

            let sender_task = tokio::spawn(async move {
                while let Some(frame) = frame_rx.recv().await {
                    if ws_sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let event = TransportEvent::new(route_key(&text), connection_id.clone(), Some(text));
                                let response = router.respond(&event).await;
                                if !response.is_success() {
                                    debug!(
                                        connection = %connection_id,
                                        status = response.status_code,
                                        body = %response.body,
                                        "route rejected"
                                    );
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            sender_task.abort();
            router
                .respond(&TransportEvent::new("$disconnect", connection_id.clone(), None))
                .await;
            registry.unregister(&connection_id).await;

            info!("Client {} cleaned up", addr);
        });
    }

    /// Relay pre-serialized frames to connected clients through the matchmaker.
    pub async fn relay(&self, messages: &[OutboundMessage]) -> DeliveryReport {
        self.matchmaker.proxy_broadcast(messages).await
    }

    /// Get the number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Get the number of messages in the matchmaking queue.
    pub async fn queue_size(&self) -> usize {
        self.queue.len().await.unwrap_or(0)
    }

    /// Get the number of tick chains in flight.
    pub async fn running_sessions(&self) -> usize {
        self.scheduler.running_count().await
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        let _ = self.shutdown_tx.send(());
    }
}

/// API-gateway style route selection on the frame's `action` field.
fn route_key(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("action").and_then(|a| a.as_str()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ROUTE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_route_key() {
        assert_eq!(route_key(r#"{"action": "joinQueue"}"#), "joinQueue");
        assert_eq!(route_key(r#"{"action": "playerMove", "matchId": "m"}"#), "playerMove");
        assert_eq!(route_key(r#"{"matchId": "m"}"#), DEFAULT_ROUTE);
        assert_eq!(route_key(r#"{"action": 5}"#), DEFAULT_ROUTE);
        assert_eq!(route_key("hello"), DEFAULT_ROUTE);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(test_config(), EngineConfig::default());

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.queue_size().await, 0);
        assert_eq!(server.running_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_join_and_match_through_router() {
        let engine_config = EngineConfig {
            receive_wait: Duration::from_millis(10),
            tick_delay: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let server = GameServer::new(test_config(), engine_config);

        for cid in ["a", "b"] {
            let body = Some(r#"{"action":"joinQueue"}"#.to_string());
            let event = TransportEvent::new("joinQueue", ConnectionId::new(cid), body);
            assert!(server.router.respond(&event).await.is_success());
        }
        assert_eq!(server.queue_size().await, 2);

        let outcome = server.matchmaker.sweep().await.unwrap();
        assert!(matches!(outcome, SweepOutcome::MatchStarted { .. }));
        assert_eq!(server.queue_size().await, 0);
        assert_eq!(server.running_sessions().await, 1);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_relay_reaches_registered_connections() {
        let server = GameServer::new(test_config(), EngineConfig::default());
        let (tx, mut rx) = mpsc::channel(4);
        server.registry.register(ConnectionId::new("a"), tx).await;

        let messages = vec![
            OutboundMessage { cid: ConnectionId::new("a"), data: "hello".to_string() },
            OutboundMessage { cid: ConnectionId::new("missing"), data: "lost".to_string() },
        ];
        let report = server.relay(&messages).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_client_broadcast_frame_rejected() {
        let server = GameServer::new(test_config(), EngineConfig::default());
        let (tx, mut rx) = mpsc::channel(4);
        server.registry.register(ConnectionId::new("victim"), tx).await;

        let text = r#"{"action":"broadcast","messages":[{"cid":"victim","data":"spoof"}]}"#.to_string();
        let event = TransportEvent::new(route_key(&text), ConnectionId::new("attacker"), Some(text));
        let response = server.router.respond(&event).await;
        assert_eq!(response.status_code, 404);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = GameServer::new(test_config(), EngineConfig::default());
        server.shutdown();
        // Should not panic
    }
}

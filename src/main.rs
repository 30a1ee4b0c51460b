//! Serpent Arena Session Server
//!
//! Runs the WebSocket gateway with matchmaking and the authoritative
//! tick loop in one process.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use serpent_arena::{
    config::{EngineConfig, ServerConfig},
    network::GameServer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;

    info!("Serpent Arena Server v{}", config.version);
    info!(
        "Grid: {}x{}, quorum {}, tick delay {:?}",
        engine_config.grid_width, engine_config.grid_height, engine_config.min_players, engine_config.tick_delay
    );
    match engine_config.orphan_timeout {
        Some(timeout) => info!("Orphan reconciliation after {:?} idle", timeout),
        None => info!("Orphan reconciliation disabled"),
    }

    let bind_addr = config.bind_addr;
    let server = GameServer::new(config, engine_config);

    tokio::select! {
        result = server.run() => {
            result.with_context(|| format!("server on {} failed", bind_addr))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

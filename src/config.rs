//! Configuration
//!
//! Defaults match the production tuning; every field can be overridden
//! through `ARENA_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::{GRID_SIZE, FOOD_REWARD, MIN_PLAYERS, MATCH_BATCH_SIZE, TICK_DELAY_MS, VERSION};

/// Session engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Grid width in cells.
    pub grid_width: u32,
    /// Grid height in cells.
    pub grid_height: u32,
    /// Quorum for creating a session.
    pub min_players: usize,
    /// Maximum queue messages per sweep.
    pub batch_size: usize,
    /// Bounded wait for the queue receive.
    pub receive_wait: Duration,
    /// How long a received message stays hidden before it is redelivered.
    pub visibility_timeout: Duration,
    /// Pause between ticks.
    pub tick_delay: Duration,
    /// Score per food.
    pub food_reward: u32,
    /// Interval between matchmaker sweeps.
    pub sweep_interval: Duration,
    /// Active sessions idle this long with no tick chain are ended.
    /// `None` disables reconciliation.
    pub orphan_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_width: GRID_SIZE,
            grid_height: GRID_SIZE,
            min_players: MIN_PLAYERS,
            batch_size: MATCH_BATCH_SIZE,
            receive_wait: Duration::from_secs(1),
            visibility_timeout: Duration::from_secs(30),
            tick_delay: Duration::from_millis(TICK_DELAY_MS),
            food_reward: FOOD_REWARD,
            sweep_interval: Duration::from_secs(1),
            orphan_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A session needs at least one player.
    #[error("min_players must be at least 1")]
    ZeroQuorum,

    /// A sweep could never see a full quorum.
    #[error("batch_size {batch_size} is below min_players {min_players}")]
    BatchBelowQuorum {
        /// Messages per sweep
        batch_size: usize,
        /// Quorum
        min_players: usize,
    },

    /// Grid dimension outside `1..=i32::MAX`.
    #[error("grid {width}x{height} out of range")]
    GridOutOfRange {
        /// Width in cells
        width: u32,
        /// Height in cells
        height: u32,
    },
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |key: &str| parse_as::<u64>(lookup(key)).map(Duration::from_millis);

        let config = Self {
            grid_width: parse_as(lookup("ARENA_GRID_WIDTH")).unwrap_or(defaults.grid_width),
            grid_height: parse_as(lookup("ARENA_GRID_HEIGHT")).unwrap_or(defaults.grid_height),
            min_players: parse_as(lookup("ARENA_MIN_PLAYERS")).unwrap_or(defaults.min_players),
            batch_size: parse_as(lookup("ARENA_BATCH_SIZE")).unwrap_or(defaults.batch_size),
            receive_wait: millis("ARENA_RECEIVE_WAIT_MS").unwrap_or(defaults.receive_wait),
            visibility_timeout: millis("ARENA_VISIBILITY_TIMEOUT_MS").unwrap_or(defaults.visibility_timeout),
            tick_delay: millis("ARENA_TICK_DELAY_MS").unwrap_or(defaults.tick_delay),
            food_reward: parse_as(lookup("ARENA_FOOD_REWARD")).unwrap_or(defaults.food_reward),
            sweep_interval: millis("ARENA_SWEEP_INTERVAL_MS").unwrap_or(defaults.sweep_interval),
            orphan_timeout: match lookup("ARENA_ORPHAN_TIMEOUT_MS").as_deref() {
                Some("off") | Some("0") => None,
                Some(v) => v.parse().ok().map(Duration::from_millis).or(defaults.orphan_timeout),
                None => defaults.orphan_timeout,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the values the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players == 0 {
            return Err(ConfigError::ZeroQuorum);
        }
        if self.batch_size < self.min_players {
            return Err(ConfigError::BatchBelowQuorum {
                batch_size: self.batch_size,
                min_players: self.min_players,
            });
        }
        // Cells are i32 coordinates
        let in_range = |n: u32| n >= 1 && n <= i32::MAX as u32;
        if !in_range(self.grid_width) || !in_range(self.grid_height) {
            return Err(ConfigError::GridOutOfRange {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        Ok(())
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before pushes fail.
    pub outbound_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_buffer: 64,
            version: VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("ARENA_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("ARENA_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            outbound_buffer: env_parse("ARENA_OUTBOUND_BUFFER").unwrap_or(defaults.outbound_buffer),
            version: defaults.version,
        }
    }
}

fn parse_as<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    parse_as(std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.grid_width, 40);
        assert_eq!(config.grid_height, 40);
        assert_eq!(config.min_players, 2);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.tick_delay, Duration::from_millis(150));
        assert_eq!(config.food_reward, 10);
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.version, VERSION);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.min_players, 2);
    }

    #[test]
    fn test_overrides_applied() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("ARENA_GRID_WIDTH", "20"),
            ("ARENA_MIN_PLAYERS", "3"),
            ("ARENA_TICK_DELAY_MS", "50"),
            ("ARENA_ORPHAN_TIMEOUT_MS", "off"),
        ]))
        .unwrap();
        assert_eq!(config.grid_width, 20);
        assert_eq!(config.grid_height, 40);
        assert_eq!(config.min_players, 3);
        assert_eq!(config.tick_delay, Duration::from_millis(50));
        assert_eq!(config.orphan_timeout, None);
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let result = EngineConfig::from_lookup(lookup_from(&[("ARENA_MIN_PLAYERS", "0")]));
        assert_eq!(result.unwrap_err(), ConfigError::ZeroQuorum);
    }

    #[test]
    fn test_batch_below_quorum_rejected() {
        let result = EngineConfig::from_lookup(lookup_from(&[
            ("ARENA_MIN_PLAYERS", "4"),
            ("ARENA_BATCH_SIZE", "3"),
        ]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::BatchBelowQuorum { batch_size: 3, min_players: 4 }
        );

        // Equal is enough
        let config = EngineConfig { min_players: 4, batch_size: 4, ..EngineConfig::default() };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_zero_grid_rejected() {
        let result = EngineConfig::from_lookup(lookup_from(&[("ARENA_GRID_WIDTH", "0")]));
        assert_eq!(result.unwrap_err(), ConfigError::GridOutOfRange { width: 0, height: 40 });

        let result = EngineConfig::from_lookup(lookup_from(&[("ARENA_GRID_HEIGHT", "0")]));
        assert_eq!(result.unwrap_err(), ConfigError::GridOutOfRange { width: 40, height: 0 });
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let too_wide = (i32::MAX as u32 + 1).to_string();
        let result = EngineConfig::from_lookup(lookup_from(&[("ARENA_GRID_WIDTH", too_wide.as_str())]));
        assert!(matches!(result, Err(ConfigError::GridOutOfRange { .. })));

        let widest = EngineConfig { grid_width: i32::MAX as u32, ..EngineConfig::default() };
        assert_eq!(widest.validate(), Ok(()));
    }

    #[test]
    fn test_from_env_rejects_zero_grid() {
        // Only test touching the process environment
        std::env::set_var("ARENA_GRID_WIDTH", "0");
        let result = EngineConfig::from_env();
        std::env::remove_var("ARENA_GRID_WIDTH");
        assert!(matches!(result, Err(ConfigError::GridOutOfRange { width: 0, .. })));
    }
}

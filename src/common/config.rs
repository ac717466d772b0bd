//! # Configuration
//!
//! Server configuration structures, loaded from a TOML file with serde.
//! Every field has a default matching the reference deployment, so the
//! configuration file (and each of its sections) is optional.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener addresses for the control and data planes
    pub server: ListenConfig,
    /// Liveness probe timing
    pub heartbeat: HeartbeatConfig,
    /// Guessing-game timing and number range
    pub game: GameConfig,
    /// File-transfer rendezvous timing
    pub rendezvous: RendezvousConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// - `path`: Path to the TOML configuration file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Bind addresses for the two listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Interface to bind both listeners to
    pub host: String,
    /// Control-plane TCP port (text protocol)
    pub port: u16,
    /// Data-plane TCP port (file-transfer rendezvous)
    pub transfer_port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1337,
            transfer_port: 1338,
        }
    }
}

/// Heartbeat monitor timing. The monitor starts `warmup_ms` after a
/// successful login, probes every `probe_interval_ms`, and closes the
/// connection when no PONG arrives within `ack_timeout_ms` of a probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub warmup_ms: u64,
    pub probe_interval_ms: u64,
    pub ack_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 10_000,
            probe_interval_ms: 10_000,
            ack_timeout_ms: 3_000,
        }
    }
}

impl HeartbeatConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Guessing-game parameters: join-window length, round length, and the
/// closed integer range the target is drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub join_window_ms: u64,
    pub round_timeout_ms: u64,
    pub lower_bound: i64,
    pub upper_bound: i64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            join_window_ms: 10_000,
            round_timeout_ms: 120_000,
            lower_bound: 1,
            upper_bound: 50,
        }
    }
}

impl GameConfig {
    pub fn join_window(&self) -> Duration {
        Duration::from_millis(self.join_window_ms)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}

/// Rendezvous timing: how long a half-open entry (one role connected,
/// the other missing) is kept before it is expired and closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    pub pending_timeout_ms: u64,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            pending_timeout_ms: 30_000,
        }
    }
}

impl RendezvousConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }
}

//! Configuration system.
//!
//! Loads relay configuration from JSON strings/files. Binaries layer CLI
//! flags and the `PORT` environment variable on top.

use std::{net::SocketAddr, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Server listen address, e.g. `127.0.0.1:3000`.
    pub server_addr: String,
    /// Spawn positions are drawn from `[-spawn_extent, spawn_extent)` per axis.
    #[serde(default = "default_spawn_extent")]
    pub spawn_extent: f32,
    /// Client movement loop rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Client movement speed in world units per second.
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    #[serde(default)]
    pub combat: CombatConfig,
}

/// Damage-to-gold conversion applied by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Accumulated damage needed for one reward.
    pub gold_threshold: u32,
    /// Gold granted each time the threshold is crossed.
    pub gold_reward: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            gold_threshold: 100,
            gold_reward: 10,
        }
    }
}

fn default_spawn_extent() -> f32 {
    128.0
}

fn default_tick_hz() -> u32 {
    60
}

fn default_move_speed() -> f32 {
    80.0
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            spawn_extent: default_spawn_extent(),
            tick_hz: default_tick_hz(),
            move_speed: default_move_speed(),
            combat: CombatConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    /// Rejects numeric settings the relay cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.spawn_extent.is_finite() || self.spawn_extent < 0.0 {
            anyhow::bail!(
                "spawn_extent must be a finite non-negative number, got {}",
                self.spawn_extent
            );
        }
        if !self.move_speed.is_finite() || self.move_speed < 0.0 {
            anyhow::bail!(
                "move_speed must be a finite non-negative number, got {}",
                self.move_speed
            );
        }
        Ok(())
    }

    /// Replaces the port of `server_addr`, keeping the host.
    pub fn with_port(mut self, port: u16) -> anyhow::Result<Self> {
        let mut addr: SocketAddr = self.server_addr.parse().context("parse server_addr")?;
        addr.set_port(port);
        self.server_addr = addr.to_string();
        Ok(self)
    }

    /// Applies the `PORT` environment variable if it is set.
    pub fn apply_env(self) -> anyhow::Result<Self> {
        match std::env::var("PORT") {
            Ok(raw) => {
                let port: u16 = raw.parse().with_context(|| format!("parse PORT={raw}"))?;
                self.with_port(port)
            }
            Err(_) => Ok(self),
        }
    }
}

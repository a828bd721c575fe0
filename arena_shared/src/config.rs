//! Configuration system.
//!
//! Loads configuration from JSON strings (file IO left to the binaries).
//! Every tuning value is a named field with its unit in the name, and every
//! field has a default, so a config file only lists what it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{physics::PhysicsConfig, weapon::WeaponTable};

/// Root configuration shared by client and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Player name (client only).
    pub player_name: String,
    /// Fixed simulation tick rate, Hz. Shared by client prediction and
    /// server simulation.
    pub tick_hz: u32,
    /// Outbound input batches per second (client).
    pub send_hz: u32,
    /// Input samples kept for replay before the client declares a desync.
    pub input_buffer_len: usize,
    /// Render lag applied to remote entities, milliseconds.
    pub interpolation_delay_ms: u64,
    /// A remote entity with no update for this long is removed, milliseconds.
    pub stale_timeout_ms: u64,
    /// A predicted bullet with no server confirmation for this long is
    /// dropped as a miss, milliseconds.
    pub fire_confirm_timeout_ms: u64,
    /// Handshake deadline, milliseconds.
    pub join_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    pub bomb: BombConfig,
    /// Server: delay before a dead player respawns, milliseconds.
    pub respawn_delay_ms: u64,
    /// Server: snapshots are broadcast every N ticks.
    pub snapshot_every_ticks: u32,
    /// Server: seed for spawn-point selection.
    pub seed: u64,
    pub physics: PhysicsConfig,
    pub weapons: WeaponTable,
}

/// Bounded exponential backoff for reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
            max_attempts: 6,
        }
    }
}

/// Bomb tuning. Fuse timing is driven by the server's arm timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BombConfig {
    pub fuse_ms: u64,
    /// Blast radius, metres.
    pub blast_radius: f32,
    /// Damage at the centre, falling off linearly to zero at the radius.
    pub blast_damage: i32,
    /// Maximum distance from which a bomb can be defused, metres.
    pub defuse_reach: f32,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self {
            fuse_ms: 40_000,
            blast_radius: 8.0,
            blast_damage: 150,
            defuse_reach: 2.0,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            player_name: "Player".to_string(),
            tick_hz: 64,
            send_hz: 20,
            input_buffer_len: 256,
            interpolation_delay_ms: 100,
            stale_timeout_ms: 3_000,
            fire_confirm_timeout_ms: 1_000,
            join_timeout_ms: 5_000,
            reconnect: ReconnectPolicy::default(),
            bomb: BombConfig::default(),
            respawn_delay_ms: 3_000,
            snapshot_every_ticks: 2,
            seed: 0x5eed,
            physics: PhysicsConfig::default(),
            weapons: WeaponTable::default(),
        }
    }
}

impl SyncConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Fixed simulation step in seconds.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.send_hz.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SyncConfig::from_json_str(
            r#"{ "tick_hz": 30, "bomb": { "fuse_ms": 10000 }, "weapons": { "pistol": { "damage": 1, "bullet_speed": 10.0, "cooldown_ms": 500, "lifetime_ms": 100, "magazine": 1, "reload_ms": 1 } } }"#,
        )
        .unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.bomb.fuse_ms, 10_000);
        assert_eq!(cfg.bomb.blast_radius, BombConfig::default().blast_radius);
        assert_eq!(cfg.send_hz, SyncConfig::default().send_hz);
        assert_eq!(cfg.weapons.pistol.cooldown_ms, 500);
        assert_eq!(cfg.weapons.rifle, WeaponTable::default().rifle);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(SyncConfig::from_json_str("{}").unwrap(), SyncConfig::default());
    }
}

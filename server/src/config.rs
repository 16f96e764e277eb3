//! Server configuration.
//!
//! Every field has a default so a config file only needs to list what it
//! changes. Command-line flags in `main.rs` override the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared::{GameMode, Weapon, MAX_PLAYERS};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-weapon projectile behaviour and damage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponStats {
    /// Health removed from a struck player
    pub damage: i32,
    /// Projectile speed in pixels per second
    pub speed: f32,
    /// Distance after which the projectile expires
    pub range: f32,
    /// Minimum time between two shots
    pub reload_ms: u64,
    /// Random spread (degrees) applied to each projectile
    pub spread: f32,
    /// How far in front of the shooter the projectile appears
    pub muzzle_offset: f32,
}

impl WeaponStats {
    pub fn builtin(weapon: Weapon) -> Self {
        let (damage, speed, range, reload_ms, spread, muzzle_offset) = match weapon {
            Weapon::Pistol => (19, 1200.0, 1600.0, 250, 0.0, 20.0),
            Weapon::MachineGun => (13, 1400.0, 1600.0, 100, 3.0, 20.0),
            Weapon::Bazooka => (70, 700.0, 1800.0, 1200, 0.0, 25.0),
            Weapon::Shotgun => (16, 1200.0, 700.0, 900, 8.0, 20.0),
            Weapon::Launcher => (50, 600.0, 900.0, 900, 10.0, 20.0),
            Weapon::Chainsaw => (25, 600.0, 48.0, 150, 0.0, 10.0),
        };
        Self {
            damage,
            speed,
            range,
            reload_ms,
            spread,
            muzzle_offset,
        }
    }

    pub fn reload(&self) -> Duration {
        Duration::from_millis(self.reload_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server_name: String,
    /// Client version string that must match exactly on login
    pub version: String,
    pub updates_per_sec: u32,
    /// Round length in seconds; zero or negative disables the round clock
    pub round_length_secs: i64,
    pub max_inactive_ms: u64,
    pub max_players: u8,
    /// Bot target; negative means "use the map's value"
    pub bot_count: i32,
    /// Bots leave once bots + humans would exceed this; negative means "use the map's value"
    pub bot_depart_limit: i32,
    pub bot_weapons: Vec<Weapon>,
    pub spawn_protection_ms: u64,
    pub death_delay_ms: u64,
    pub game_mode: GameMode,
    /// Map rotation, played in order
    pub maps: Vec<String>,
    pub maps_dir: PathBuf,
    pub map_download_url: String,
    pub show_visible_players_only: bool,
    pub radar_arrows: bool,
    /// Announce the server to the listing service
    pub register: bool,
    /// Fixed RNG seed, mostly for reproducible test runs
    pub seed: Option<u64>,
    pub weapons: BTreeMap<Weapon, WeaponStats>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "Arena".to_string(),
            version: "2.4".to_string(),
            updates_per_sec: 60,
            round_length_secs: 300,
            max_inactive_ms: 15_000,
            max_players: MAX_PLAYERS as u8,
            bot_count: 4,
            bot_depart_limit: 10,
            bot_weapons: Vec::new(),
            spawn_protection_ms: 3_000,
            death_delay_ms: 3_000,
            game_mode: GameMode::TeamDeathmatch,
            maps: vec!["arena".to_string()],
            maps_dir: PathBuf::from("maps"),
            map_download_url: String::new(),
            show_visible_players_only: true,
            radar_arrows: false,
            register: false,
            seed: None,
            weapons: Weapon::ALL
                .iter()
                .map(|w| (*w, WeaponStats::builtin(*w)))
                .collect(),
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maps.is_empty() {
            return Err(ConfigError::Invalid("at least one map is required".into()));
        }
        if self.updates_per_sec == 0 {
            return Err(ConfigError::Invalid("updates_per_sec must be positive".into()));
        }
        if self.max_players == 0 || self.max_players as usize > MAX_PLAYERS {
            return Err(ConfigError::Invalid(format!(
                "max_players must be within 1..={}",
                MAX_PLAYERS
            )));
        }
        Ok(())
    }

    pub fn weapon(&self, weapon: Weapon) -> WeaponStats {
        self.weapons
            .get(&weapon)
            .copied()
            .unwrap_or_else(|| WeaponStats::builtin(weapon))
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.updates_per_sec.max(1) as f64)
    }

    /// `None` when the round clock is disabled.
    pub fn round_length(&self) -> Option<Duration> {
        (self.round_length_secs > 0).then(|| Duration::from_secs(self.round_length_secs as u64))
    }

    pub fn max_inactive_time(&self) -> Duration {
        Duration::from_millis(self.max_inactive_ms)
    }

    pub fn spawn_protection(&self) -> Duration {
        Duration::from_millis(self.spawn_protection_ms)
    }

    pub fn death_delay(&self) -> Duration {
        Duration::from_millis(self.death_delay_ms)
    }

    pub fn rotates_maps(&self) -> bool {
        self.maps.len() > 1
    }
}

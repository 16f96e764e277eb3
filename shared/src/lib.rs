//! Wire protocol shared between the server and any client implementation.
//!
//! Messages are self-describing: every message starts with a one-byte
//! [`MsgType`] tag followed by fixed-width fields. See [`codec`] for the
//! primitive readers and writers.

pub mod codec;

pub use codec::{DecodeError, PacketReader, PacketWriter};

use serde::{Deserialize, Serialize};

pub const MAX_PLAYERS: usize = 64;

/// Connection token reserved for the listing/discovery sub-protocol.
pub const DISCOVERY_TOKEN: u32 = 0x2073_7367;
pub const DISCOVERY_PING: &[u8] = b"PING";
pub const DISCOVERY_PONG: &[u8] = b"PONG";
pub const DISCOVERY_REGISTER: &[u8] = b"GSS+";

/// Health never drops below this value; round end and spectating force it.
pub const MIN_HEALTH: i32 = -10;
pub const MAX_HEALTH: i32 = 100;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Login = 1,
    LoginOk = 2,
    LoginFailed = 3,
    WrongVersion = 4,
    TooManyPlayers = 5,
    NicknameInUse = 6,
    Logout = 7,
    Kicked = 8,
    NoLogin = 9,
    ServerClosing = 10,
    Player = 11,
    PlayerName = 12,
    Radar = 13,
    TeamInfo = 14,
    NewBullet = 15,
    BulletHit = 16,
    KillMsg = 17,
    Item = 18,
    SessionTime = 19,
    MapChange = 20,
    MapLoaded = 21,
    ServerMsg = 22,
    ChatMsg = 23,
    Shoot = 24,
    NamesRequest = 25,
    End = 255,
}

impl MsgType {
    pub fn from_u8(value: u8) -> Option<Self> {
        let msg = match value {
            1 => Self::Login,
            2 => Self::LoginOk,
            3 => Self::LoginFailed,
            4 => Self::WrongVersion,
            5 => Self::TooManyPlayers,
            6 => Self::NicknameInUse,
            7 => Self::Logout,
            8 => Self::Kicked,
            9 => Self::NoLogin,
            10 => Self::ServerClosing,
            11 => Self::Player,
            12 => Self::PlayerName,
            13 => Self::Radar,
            14 => Self::TeamInfo,
            15 => Self::NewBullet,
            16 => Self::BulletHit,
            17 => Self::KillMsg,
            18 => Self::Item,
            19 => Self::SessionTime,
            20 => Self::MapChange,
            21 => Self::MapLoaded,
            22 => Self::ServerMsg,
            23 => Self::ChatMsg,
            24 => Self::Shoot,
            25 => Self::NamesRequest,
            255 => Self::End,
            _ => return None,
        };
        Some(msg)
    }

    /// Zero and `End` both terminate a message sequence.
    pub fn is_terminator(value: u8) -> bool {
        value == 0 || value == Self::End as u8
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Spectator = 0,
    Green = 1,
    Red = 2,
}

impl Team {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Spectator),
            1 => Some(Self::Green),
            2 => Some(Self::Red),
            _ => None,
        }
    }

    pub fn is_spectator(self) -> bool {
        self == Self::Spectator
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Spectator => "spectators",
            Self::Green => "GREEN team",
            Self::Red => "RED team",
        }
    }
}

#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Weapon {
    Pistol = 1,
    MachineGun = 2,
    Bazooka = 3,
    Shotgun = 4,
    Launcher = 5,
    Chainsaw = 6,
}

impl Weapon {
    pub const ALL: [Weapon; 6] = [
        Weapon::Pistol,
        Weapon::MachineGun,
        Weapon::Bazooka,
        Weapon::Shotgun,
        Weapon::Launcher,
        Weapon::Chainsaw,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|w| *w as u8 == value)
    }

    /// Number of projectiles a single trigger pull produces.
    pub fn projectile_count(self) -> u32 {
        match self {
            Weapon::Shotgun => 6,
            Weapon::Launcher => 2,
            _ => 1,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Deathmatch = 1,
    TeamDeathmatch = 2,
    /// Server-side only mode: humans against weak bots. Clients see it as TDM.
    Zombie = 3,
}

impl GameMode {
    pub fn is_team_mode(self) -> bool {
        self != GameMode::Deathmatch
    }

    /// The mode value announced to clients on login.
    pub fn advertised(self) -> u8 {
        match self {
            GameMode::Zombie => GameMode::TeamDeathmatch as u8,
            other => other as u8,
        }
    }
}

/// Fields packed into the single flag byte of a `Player` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerFlags {
    pub weapon: u8,
    pub has_ammo: bool,
    pub red_team: bool,
    pub protected: bool,
}

impl PlayerFlags {
    pub fn new(weapon: Weapon, has_ammo: bool, team: Team, protected: bool) -> Self {
        Self {
            weapon: weapon as u8,
            has_ammo,
            red_team: team == Team::Red,
            protected,
        }
    }

    /// Bits 0-3 weapon, bit 4 ammo, bit 6 team (red = 1), bit 7 spawn protection.
    pub fn pack(&self) -> u8 {
        (self.weapon % 16)
            | ((self.has_ammo as u8) << 4)
            | ((self.red_team as u8) << 6)
            | ((self.protected as u8) << 7)
    }

    pub fn unpack(byte: u8) -> Self {
        Self {
            weapon: byte & 0x0F,
            has_ammo: byte & (1 << 4) != 0,
            red_team: byte & (1 << 6) != 0,
            protected: byte & (1 << 7) != 0,
        }
    }
}

/// Encodes health into one byte. Negative values are biased by 256 so the
/// receiver can recover them, see [`decode_health`].
pub fn encode_health(health: i32) -> u8 {
    if health <= 0 {
        (health + 256).clamp(0, 255) as u8
    } else {
        health.min(255) as u8
    }
}

pub fn decode_health(byte: u8) -> i32 {
    if byte > 128 {
        byte as i32 - 256
    } else {
        byte as i32
    }
}

/// Bearing from the target towards the observer, quantized over the full
/// circle into a byte.
pub fn radar_angle(observer: (f32, f32), target: (f32, f32)) -> u8 {
    let angle = (observer.1 - target.1).atan2(observer.0 - target.0) + std::f32::consts::PI;
    ((angle / std::f32::consts::TAU) * 255.0) as u8
}

//! Player slot records.
//!
//! The server owns exactly `MAX_PLAYERS` slots for its whole lifetime. A slot
//! is claimed by a human on login or by a bot, and fully reset when the next
//! occupant arrives.

use crate::agent::AgentController;
use shared::{Team, Weapon, MAX_HEALTH, MIN_HEALTH};
use std::fmt;
use std::time::{Duration, Instant};

/// Slot number, 1..=MAX_PLAYERS, as seen on the wire.
pub type PlayerId = u8;

/// Who is on the other end of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientToken {
    /// Token chosen by a remote client and repeated in every datagram
    Remote(u32),
    /// Synthetic token of a bot occupant
    Bot(PlayerId),
    None,
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientToken::Remote(token) => write!(f, "{:#010x}", token),
            ClientToken::Bot(id) => write!(f, "bot:{}", id),
            ClientToken::None => write!(f, "-"),
        }
    }
}

pub enum Controller {
    Human,
    Agent(Box<dyn AgentController>),
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Controller::Human => write!(f, "Human"),
            Controller::Agent(_) => write!(f, "Agent"),
        }
    }
}

const BOT_NAMES: [&str; 16] = [
    "Ripper", "Bolt", "Vex", "Gunner", "Havoc", "Rook", "Slate", "Echo", "Dozer", "Pike",
    "Mortar", "Flint", "Jinx", "Crank", "Talon", "Sable",
];

/// Default name for a bot occupying the given slot.
pub fn bot_name(id: PlayerId) -> String {
    let index = (id as usize).saturating_sub(1);
    let base = BOT_NAMES[index % BOT_NAMES.len()];
    match index / BOT_NAMES.len() {
        0 => format!("[BOT] {}", base),
        round => format!("[BOT] {}{}", base, round + 1),
    }
}

#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub token: ClientToken,
    pub name: String,
    pub controller: Controller,
    pub active: bool,
    pub logged_in: bool,

    pub x: f32,
    pub y: f32,
    /// Facing in degrees
    pub angle: f32,
    pub health: i32,
    pub team: Team,
    /// Team requested by the player or an admin, applied on the next reconciliation
    pub wanted_team: Team,
    pub kills: i32,
    pub deaths: i32,
    pub weapon: Weapon,
    pub has_ammo: bool,
    /// Which hand fired the last pistol shot
    pub hand_shot: bool,

    pub last_activity: Instant,
    pub lag: Duration,
    pub spawn_time: Option<Instant>,
    /// When the player died; `None` makes a dead player revivable at once
    pub time_to_death: Option<Instant>,
    pub last_shot: Option<Instant>,
    /// Map the client reports having loaded
    pub map_name: Option<String>,

    pub admin: bool,
    pub kicked: bool,
    pub kicker: Option<PlayerId>,
    pub kick_reason: String,
    pub send_names: bool,
    pub debug_state: bool,
}

impl Player {
    pub fn new(id: PlayerId, now: Instant) -> Self {
        Self {
            id,
            token: ClientToken::None,
            name: String::new(),
            controller: Controller::Human,
            active: false,
            logged_in: false,
            x: 0.0,
            y: 0.0,
            angle: 0.0,
            health: MAX_HEALTH,
            team: Team::Green,
            wanted_team: Team::Green,
            kills: 0,
            deaths: 0,
            weapon: Weapon::Pistol,
            has_ammo: true,
            hand_shot: false,
            last_activity: now,
            lag: Duration::ZERO,
            spawn_time: None,
            time_to_death: None,
            last_shot: None,
            map_name: None,
            admin: false,
            kicked: false,
            kicker: None,
            kick_reason: String::new(),
            send_names: false,
            debug_state: false,
        }
    }

    /// Clears everything a previous occupant left behind.
    pub fn reset(&mut self, now: Instant) {
        *self = Player::new(self.id, now);
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.controller, Controller::Agent(_))
    }

    pub fn is_human(&self) -> bool {
        !self.is_bot()
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn is_protected(&self, now: Instant, protection: Duration) -> bool {
        self.spawn_time
            .map(|spawned| now.saturating_duration_since(spawned) < protection)
            .unwrap_or(false)
    }

    /// Dead long enough to come back, ignoring team.
    pub fn death_delay_elapsed(&self, now: Instant, death_delay: Duration) -> bool {
        match self.time_to_death {
            Some(died) => now.saturating_duration_since(died) >= death_delay,
            None => true,
        }
    }

    pub fn kill(&mut self, now: Instant) {
        self.health = MIN_HEALTH;
        self.time_to_death = Some(now);
    }

    /// Applies damage and returns true if this hit killed the player.
    pub fn take_damage(&mut self, damage: i32, now: Instant) -> bool {
        if self.is_dead() {
            return false;
        }
        self.health = (self.health - damage).max(MIN_HEALTH);
        if self.is_dead() {
            self.time_to_death = Some(now);
            self.deaths += 1;
            true
        } else {
            false
        }
    }

    pub fn respawn(&mut self, spot: (f32, f32), now: Instant) {
        self.x = spot.0;
        self.y = spot.1;
        self.health = MAX_HEALTH;
        self.spawn_time = Some(now);
        self.time_to_death = None;
    }
}

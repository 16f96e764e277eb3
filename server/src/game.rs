//! Authoritative world state and the fixed-rate simulation tick.
//!
//! [`GameState`] is the single owner of everything the server knows: player
//! slots, live bullets, items, round timing and the current map. It is
//! created once at startup, mutated only by [`GameState::tick`] and the
//! datagram handler in `session.rs`, and dropped at shutdown.

use crate::agent::{default_agent_factory, AgentFactory, AgentTarget, AgentView};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::map::{MapGeometry, MapProvider};
use crate::messages::{MessageQueue, Notice};
use crate::player::{Controller, Player, PlayerId};
use crate::projectile::Bullet;
use crate::utils::{heading, normalize_angle};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{GameMode, Weapon, MAX_PLAYERS};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Longest frame time used for motion; longer stalls are clamped.
const MAX_FRAME_TIME: f32 = 0.25;

/// Bot movement speed in pixels per second at full throttle.
const BOT_SPEED: f32 = 200.0;

/// Round end: rotate the map this long after the clock ran out.
pub const MAP_ROTATION_DELAY_MS: i64 = 5_000;
/// Round end: start the next round this long after the clock ran out.
pub const NEXT_ROUND_DELAY_MS: i64 = 10_000;

/// Health of bots in zombie mode.
pub const ZOMBIE_HEALTH: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    pub id: u8,
    pub kind: u8,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub started: Instant,
    pub complete: bool,
    /// Set once the map has been rotated for the current round end
    pub next_map_loaded: bool,
    pub closing: bool,
}

pub struct GameState {
    pub config: ServerConfig,
    pub players: Vec<Player>,
    pub bullets: BTreeMap<u32, Bullet>,
    pub(crate) last_bullet_id: u32,
    pub items: BTreeMap<u8, Item>,
    pub messages: MessageQueue,
    pub session: SessionState,

    /// Humans currently in the game
    pub player_count: u32,
    /// Current bot target
    pub bot_count: i32,
    pub bot_depart_limit: i32,
    pub max_players: u8,
    pub game_mode: GameMode,

    pub map: Arc<dyn MapGeometry>,
    /// Index into the configured map rotation
    pub map_number: usize,
    maps: HashMap<String, Arc<dyn MapGeometry>>,
    map_provider: Box<dyn MapProvider>,
    agent_factory: AgentFactory,

    /// Seconds elapsed between the previous tick and this one
    pub frame_time: f32,
    last_update: Option<Instant>,
    pub tick: u64,
    pub(crate) rng: StdRng,
}

impl GameState {
    /// Loads the first map of the rotation and seats the initial bots.
    pub fn new(
        config: ServerConfig,
        map_provider: Box<dyn MapProvider>,
        now: Instant,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let map = map_provider.load(&config.maps[0])?;
        info!("Loaded map {}", map.name());

        let mut bot_count = config.bot_count;
        let mut bot_depart_limit = config.bot_depart_limit;
        if bot_count < 0 {
            if let Some(count) = map.config().bot_count {
                bot_count = count;
            }
        }
        if bot_depart_limit < 0 {
            if let Some(limit) = map.config().bot_depart_limit {
                bot_depart_limit = limit;
            }
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut maps = HashMap::new();
        maps.insert(map.name().to_string(), Arc::clone(&map));

        let mut state = Self {
            players: (1..=MAX_PLAYERS)
                .map(|id| Player::new(id as PlayerId, now))
                .collect(),
            bullets: BTreeMap::new(),
            last_bullet_id: 0,
            items: BTreeMap::new(),
            messages: MessageQueue::new(),
            session: SessionState {
                started: now,
                complete: false,
                next_map_loaded: false,
                closing: false,
            },
            player_count: 0,
            bot_count,
            bot_depart_limit,
            max_players: config.max_players,
            game_mode: config.game_mode,
            map,
            map_number: 0,
            maps,
            map_provider,
            agent_factory: default_agent_factory(),
            frame_time: 0.0,
            last_update: None,
            tick: 0,
            rng,
            config,
        };

        state.reset_items();
        state.init_bots(now);
        Ok(state)
    }

    /// Replaces the agent used for bots created from now on.
    pub fn with_agent_factory(mut self, factory: AgentFactory) -> Self {
        self.agent_factory = factory;
        self
    }

    pub(crate) fn new_agent(&self) -> Box<dyn crate::agent::AgentController> {
        (self.agent_factory)()
    }

    pub(crate) fn slot_index(&self, id: PlayerId) -> Option<usize> {
        let index = (id as usize).checked_sub(1)?;
        (index < self.players.len()).then_some(index)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.slot_index(id).map(|index| &self.players[index])
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.slot_index(id).map(move |index| &mut self.players[index])
    }

    pub fn active_bot_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.active && p.is_bot())
            .count()
    }

    /// Queues a notice for one active human player.
    pub fn notify(&mut self, id: PlayerId, notice: Notice) {
        if self.player(id).is_some_and(|p| p.active && p.is_human()) {
            self.messages.push(id, notice);
        }
    }

    /// Queues a notice for every active human, optionally skipping one slot.
    pub fn broadcast(&mut self, notice: Notice, except: Option<PlayerId>) {
        for player in &self.players {
            if player.active && player.is_human() && Some(player.id) != except {
                self.messages.push(player.id, notice.clone());
            }
        }
    }

    /// Milliseconds until the round clock runs out, negative once it has.
    /// `None` when the round clock is disabled.
    pub fn time_left_ms(&self, now: Instant) -> Option<i64> {
        let deadline = self.session.started + self.config.round_length()?;
        Some(if deadline >= now {
            deadline.duration_since(now).as_millis() as i64
        } else {
            -(now.duration_since(deadline).as_millis() as i64)
        })
    }

    /// Picks a weapon from the configured bot weapon list, the map's list,
    /// or any weapon, in that order of preference.
    pub(crate) fn roll_bot_weapon(&mut self) -> Weapon {
        let weapons: Vec<Weapon> = if !self.config.bot_weapons.is_empty() {
            self.config.bot_weapons.clone()
        } else {
            match &self.map.config().bot_weapons {
                Some(list) if !list.is_empty() => list.clone(),
                _ => Weapon::ALL.to_vec(),
            }
        };
        weapons
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Weapon::Pistol)
    }

    /// Runs one simulation step. Phases run in a fixed order and none of
    /// them can abort the tick.
    pub fn tick(&mut self, now: Instant) {
        self.update_frame_timer(now);
        self.update_bots_ai(now);
        self.update_round_time(now);
        self.update_stats();
        self.update_players(now);
        self.update_timeouts(now);
        self.update_bots_amount(now);
        self.advance_bullets(now);

        self.last_update = Some(now);
        self.tick += 1;
    }

    fn update_frame_timer(&mut self, now: Instant) {
        let elapsed = self
            .last_update
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);

        if elapsed > MAX_FRAME_TIME {
            warn!(
                "Large frame time detected ({:.3}s), capping to {:.3}s",
                elapsed, MAX_FRAME_TIME
            );
        }
        self.frame_time = elapsed.min(MAX_FRAME_TIME);
    }

    fn update_bots_ai(&mut self, now: Instant) {
        if self.player_count == 0 || self.session.complete {
            return;
        }

        let team_mode = self.game_mode.is_team_mode();
        let everyone: Vec<AgentTarget> = self
            .players
            .iter()
            .filter(|p| p.active && !p.is_dead() && !p.team.is_spectator())
            .map(|p| AgentTarget {
                id: p.id,
                x: p.x,
                y: p.y,
                team: p.team,
            })
            .collect();
        let map = Arc::clone(&self.map);

        for index in 0..self.players.len() {
            let player = &self.players[index];
            if !player.active || !player.is_bot() || player.is_dead() {
                continue;
            }

            let targets: Vec<AgentTarget> = everyone
                .iter()
                .filter(|t| t.id != player.id && (!team_mode || t.team != player.team))
                .copied()
                .collect();
            let view = AgentView {
                id: player.id,
                x: player.x,
                y: player.y,
                angle: player.angle,
                weapon: player.weapon,
                team: player.team,
                targets: &targets,
                map: map.as_ref(),
            };

            let action = match &mut self.players[index].controller {
                Controller::Agent(agent) => agent.update(&view, &mut self.rng),
                Controller::Human => continue,
            };

            let frame_time = self.frame_time;
            let bot = &mut self.players[index];
            bot.angle = normalize_angle(bot.angle + action.turn * frame_time);
            let step = BOT_SPEED * action.forward.clamp(0.0, 1.0) * frame_time;
            if step > 0.0 {
                let (dx, dy) = heading(bot.angle);
                let (nx, ny) = (bot.x + dx * step, bot.y + dy * step);
                if map.contains(nx, ny) && !map.find_wall(bot.x, bot.y, nx, ny) {
                    bot.x = nx;
                    bot.y = ny;
                }
            }

            if action.fire {
                let id = bot.id;
                self.fire(id, now);
            }
        }
    }

    fn update_round_time(&mut self, now: Instant) {
        let Some(time_left) = self.time_left_ms(now) else {
            return;
        };

        // The clock does not run on an empty server
        if self.player_count == 0 {
            self.session.started = now;
            self.session.complete = false;
            self.session.next_map_loaded = false;
            return;
        }

        if time_left <= 0 {
            if !self.session.complete {
                info!("Round over");
            }
            self.session.complete = true;
            self.bullets.clear();

            if !self.session.next_map_loaded
                && time_left <= -MAP_ROTATION_DELAY_MS
                && self.config.rotates_maps()
            {
                self.change_map(None, now);
                self.session.next_map_loaded = true;
            }

            for player in &mut self.players {
                player.kill(now);
            }
        }

        if time_left <= -NEXT_ROUND_DELAY_MS {
            info!("Starting a new round on {}", self.map.name());
            self.session.started = now;
            self.session.complete = false;
            self.session.next_map_loaded = false;

            let rotates = self.config.rotates_maps();
            let current_map = self.map.name().to_string();
            let mut stale = Vec::new();
            for player in &mut self.players {
                player.time_to_death = None;
                player.kills = 0;
                player.deaths = 0;

                if player.active
                    && player.logged_in
                    && player.is_human()
                    && rotates
                    && player.map_name.as_deref() != Some(current_map.as_str())
                {
                    match &player.map_name {
                        Some(loaded) => warn!(
                            "Player {} had map {} while the server is running {}",
                            player.name, loaded, current_map
                        ),
                        None => warn!("Player {} did not report a loaded map", player.name),
                    }
                    stale.push(player.id);
                }
            }
            for id in stale {
                self.logout(id);
            }
        }
    }

    fn update_stats(&mut self) {
        let interval = (self.config.updates_per_sec as u64 * 60).max(1);
        if self.tick % interval == 0 && self.player_count > 0 {
            debug!(
                "Tick {}: {} players, {} bots, {} bullets",
                self.tick,
                self.player_count,
                self.active_bot_count(),
                self.bullets.len()
            );
        }
    }

    /// Applies at most one pending team change per tick (highest slot first)
    /// and revives players whose death delay has passed.
    fn update_players(&mut self, now: Instant) {
        let death_delay = self.config.death_delay();

        for index in (0..self.players.len()).rev() {
            let player = &self.players[index];
            if player.active && player.team != player.wanted_team {
                self.apply_team_change(index, now);
                return;
            }

            if player.active
                && player.is_dead()
                && !player.team.is_spectator()
                && player.death_delay_elapsed(now, death_delay)
            {
                self.revive(index, now);
            }
        }
    }

    fn apply_team_change(&mut self, index: usize, now: Instant) {
        let player = &mut self.players[index];
        info!(
            "Changing team of {} from {:?} to {:?}",
            player.name, player.team, player.wanted_team
        );
        player.team = player.wanted_team;
        if player.team.is_spectator() {
            player.kill(now);
        }

        let (id, team) = (player.id, player.team);
        self.broadcast(Notice::TeamChanged { id, team }, None);
        self.server_message(
            &format!("You have been moved to {}", team.display_name()),
            Some(id),
        );
    }

    fn revive(&mut self, index: usize, now: Instant) {
        let spot = self.map.find_spot(&mut self.rng);
        let bot_weapon = self.players[index]
            .is_bot()
            .then(|| self.roll_bot_weapon());

        let zombie_mode = self.game_mode == GameMode::Zombie;
        let player = &mut self.players[index];
        debug!("Reviving {}", player.name);
        player.respawn(spot, now);
        if let Some(weapon) = bot_weapon {
            player.weapon = weapon;
            if zombie_mode {
                player.health = ZOMBIE_HEALTH;
                player.spawn_time = None;
            }
        }
    }

    fn update_timeouts(&mut self, now: Instant) {
        let max_inactive = self.config.max_inactive_time();
        let timed_out: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| (p.active || p.logged_in) && p.is_human())
            .filter(|p| now.saturating_duration_since(p.last_activity) > max_inactive)
            .map(|p| p.id)
            .collect();

        for id in timed_out {
            if let Some(player) = self.player(id) {
                warn!("{} timed out", player.name);
            }
            self.logout(id);
        }
    }

    /// Keeps the bot target within the depart limit and the number of
    /// seated bots equal to the target.
    fn update_bots_amount(&mut self, now: Instant) {
        let max_players = self.max_players as i32;
        self.bot_count = self.bot_count.min(max_players);
        self.bot_depart_limit = self.bot_depart_limit.min(max_players);

        let humans = self.player_count as i32;
        if self.bot_depart_limit < self.bot_count + humans {
            self.bot_count = (self.bot_depart_limit - humans).max(0);
        } else if self.bot_depart_limit > self.bot_count + humans {
            // Bots removed by the depart limit come back once there is room
            let room = self.bot_depart_limit - humans;
            let from_map = if self.config.bot_count < 0 {
                self.map
                    .config()
                    .bot_count
                    .filter(|count| *count > self.bot_count)
            } else {
                None
            };
            let restored = from_map.or_else(|| {
                (self.config.bot_count > self.bot_count).then_some(self.config.bot_count)
            });
            if let Some(target) = restored {
                self.bot_count = target.min(room);
            }
        }

        let target = self.bot_count.max(0) as usize;
        let mut seen = 0;
        let mut surplus = Vec::new();
        for player in &self.players {
            if !player.active || !player.is_bot() {
                continue;
            }
            if seen >= target {
                surplus.push(player.id);
            }
            seen += 1;
        }
        for id in surplus {
            self.logout(id);
        }

        for _ in seen..target {
            if self.add_bot(None, now).is_none() {
                break;
            }
        }
    }

    /// Switches to the named map, or to the next map of the rotation.
    /// Returns false if the map could not be loaded.
    pub fn change_map(&mut self, name: Option<&str>, now: Instant) -> bool {
        let next_name = match name {
            Some(name) => name.to_string(),
            None => {
                self.map_number = (self.map_number + 1) % self.config.maps.len();
                self.config.maps[self.map_number].clone()
            }
        };
        info!("Changing map to {}", next_name);

        let next = match self.maps.get(&next_name) {
            Some(map) => Arc::clone(map),
            None => match self.map_provider.load(&next_name) {
                Ok(map) => {
                    self.maps.insert(next_name.clone(), Arc::clone(&map));
                    map
                }
                Err(e) => {
                    error!("Could not load map {}: {}", next_name, e);
                    return false;
                }
            },
        };

        if self.config.bot_count < 0 {
            if let Some(count) = next.config().bot_count {
                self.bot_count = count;
            }
        }
        if self.config.bot_depart_limit < 0 {
            if let Some(limit) = next.config().bot_depart_limit {
                self.bot_depart_limit = limit;
            }
        }

        self.map = next;
        self.bullets.clear();
        self.reset_items();
        self.init_bots(now);

        for player in &mut self.players {
            player.kill(now);
        }
        true
    }

    fn reset_items(&mut self) {
        self.items = self
            .map
            .config()
            .items
            .iter()
            .take(u8::MAX as usize)
            .enumerate()
            .map(|(index, spawn)| {
                let id = index as u8 + 1;
                (
                    id,
                    Item {
                        id,
                        kind: spawn.kind,
                        x: spawn.x,
                        y: spawn.y,
                    },
                )
            })
            .collect();
    }
}

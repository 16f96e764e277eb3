//! Player roster management for the game server
//!
//! This module handles the lifecycle of everyone occupying a player slot:
//! - Human login, logout, kicks and timeouts
//! - Bot creation and reseating on map changes
//! - Team requests and balanced team assignment
//! - Server announcements to one or all players
//!
//! Every change is announced to the remaining human players through the
//! message queues so their clients can keep their own rosters in sync.

use crate::game::{GameState, ZOMBIE_HEALTH};
use crate::messages::Notice;
use crate::player::{bot_name, ClientToken, Controller, PlayerId};
use log::{info, warn};
use rand::Rng;
use shared::{GameMode, MsgType, Team, Weapon, MAX_HEALTH};
use std::time::Instant;
use thiserror::Error;

/// Longest nickname kept; longer names are cut.
pub const MAX_NAME_LEN: usize = 32;

/// Why a login request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginFailure {
    #[error("client version does not match")]
    WrongVersion,
    #[error("server is full")]
    ServerFull,
    #[error("nickname is already in use")]
    NicknameInUse,
    #[error("no free player slot")]
    NoFreeSlot,
}

impl LoginFailure {
    /// Failure code sent back to the client, `None` for silent refusals.
    pub fn code(&self) -> Option<MsgType> {
        match self {
            LoginFailure::WrongVersion => Some(MsgType::WrongVersion),
            LoginFailure::ServerFull => Some(MsgType::TooManyPlayers),
            LoginFailure::NicknameInUse => Some(MsgType::NicknameInUse),
            LoginFailure::NoFreeSlot => None,
        }
    }
}

impl GameState {
    /// Attempts to seat a human player
    ///
    /// Checks the client version, the player limit (bots count towards it)
    /// and nickname uniqueness before claiming the lowest free slot. Names of
    /// kicked or departed occupants are released so they can be reused.
    /// On success the other players are told about the newcomer.
    pub fn login(
        &mut self,
        token: u32,
        version: &str,
        name: &str,
        now: Instant,
    ) -> Result<PlayerId, LoginFailure> {
        let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();

        if version != self.config.version {
            info!(
                "{} tried to join with version {} (server runs {})",
                name, version, self.config.version
            );
            return Err(LoginFailure::WrongVersion);
        }

        if self.player_count as i64 + self.bot_count.max(0) as i64 >= self.max_players as i64 {
            info!("{} could not join, server is full", name);
            return Err(LoginFailure::ServerFull);
        }

        let wanted = name.to_lowercase();
        for player in &mut self.players {
            if player.name.is_empty() || player.name.to_lowercase() != wanted {
                continue;
            }
            if player.kicked || !player.active {
                player.name.clear();
            } else {
                info!("{} could not join, nickname in use", name);
                return Err(LoginFailure::NicknameInUse);
            }
        }

        let Some(index) = self.first_free_slot() else {
            warn!("{} could not join, no free slot left", name);
            return Err(LoginFailure::NoFreeSlot);
        };
        let id = index as PlayerId + 1;

        let team = self.balanced_team(id, false);
        let spot = self.map.find_spot(&mut self.rng);
        let angle = self.rng.gen_range(0.0..360.0);

        let player = &mut self.players[index];
        player.reset(now);
        player.token = ClientToken::Remote(token);
        player.name = name.clone();
        player.active = true;
        player.x = spot.0;
        player.y = spot.1;
        player.angle = angle;
        player.health = MAX_HEALTH;
        player.weapon = Weapon::Pistol;
        player.spawn_time = Some(now);
        player.team = team;
        player.wanted_team = team;

        self.messages.clear(id);
        self.player_count += 1;
        self.broadcast(
            Notice::Joined {
                id,
                name: name.clone(),
                bot: false,
                team,
            },
            Some(id),
        );

        info!("{} logged in as player {} ({:?})", name, id, team);
        Ok(id)
    }

    /// Removes whoever occupies the slot
    ///
    /// Frees the slot, drops the human count if it was a human and tells the
    /// remaining players. Logging out an empty slot does nothing.
    pub fn logout(&mut self, id: PlayerId) {
        let Some(player) = self.player_mut(id) else {
            return;
        };
        if !player.active {
            return;
        }

        let was_human = player.is_human();
        player.active = false;
        player.logged_in = false;
        player.admin = false;
        player.controller = Controller::Human;
        info!("{} logged out", player.name);

        if was_human {
            self.player_count = self.player_count.saturating_sub(1);
        }
        self.messages.clear(id);
        self.broadcast(Notice::Left { id }, Some(id));
    }

    /// Removes a player and remembers why
    ///
    /// The kicked client keeps its token on the slot so its next datagram can
    /// be answered with the reason. `kicker` is `None` for the server itself.
    /// Returns false if the slot was empty.
    pub fn kick(&mut self, id: PlayerId, kicker: Option<PlayerId>, reason: &str) -> bool {
        let Some(player) = self.player_mut(id) else {
            return false;
        };
        if !player.active {
            return false;
        }

        let was_human = player.is_human();
        player.kicked = true;
        player.kicker = kicker;
        player.kick_reason = reason.to_string();
        player.active = false;
        player.logged_in = false;
        player.admin = false;
        info!("{} was kicked: {}", player.name, reason);

        if was_human {
            self.player_count = self.player_count.saturating_sub(1);
        }
        self.messages.clear(id);
        self.broadcast(
            Notice::Kicked {
                kicker,
                target: id,
                reason: reason.to_string(),
            },
            None,
        );
        true
    }

    /// Records a team request
    ///
    /// The change itself happens during the next reconciliation pass of the
    /// simulation. Returns false if the player is not in the game or is
    /// already on that team.
    pub fn change_team(&mut self, id: PlayerId, team: Team) -> bool {
        match self.player_mut(id) {
            Some(player) if player.active && player.team != team => {
                player.wanted_team = team;
                true
            }
            _ => false,
        }
    }

    /// Seats a bot, either in the given slot or in the lowest free one
    ///
    /// Returns the bot's slot, or `None` if the requested slot is taken or
    /// the server has no free slot.
    pub fn add_bot(&mut self, slot: Option<PlayerId>, now: Instant) -> Option<PlayerId> {
        let index = match slot {
            Some(id) => {
                let index = self.slot_index(id)?;
                if index >= self.max_players as usize || self.players[index].active {
                    return None;
                }
                index
            }
            None => self.first_free_slot()?,
        };
        let id = index as PlayerId + 1;
        let team = self.balanced_team(id, true);

        self.seat_bot(index, team, now);

        let player = &self.players[index];
        let notice = Notice::Joined {
            id,
            name: player.name.clone(),
            bot: true,
            team,
        };
        info!(
            "{} joined the game, {} bots active",
            player.name,
            self.active_bot_count()
        );
        self.broadcast(notice, None);
        Some(id)
    }

    /// Reseats the configured number of bots, used at startup and on map change
    ///
    /// Existing bots are reset in place and empty slots are filled until the
    /// bot target is reached. Human slots are never touched. Teams follow
    /// the same balancing as every other newcomer.
    pub fn init_bots(&mut self, now: Instant) {
        let target = self.bot_count.max(0) as usize;
        let mut seated = 0;

        for index in 0..self.max_players as usize {
            if seated >= target {
                break;
            }
            let player = &self.players[index];
            if player.active && player.is_human() {
                continue;
            }

            let (kills, deaths) = (player.kills, player.deaths);
            let keep_score = player.active && self.session.complete;

            let bot_team = self.balanced_team(index as PlayerId + 1, true);
            self.seat_bot(index, bot_team, now);

            if keep_score {
                let bot = &mut self.players[index];
                bot.kills = kills;
                bot.deaths = deaths;
            }
            seated += 1;
        }
    }

    /// Human slot holding exactly this name.
    pub fn find_player(&self, name: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|p| p.active && p.is_human() && p.name == name)
            .map(|p| p.id)
    }

    /// Sends a server announcement to one player, or to everyone
    pub fn server_message(&mut self, text: &str, to: Option<PlayerId>) {
        match to {
            Some(id) => {
                if let Some(player) = self.player(id) {
                    info!("<Server @{}> {}", player.name, text);
                }
                self.notify(id, Notice::ServerMessage(text.to_string()));
            }
            None => {
                info!("<Server> {}", text);
                self.broadcast(Notice::ServerMessage(text.to_string()), None);
            }
        }
    }

    fn first_free_slot(&self) -> Option<usize> {
        self.players
            .iter()
            .take(self.max_players as usize)
            .position(|p| !p.active)
    }

    /// Team for a newcomer: zombie mode splits humans and bots, otherwise the
    /// smaller team wins and ties go to green.
    fn balanced_team(&self, exclude: PlayerId, bot: bool) -> Team {
        if self.game_mode == GameMode::Zombie {
            return if bot { Team::Red } else { Team::Green };
        }

        let (green, red) = self
            .players
            .iter()
            .filter(|p| p.active && p.id != exclude)
            .fold((0, 0), |(green, red), p| match p.team {
                Team::Green => (green + 1, red),
                Team::Red => (green, red + 1),
                Team::Spectator => (green, red),
            });
        if green <= red {
            Team::Green
        } else {
            Team::Red
        }
    }

    fn seat_bot(&mut self, index: usize, team: Team, now: Instant) {
        let id = index as PlayerId + 1;
        let weapon = self.roll_bot_weapon();
        let spot = self.map.find_spot(&mut self.rng);
        let angle = self.rng.gen_range(0.0..360.0);
        let mut agent = self.new_agent();
        agent.set_skill(id);
        let zombie = self.game_mode == GameMode::Zombie;

        let bot = &mut self.players[index];
        bot.reset(now);
        bot.token = ClientToken::Bot(id);
        bot.name = bot_name(id);
        bot.controller = Controller::Agent(agent);
        bot.active = true;
        bot.logged_in = true;
        bot.x = spot.0;
        bot.y = spot.1;
        bot.angle = angle;
        bot.weapon = weapon;
        bot.team = team;
        bot.wanted_team = team;
        if zombie {
            bot.health = ZOMBIE_HEALTH;
            bot.spawn_time = None;
        } else {
            bot.health = MAX_HEALTH;
            bot.spawn_time = Some(now);
        }
        self.messages.clear(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::test_support::*;

    fn active_slots(state: &GameState) -> Vec<PlayerId> {
        state
            .players
            .iter()
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_bots_share_the_newcomer_team_rule() {
        let t = Instant::now();
        let config = ServerConfig {
            game_mode: GameMode::Deathmatch,
            bot_count: 2,
            ..test_config()
        };
        let mut state = state_with(config, t);
        let seated: Vec<Team> = state
            .players
            .iter()
            .filter(|p| p.active)
            .map(|p| p.team)
            .collect();
        assert_eq!(seated, vec![Team::Green, Team::Red]);

        let a = login(&mut state, "alice", t);
        assert_eq!(state.player(a).unwrap().team, Team::Green);
        let bot = state.add_bot(None, t).unwrap();
        assert_eq!(state.player(bot).unwrap().team, Team::Red);
    }

    #[test]
    fn test_login_assigns_lowest_free_slot() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        let b = login(&mut state, "bob", t);
        assert_eq!((a, b), (1, 2));
        assert_eq!(state.player_count, 2);

        state.logout(a);
        let c = login(&mut state, "carol", t);
        assert_eq!(c, 1);
        assert_eq!(state.player(c).unwrap().kills, 0);
    }

    #[test]
    fn test_login_rejects_wrong_version() {
        let t = Instant::now();
        let mut state = state(t);
        assert_eq!(
            state.login(1, "0.1", "alice", t),
            Err(LoginFailure::WrongVersion)
        );
        assert_eq!(state.player_count, 0);
    }

    #[test]
    fn test_login_rejects_when_full() {
        let t = Instant::now();
        let config = ServerConfig {
            max_players: 2,
            ..test_config()
        };
        let mut state = state_with(config, t);
        login(&mut state, "alice", t);
        login(&mut state, "bob", t);
        let version = state.config.version.clone();
        let before = active_slots(&state);
        assert_eq!(
            state.login(9, &version, "carol", t),
            Err(LoginFailure::ServerFull)
        );
        assert_eq!(LoginFailure::ServerFull.code(), Some(MsgType::TooManyPlayers));
        assert_eq!(state.player_count, 2);
        assert_eq!(active_slots(&state), before);
        assert_eq!(state.find_player("carol"), None);
    }

    #[test]
    fn test_bots_count_towards_player_limit() {
        let t = Instant::now();
        let config = ServerConfig {
            max_players: 3,
            bot_count: 2,
            ..test_config()
        };
        let mut state = state_with(config, t);
        login(&mut state, "alice", t);
        let version = state.config.version.clone();
        let before = active_slots(&state);
        assert_eq!(before.len(), 3);
        assert_eq!(
            state.login(9, &version, "bob", t),
            Err(LoginFailure::ServerFull)
        );
        assert_eq!(state.player_count, 1);
        assert_eq!(active_slots(&state), before);
    }

    #[test]
    fn test_bot_target_alone_can_fill_the_server() {
        let t = Instant::now();
        let config = ServerConfig {
            max_players: 2,
            bot_count: 2,
            ..test_config()
        };
        let mut state = state_with(config, t);
        let before = active_slots(&state);
        let version = state.config.version.clone();
        assert_eq!(
            state.login(9, &version, "alice", t),
            Err(LoginFailure::ServerFull)
        );
        assert_eq!(state.player_count, 0);
        assert_eq!(active_slots(&state), before);
    }

    #[test]
    fn test_nickname_rules() {
        let t = Instant::now();
        let mut state = state(t);
        let version = state.config.version.clone();
        let a = login(&mut state, "Alice", t);
        assert_eq!(
            state.login(2, &version, "alice", t),
            Err(LoginFailure::NicknameInUse)
        );

        // A departed player's name is free again
        state.logout(a);
        assert!(state.login(2, &version, "alice", t).is_ok());

        // So is a kicked player's name
        let b = login(&mut state, "bob", t);
        state.kick(b, None, "spam");
        assert!(state.login(3, &version, "bob", t).is_ok());
    }

    #[test]
    fn test_join_is_announced_to_others() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        let b = login(&mut state, "bob", t);
        assert!(state.messages.pending(a).any(|n| matches!(
            n,
            Notice::Joined { id, bot: false, .. } if *id == b
        )));
        assert_eq!(state.messages.len(b), 0);
    }

    #[test]
    fn test_kick_keeps_token_and_reason() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        let b = login(&mut state, "bob", t);
        assert!(state.kick(b, Some(a), "camping"));
        assert!(!state.kick(b, Some(a), "again"));

        let kicked = state.player(b).unwrap();
        assert!(kicked.kicked);
        assert!(!kicked.active);
        assert_eq!(kicked.kick_reason, "camping");
        assert!(matches!(kicked.token, ClientToken::Remote(_)));
        assert_eq!(state.player_count, 1);
        assert!(state
            .messages
            .pending(a)
            .any(|n| matches!(n, Notice::Kicked { target, .. } if *target == b)));
    }

    #[test]
    fn test_kicking_a_bot_keeps_human_count() {
        let t = Instant::now();
        let mut state = state(t);
        login(&mut state, "alice", t);
        let bot = state.add_bot(None, t).unwrap();
        assert!(state.kick(bot, None, "too good"));
        assert_eq!(state.player_count, 1);
    }

    #[test]
    fn test_double_logout_is_harmless() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        state.logout(a);
        state.logout(a);
        assert_eq!(state.player_count, 0);
    }

    #[test]
    fn test_add_bot_in_specific_slot() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        assert_eq!(state.add_bot(Some(a), t), None);
        assert_eq!(state.add_bot(Some(10), t), Some(10));

        let bot = state.player(10).unwrap();
        assert!(bot.is_bot());
        assert!(bot.logged_in);
        assert_eq!(bot.name, bot_name(10));
        assert_eq!(bot.token, ClientToken::Bot(10));
        assert_eq!(state.player_count, 1);
    }

    #[test]
    fn test_zombie_bots_are_weak_red_and_unprotected() {
        let t = Instant::now();
        let config = ServerConfig {
            game_mode: GameMode::Zombie,
            bot_count: 3,
            ..test_config()
        };
        let mut state = state_with(config, t);
        for bot in state.players.iter().filter(|p| p.active) {
            assert_eq!(bot.team, Team::Red);
            assert_eq!(bot.health, ZOMBIE_HEALTH);
            assert_eq!(bot.spawn_time, None);
        }
        let a = login(&mut state, "alice", t);
        assert_eq!(state.player(a).unwrap().team, Team::Green);
    }

    #[test]
    fn test_bot_weapons_come_from_config() {
        let t = Instant::now();
        let config = ServerConfig {
            bot_count: 5,
            bot_weapons: vec![Weapon::Shotgun],
            ..test_config()
        };
        let state = state_with(config, t);
        assert_eq!(state.active_bot_count(), 5);
        assert!(state
            .players
            .iter()
            .filter(|p| p.active)
            .all(|p| p.weapon == Weapon::Shotgun));
    }

    #[test]
    fn test_teams_are_balanced() {
        let t = Instant::now();
        let mut state = state(t);
        let teams: Vec<Team> = ["a1", "b22", "c333", "d4444"]
            .iter()
            .map(|name| {
                let id = login(&mut state, name, t);
                state.player(id).unwrap().team
            })
            .collect();
        assert_eq!(teams, vec![Team::Green, Team::Red, Team::Green, Team::Red]);
    }

    #[test]
    fn test_change_team_requests() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        assert!(!state.change_team(a, Team::Green));
        assert!(state.change_team(a, Team::Red));
        assert_eq!(state.player(a).unwrap().wanted_team, Team::Red);
        assert!(!state.change_team(40, Team::Red));
    }

    #[test]
    fn test_server_message_reaches_only_target() {
        let t = Instant::now();
        let mut state = state(t);
        let a = login(&mut state, "alice", t);
        let b = login(&mut state, "bob", t);
        state.messages.clear(a);
        state.messages.clear(b);

        state.server_message("hello", Some(a));
        assert_eq!(state.messages.len(a), 1);
        assert_eq!(state.messages.len(b), 0);

        state.server_message("everyone", None);
        assert_eq!(state.messages.len(b), 1);
        assert_eq!(state.find_player("bob"), Some(b));
    }
}

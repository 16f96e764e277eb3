//! Inbound datagram handling.
//!
//! Each datagram starts with the sender's connection token. Discovery
//! traffic uses a reserved token and never touches the roster; everything
//! else is either a login request or a batch of tagged messages for one
//! player slot, answered with that player's snapshot.

use crate::game::GameState;
use crate::messages::Notice;
use crate::player::{ClientToken, PlayerId};
use crate::roster::LoginFailure;
use log::{debug, info, warn};
use shared::{
    DecodeError, MsgType, PacketReader, PacketWriter, Team, Weapon, DISCOVERY_PING,
    DISCOVERY_PONG, DISCOVERY_REGISTER, DISCOVERY_TOKEN,
};
use std::time::Instant;

/// Longest chat line relayed to other players.
pub const MAX_CHAT_LEN: usize = 200;

/// What the network layer should do with a handled datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send these bytes back to the sender
    Reply(Vec<u8>),
    /// Hand the payload to the listing service
    Register(Vec<u8>),
    Ignore,
}

/// Answers the discovery sub-protocol. Unknown payloads are dropped.
pub fn discovery(payload: &[u8]) -> Outcome {
    if payload.starts_with(DISCOVERY_PING) {
        let mut out = PacketWriter::with_capacity(8);
        out.put_int(DISCOVERY_TOKEN).put_slice(DISCOVERY_PONG);
        Outcome::Reply(out.into_vec())
    } else if payload.starts_with(DISCOVERY_REGISTER) {
        Outcome::Register(payload.to_vec())
    } else {
        debug!("Unknown discovery payload of {} bytes", payload.len());
        Outcome::Ignore
    }
}

fn single(tag: MsgType) -> Vec<u8> {
    let mut out = PacketWriter::with_capacity(2);
    out.put_tag(tag).put_tag(MsgType::End);
    out.into_vec()
}

impl GameState {
    /// Handles one inbound datagram and returns what to send back.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Outcome {
        let mut reader = PacketReader::new(data);
        let token = match reader.get_int() {
            Ok(token) => token,
            Err(e) => {
                debug!("Dropping datagram: {}", e);
                return Outcome::Ignore;
            }
        };

        if token == DISCOVERY_TOKEN {
            return discovery(reader.rest());
        }

        if self.session.closing {
            return Outcome::Reply(single(MsgType::ServerClosing));
        }

        let Some(tag) = reader.next_tag() else {
            return Outcome::Ignore;
        };
        if tag == MsgType::Login as u8 {
            return self.handle_login(token, &mut reader, now);
        }

        let slot = match reader.get_byte() {
            Ok(slot) => slot,
            Err(e) => {
                debug!("Dropping datagram from {:#010x}: {}", token, e);
                return Outcome::Ignore;
            }
        };
        let slot = match self.checked_slot(slot) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Possible hack attempt from {:#010x}: {}", token, e);
                return Outcome::Ignore;
            }
        };

        if let Some(reply) = self.check_session(token, slot) {
            return Outcome::Reply(reply);
        }

        if tag == MsgType::Logout as u8 {
            self.logout(slot);
            return Outcome::Reply(single(MsgType::Logout));
        }

        if let Some(player) = self.player_mut(slot) {
            player.lag = now.saturating_duration_since(player.last_activity);
            player.last_activity = now;
            player.logged_in = true;
        }

        let mut next = Some(tag);
        while let Some(tag) = next {
            if let Err(e) = self.dispatch(slot, tag, &mut reader, now) {
                debug!("Dropping rest of datagram from player {}: {}", slot, e);
                break;
            }
            next = reader.next_tag();
        }

        // Clients need the full roster while the scoreboard is shown
        if self.session.complete {
            if let Some(player) = self.player_mut(slot) {
                player.send_names = true;
            }
        }

        Outcome::Reply(self.compose_snapshot(slot, now))
    }

    /// Slot ids on the wire must name one of the server's seats.
    fn checked_slot(&self, slot: u8) -> Result<PlayerId, DecodeError> {
        if slot == 0 || slot > self.max_players {
            return Err(DecodeError::InvalidSlot(slot));
        }
        Ok(slot)
    }

    /// Replies for datagrams that do not belong to the slot's occupant.
    /// A kicked client hears why exactly once, afterwards it is a stranger.
    fn check_session(&mut self, token: u32, slot: PlayerId) -> Option<Vec<u8>> {
        let player = self.player_mut(slot)?;
        let remote = ClientToken::Remote(token);

        if player.kicked && player.token == remote {
            let mut out = PacketWriter::new();
            out.put_tag(MsgType::Kicked)
                .put_byte(player.kicker.unwrap_or(0))
                .put_byte(slot)
                .put_string(&player.kick_reason)
                .put_tag(MsgType::End);
            player.token = ClientToken::None;
            return Some(out.into_vec());
        }

        if !player.active || player.token != remote {
            debug!("Datagram from {:#010x} for slot {} it does not own", token, slot);
            return Some(single(MsgType::NoLogin));
        }
        None
    }

    fn handle_login(&mut self, token: u32, reader: &mut PacketReader<'_>, now: Instant) -> Outcome {
        let request = reader
            .get_string()
            .and_then(|version| Ok((version, reader.get_string()?)));
        let (version, name) = match request {
            Ok(request) => request,
            Err(e) => {
                debug!("Malformed login from {:#010x}: {}", token, e);
                return Outcome::Ignore;
            }
        };

        let mut out = PacketWriter::new();
        out.put_tag(MsgType::Login);
        match self.login(token, &version, &name, now) {
            Ok(id) => {
                out.put_tag(MsgType::LoginOk)
                    .put_byte(id)
                    .put_byte(self.game_mode.advertised())
                    .put_string(self.map.name())
                    .put_int(self.map.checksum())
                    .put_string(&self.config.map_download_url);
            }
            Err(failure) => {
                let Some(code) = failure.code() else {
                    return Outcome::Ignore;
                };
                out.put_tag(MsgType::LoginFailed).put_tag(code);
                if failure == LoginFailure::WrongVersion {
                    out.put_string(&self.config.version);
                }
            }
        }
        out.put_tag(MsgType::End);
        Outcome::Reply(out.into_vec())
    }

    /// Applies one tagged message. An error aborts the rest of the datagram.
    fn dispatch(
        &mut self,
        id: PlayerId,
        tag: u8,
        reader: &mut PacketReader<'_>,
        now: Instant,
    ) -> Result<(), DecodeError> {
        match MsgType::from_u8(tag) {
            Some(MsgType::Player) => {
                let x = reader.get_short()?;
                let y = reader.get_short()?;
                let angle = reader.get_ushort()?;
                let weapon = reader.get_byte()?;
                let flags = reader.get_byte()?;
                self.update_position(id, x as f32, y as f32, angle as f32, weapon, flags);
            }
            Some(MsgType::Shoot) => {
                self.fire(id, now);
            }
            Some(MsgType::ChatMsg) => {
                let text = reader.get_string()?;
                self.relay_chat(id, &text);
            }
            Some(MsgType::TeamInfo) => {
                let value = reader.get_byte()?;
                match Team::from_u8(value) {
                    Some(team) => {
                        if self.change_team(id, team) {
                            info!("Player {} asked to join {}", id, team.display_name());
                        }
                    }
                    None => debug!("Player {} asked for unknown team {}", id, value),
                }
            }
            Some(MsgType::MapLoaded) => {
                let name = reader.get_string()?;
                if let Some(player) = self.player_mut(id) {
                    debug!("{} loaded map {}", player.name, name);
                    player.map_name = Some(name);
                }
            }
            Some(MsgType::NamesRequest) => {
                if let Some(player) = self.player_mut(id) {
                    player.send_names = true;
                }
            }
            _ => return Err(DecodeError::UnknownTag(tag)),
        }
        Ok(())
    }

    fn update_position(&mut self, id: PlayerId, x: f32, y: f32, angle: f32, weapon: u8, flags: u8) {
        let inside = self.map.contains(x, y);
        let Some(player) = self.player_mut(id) else {
            return;
        };
        if player.is_dead() || player.team.is_spectator() {
            return;
        }
        if !inside {
            debug!("Rejected position ({}, {}) from {}", x, y, player.name);
            return;
        }

        player.x = x;
        player.y = y;
        player.angle = angle % 360.0;
        if let Some(weapon) = Weapon::from_u8(weapon) {
            player.weapon = weapon;
        }
        player.has_ammo = flags & 1 != 0;
        player.hand_shot = flags & 2 != 0;
    }

    fn relay_chat(&mut self, id: PlayerId, text: &str) {
        let text: String = text.trim().chars().take(MAX_CHAT_LEN).collect();
        if text.is_empty() {
            return;
        }
        if let Some(player) = self.player(id) {
            info!("<{}> {}", player.name, text);
        }
        self.broadcast(Notice::Chat { from: id, text }, Some(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::test_support::*;
    use shared::GameMode;

    fn frame(token: u32) -> PacketWriter {
        let mut out = PacketWriter::new();
        out.put_int(token);
        out
    }

    fn login_request(state: &mut GameState, token: u32, name: &str) -> Vec<u8> {
        let version = state.config.version.clone();
        let mut out = frame(token);
        out.put_tag(MsgType::Login).put_string(&version).put_string(name);
        match state.handle_datagram(&out.into_vec(), Instant::now()) {
            Outcome::Reply(reply) => reply,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn reply(outcome: Outcome) -> Vec<u8> {
        match outcome {
            Outcome::Reply(reply) => reply,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_ping_gets_pong() {
        let mut state = state(Instant::now());
        let mut out = frame(DISCOVERY_TOKEN);
        out.put_slice(DISCOVERY_PING);
        let data = reply(state.handle_datagram(&out.into_vec(), Instant::now()));
        assert_eq!(&data[4..], DISCOVERY_PONG);
        assert_eq!(&data[..4], &DISCOVERY_TOKEN.to_le_bytes());
    }

    #[test]
    fn test_register_packets_go_to_listing() {
        let mut state = state(Instant::now());
        let mut out = frame(DISCOVERY_TOKEN);
        out.put_slice(b"GSS+ok");
        assert_eq!(
            state.handle_datagram(&out.into_vec(), Instant::now()),
            Outcome::Register(b"GSS+ok".to_vec())
        );
    }

    #[test]
    fn test_short_datagram_is_ignored() {
        let mut state = state(Instant::now());
        assert_eq!(state.handle_datagram(&[1, 2], Instant::now()), Outcome::Ignore);
    }

    #[test]
    fn test_login_ok_reply() {
        let mut state = state(Instant::now());
        let data = login_request(&mut state, 77, "alice");

        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.get_byte().unwrap(), MsgType::Login as u8);
        assert_eq!(reader.get_byte().unwrap(), MsgType::LoginOk as u8);
        assert_eq!(reader.get_byte().unwrap(), 1);
        assert_eq!(reader.get_byte().unwrap(), GameMode::TeamDeathmatch as u8);
        assert_eq!(reader.get_string().unwrap(), "alpha");
        assert_eq!(state.player_count, 1);
        assert!(!state.player(1).unwrap().logged_in);
    }

    #[test]
    fn test_wrong_version_reply_carries_server_version() {
        let mut state = state(Instant::now());
        let mut out = frame(5);
        out.put_tag(MsgType::Login).put_string("0.0").put_string("alice");
        let data = reply(state.handle_datagram(&out.into_vec(), Instant::now()));

        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.get_byte().unwrap(), MsgType::Login as u8);
        assert_eq!(reader.get_byte().unwrap(), MsgType::LoginFailed as u8);
        assert_eq!(reader.get_byte().unwrap(), MsgType::WrongVersion as u8);
        assert_eq!(reader.get_string().unwrap(), state.config.version);
    }

    #[test]
    fn test_update_marks_logged_in_and_moves_player() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");

        let mut out = frame(77);
        out.put_tag(MsgType::Player)
            .put_byte(1)
            .put_short(300)
            .put_short(400)
            .put_ushort(90)
            .put_byte(Weapon::Shotgun as u8)
            .put_byte(0b11)
            .put_tag(MsgType::End);
        let data = reply(state.handle_datagram(&out.into_vec(), t));
        assert_eq!(data.last(), Some(&(MsgType::End as u8)));

        let player = state.player(1).unwrap();
        assert!(player.logged_in);
        assert_eq!(player.position(), (300.0, 400.0));
        assert_eq!(player.angle, 90.0);
        assert_eq!(player.weapon, Weapon::Shotgun);
        assert!(player.has_ammo && player.hand_shot);
    }

    #[test]
    fn test_position_outside_map_is_rejected() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        place(&mut state, 1, 100.0, 100.0);

        let mut out = frame(77);
        out.put_tag(MsgType::Player)
            .put_byte(1)
            .put_short(-50)
            .put_short(10)
            .put_ushort(0)
            .put_byte(1)
            .put_byte(0);
        state.handle_datagram(&out.into_vec(), t);
        assert_eq!(state.player(1).unwrap().position(), (100.0, 100.0));
    }

    #[test]
    fn test_wrong_token_gets_nologin() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");

        let mut out = frame(78);
        out.put_tag(MsgType::NamesRequest).put_byte(1);
        let data = reply(state.handle_datagram(&out.into_vec(), t));
        assert_eq!(data, vec![MsgType::NoLogin as u8, MsgType::End as u8]);
    }

    #[test]
    fn test_invalid_slot_is_dropped() {
        let t = Instant::now();
        let mut state = state(t);
        let mut out = frame(78);
        out.put_tag(MsgType::NamesRequest).put_byte(0);
        assert_eq!(state.handle_datagram(&out.into_vec(), t), Outcome::Ignore);

        let mut out = frame(78);
        out.put_tag(MsgType::NamesRequest).put_byte(65);
        assert_eq!(state.handle_datagram(&out.into_vec(), t), Outcome::Ignore);
    }

    #[test]
    fn test_slot_range_follows_max_players() {
        let t = Instant::now();
        let config = crate::config::ServerConfig {
            max_players: 8,
            ..test_config()
        };
        let state = state_with(config, t);
        assert_eq!(state.checked_slot(0), Err(DecodeError::InvalidSlot(0)));
        assert_eq!(state.checked_slot(9), Err(DecodeError::InvalidSlot(9)));
        assert_eq!(state.checked_slot(8), Ok(8));
        assert_eq!(
            DecodeError::InvalidSlot(9).to_string(),
            "player id 9 out of range"
        );
    }

    #[test]
    fn test_kicked_client_is_told_once() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        state.kick(1, None, "afk");

        let request = || {
            let mut out = frame(77);
            out.put_tag(MsgType::NamesRequest).put_byte(1);
            out.into_vec()
        };
        let data = reply(state.handle_datagram(&request(), t));
        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.get_byte().unwrap(), MsgType::Kicked as u8);
        assert_eq!(reader.get_byte().unwrap(), 0);
        assert_eq!(reader.get_byte().unwrap(), 1);
        assert_eq!(reader.get_string().unwrap(), "afk");

        let data = reply(state.handle_datagram(&request(), t));
        assert_eq!(data[0], MsgType::NoLogin as u8);
    }

    #[test]
    fn test_closing_server_answers_everyone() {
        let t = Instant::now();
        let mut state = state(t);
        state.session.closing = true;
        let mut out = frame(1234);
        out.put_tag(MsgType::Login).put_string("x").put_string("y");
        let data = reply(state.handle_datagram(&out.into_vec(), t));
        assert_eq!(data, vec![MsgType::ServerClosing as u8, MsgType::End as u8]);
        assert_eq!(state.player_count, 0);
    }

    #[test]
    fn test_logout_frees_slot() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        let mut out = frame(77);
        out.put_tag(MsgType::Logout).put_byte(1);
        let data = reply(state.handle_datagram(&out.into_vec(), t));
        assert_eq!(data[0], MsgType::Logout as u8);
        assert_eq!(state.player_count, 0);
        assert!(!state.player(1).unwrap().active);
    }

    #[test]
    fn test_unknown_tag_stops_dispatch() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        login_request(&mut state, 88, "bob");
        state.messages.clear(2);

        let mut out = frame(77);
        out.put_tag(MsgType::NamesRequest)
            .put_byte(1)
            .put_byte(200)
            .put_tag(MsgType::ChatMsg)
            .put_string("never relayed");
        state.handle_datagram(&out.into_vec(), t);
        assert!(!state
            .messages
            .pending(2)
            .any(|n| matches!(n, Notice::Chat { .. })));
    }

    #[test]
    fn test_chat_is_relayed_to_others() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        login_request(&mut state, 88, "bob");

        let mut out = frame(77);
        out.put_tag(MsgType::ChatMsg).put_byte(1).put_string("  hello  ");
        state.handle_datagram(&out.into_vec(), t);
        assert!(state.messages.pending(2).any(|n| *n
            == Notice::Chat {
                from: 1,
                text: "hello".into()
            }));
    }

    #[test]
    fn test_team_request_is_deferred() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        let mut out = frame(77);
        out.put_tag(MsgType::TeamInfo).put_byte(1).put_byte(Team::Red as u8);
        state.handle_datagram(&out.into_vec(), t);

        let player = state.player(1).unwrap();
        assert_eq!(player.team, Team::Green);
        assert_eq!(player.wanted_team, Team::Red);
    }

    #[test]
    fn test_map_loaded_is_recorded() {
        let t = Instant::now();
        let mut state = state(t);
        login_request(&mut state, 77, "alice");
        let mut out = frame(77);
        out.put_tag(MsgType::MapLoaded).put_byte(1).put_string("alpha");
        state.handle_datagram(&out.into_vec(), t);
        assert_eq!(state.player(1).unwrap().map_name.as_deref(), Some("alpha"));
    }
}

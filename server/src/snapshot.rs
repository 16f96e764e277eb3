//! Per-player world snapshots.
//!
//! Every authenticated datagram is answered with a snapshot tailored to the
//! sender: full records for players it may see, radar blips for the rest it
//! is allowed to track, its queued notices and the round clock.

use crate::game::{GameState, MAP_ROTATION_DELAY_MS};
use crate::messages::Notice;
use crate::player::{Player, PlayerId};
use shared::{encode_health, radar_angle, MsgType, PacketWriter, PlayerFlags};
use std::time::Instant;

/// Half-extents of the area around a player where others are always visible.
pub const VISIBLE_RANGE_X: f32 = 900.0;
pub const VISIBLE_RANGE_Y: f32 = 700.0;

fn write_player(out: &mut PacketWriter, player: &Player, protected: bool) {
    let flags = PlayerFlags::new(player.weapon, player.has_ammo, player.team, protected);
    out.put_tag(MsgType::Player)
        .put_byte(player.id)
        .put_short(player.x as i32)
        .put_short(player.y as i32)
        .put_ushort(player.angle as u16)
        .put_byte(flags.pack())
        .put_byte(encode_health(player.health))
        .put_short(player.kills)
        .put_short(player.deaths);
}

impl GameState {
    /// Builds the reply for one player. Consumes its queued notices and
    /// clears its pending name refresh.
    pub fn compose_snapshot(&mut self, id: PlayerId, now: Instant) -> Vec<u8> {
        let mut out = PacketWriter::with_capacity(512);
        let Some(me) = self.player(id) else {
            out.put_tag(MsgType::End);
            return out.into_vec();
        };
        let observer = me.position();
        let my_team = me.team;
        let send_names = me.send_names;
        let loaded_map = me.map_name.clone();

        let spectating = my_team.is_spectator();
        let team_mode = self.game_mode.is_team_mode();
        let visible_only = self.config.show_visible_players_only;
        let protection = self.config.spawn_protection();

        for other in &self.players {
            if send_names && other.active {
                out.put_tag(MsgType::PlayerName)
                    .put_byte(other.id)
                    .put_string(&other.name)
                    .put_bool(other.is_bot())
                    .put_byte(other.team as u8);
            }
            if !other.active || other.team.is_spectator() {
                continue;
            }

            let near = (observer.0 - other.x).abs() <= VISIBLE_RANGE_X
                && (observer.1 - other.y).abs() <= VISIBLE_RANGE_Y;
            let candidate = send_names || near || other.is_dead();
            let visible = spectating
                || (candidate
                    && (!visible_only
                        || !self.map.find_wall(observer.0, observer.1, other.x, other.y)));

            if visible {
                write_player(&mut out, other, other.is_protected(now, protection));
            } else if self.config.radar_arrows || (team_mode && my_team == other.team) {
                out.put_tag(MsgType::Radar)
                    .put_byte(radar_angle(observer, other.position()))
                    .put_byte(other.team as u8);
            }
        }

        if self.session.complete
            && self.config.rotates_maps()
            && loaded_map.as_deref() != Some(self.map.name())
            && self
                .time_left_ms(now)
                .is_some_and(|left| left <= -MAP_ROTATION_DELAY_MS)
        {
            out.put_tag(MsgType::MapChange)
                .put_string(self.map.name())
                .put_int(self.map.checksum());
        }

        self.messages.flush(id, &mut out);

        if send_names {
            let items: Vec<Notice> = self
                .items
                .values()
                .map(|item| Notice::Item {
                    id: item.id,
                    kind: item.kind,
                    x: item.x,
                    y: item.y,
                })
                .collect();
            for item in items {
                self.messages.push(id, item);
            }
        }

        let elapsed = now.saturating_duration_since(self.session.started);
        out.put_tag(MsgType::SessionTime)
            .put_int(self.config.round_length_secs.max(0) as u32)
            .put_int(elapsed.as_secs() as u32)
            .put_bool(self.session.complete);

        if let Some(me) = self.player_mut(id) {
            me.send_names = false;
            me.debug_state = false;
        }

        out.put_tag(MsgType::End);
        out.into_vec()
    }
}

/// Decoded view of a snapshot, used by tests and the probe client.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub players: Vec<(PlayerId, i16, i16)>,
    pub names: Vec<(PlayerId, String)>,
    pub radar: usize,
    pub notices: Vec<u8>,
    pub map_change: Option<String>,
    pub session: Option<(u32, u32, bool)>,
}

impl SnapshotSummary {
    /// Walks a snapshot message by message, failing on an unknown tag.
    pub fn parse(data: &[u8]) -> Result<Self, shared::DecodeError> {
        let mut reader = shared::PacketReader::new(data);
        let mut summary = SnapshotSummary::default();

        while let Some(tag) = reader.next_tag() {
            match MsgType::from_u8(tag) {
                Some(MsgType::Player) => {
                    let id = reader.get_byte()?;
                    let x = reader.get_short()?;
                    let y = reader.get_short()?;
                    reader.get_ushort()?;
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_short()?;
                    reader.get_short()?;
                    summary.players.push((id, x, y));
                }
                Some(MsgType::PlayerName) => {
                    let id = reader.get_byte()?;
                    let name = reader.get_string()?;
                    reader.get_byte()?;
                    reader.get_byte()?;
                    summary.names.push((id, name));
                }
                Some(MsgType::Radar) => {
                    reader.get_byte()?;
                    reader.get_byte()?;
                    summary.radar += 1;
                }
                Some(MsgType::MapChange) => {
                    let name = reader.get_string()?;
                    reader.get_int()?;
                    summary.map_change = Some(name);
                }
                Some(MsgType::SessionTime) => {
                    let length = reader.get_int()?;
                    let elapsed = reader.get_int()?;
                    let complete = reader.get_byte()? != 0;
                    summary.session = Some((length, elapsed, complete));
                }
                Some(MsgType::Login) => {
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_string()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::Logout) => {
                    reader.get_byte()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::Kicked) => {
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_string()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::TeamInfo) => {
                    reader.get_byte()?;
                    reader.get_byte()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::NewBullet) => {
                    reader.get_int()?;
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_short()?;
                    reader.get_short()?;
                    reader.get_ushort()?;
                    reader.get_byte()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::BulletHit) => {
                    reader.get_int()?;
                    reader.get_byte()?;
                    reader.get_short()?;
                    reader.get_short()?;
                    reader.get_byte()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::KillMsg) => {
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_byte()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::ServerMsg) => {
                    reader.get_string()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::ChatMsg) => {
                    reader.get_byte()?;
                    reader.get_string()?;
                    summary.notices.push(tag);
                }
                Some(MsgType::Item) => {
                    reader.get_byte()?;
                    reader.get_byte()?;
                    reader.get_short()?;
                    reader.get_short()?;
                    summary.notices.push(tag);
                }
                _ => return Err(shared::DecodeError::UnknownTag(tag)),
            }
        }
        Ok(summary)
    }

    pub fn has_player(&self, id: PlayerId) -> bool {
        self.players.iter().any(|(pid, _, _)| *pid == id)
    }
}

//! Per-player notification queues.
//!
//! Events such as joins, kills and chat are queued for each recipient and
//! flushed into that player's next reply. Clients poll constantly, so a queue
//! only grows for a client that stopped talking; such queues are capped.

use crate::player::PlayerId;
use shared::{MsgType, PacketWriter, Team, Weapon, MAX_PLAYERS};
use std::collections::VecDeque;

const MAX_QUEUED: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Joined {
        id: PlayerId,
        name: String,
        bot: bool,
        team: Team,
    },
    Left {
        id: PlayerId,
    },
    Kicked {
        kicker: Option<PlayerId>,
        target: PlayerId,
        reason: String,
    },
    TeamChanged {
        id: PlayerId,
        team: Team,
    },
    NewBullet {
        bullet_id: u32,
        shooter: PlayerId,
        weapon: Weapon,
        x: f32,
        y: f32,
        angle: f32,
        play_sound: bool,
        hand: bool,
    },
    BulletHit {
        bullet_id: u32,
        /// `None` when the bullet hit a wall
        target: Option<PlayerId>,
        x: f32,
        y: f32,
        weapon: Weapon,
    },
    Kill {
        killer: PlayerId,
        victim: PlayerId,
        weapon: Weapon,
    },
    ServerMessage(String),
    Chat {
        from: PlayerId,
        text: String,
    },
    Item {
        id: u8,
        kind: u8,
        x: f32,
        y: f32,
    },
}

impl Notice {
    pub fn encode(&self, out: &mut PacketWriter) {
        match self {
            Notice::Joined { id, name, bot, team } => {
                out.put_tag(MsgType::Login)
                    .put_byte(*id)
                    .put_bool(*bot)
                    .put_byte(*team as u8)
                    .put_string(name);
            }
            Notice::Left { id } => {
                out.put_tag(MsgType::Logout).put_byte(*id);
            }
            Notice::Kicked {
                kicker,
                target,
                reason,
            } => {
                out.put_tag(MsgType::Kicked)
                    .put_byte(kicker.unwrap_or(0))
                    .put_byte(*target)
                    .put_string(reason);
            }
            Notice::TeamChanged { id, team } => {
                out.put_tag(MsgType::TeamInfo)
                    .put_byte(*id)
                    .put_byte(*team as u8);
            }
            Notice::NewBullet {
                bullet_id,
                shooter,
                weapon,
                x,
                y,
                angle,
                play_sound,
                hand,
            } => {
                out.put_tag(MsgType::NewBullet)
                    .put_int(*bullet_id)
                    .put_byte(*shooter)
                    .put_byte(*weapon as u8)
                    .put_short(*x as i32)
                    .put_short(*y as i32)
                    .put_ushort(*angle as u16)
                    .put_byte(*play_sound as u8 | ((*hand as u8) << 1));
            }
            Notice::BulletHit {
                bullet_id,
                target,
                x,
                y,
                weapon,
            } => {
                out.put_tag(MsgType::BulletHit)
                    .put_int(*bullet_id)
                    .put_byte(target.unwrap_or(0))
                    .put_short(*x as i32)
                    .put_short(*y as i32)
                    .put_byte(*weapon as u8);
            }
            Notice::Kill {
                killer,
                victim,
                weapon,
            } => {
                out.put_tag(MsgType::KillMsg)
                    .put_byte(*killer)
                    .put_byte(*victim)
                    .put_byte(*weapon as u8);
            }
            Notice::ServerMessage(text) => {
                out.put_tag(MsgType::ServerMsg).put_string(text);
            }
            Notice::Chat { from, text } => {
                out.put_tag(MsgType::ChatMsg).put_byte(*from).put_string(text);
            }
            Notice::Item { id, kind, x, y } => {
                out.put_tag(MsgType::Item)
                    .put_byte(*id)
                    .put_byte(*kind)
                    .put_short(*x as i32)
                    .put_short(*y as i32);
            }
        }
    }
}

#[derive(Debug)]
pub struct MessageQueue {
    queues: Vec<VecDeque<Notice>>,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self {
            queues: (0..MAX_PLAYERS).map(|_| VecDeque::new()).collect(),
        }
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, id: PlayerId) -> Option<&mut VecDeque<Notice>> {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.queues.get_mut(index))
    }

    pub fn push(&mut self, id: PlayerId, notice: Notice) {
        if let Some(queue) = self.queue_mut(id) {
            if queue.len() >= MAX_QUEUED {
                queue.pop_front();
            }
            queue.push_back(notice);
        }
    }

    /// Writes and removes every notice queued for the player.
    pub fn flush(&mut self, id: PlayerId, out: &mut PacketWriter) {
        if let Some(queue) = self.queue_mut(id) {
            for notice in queue.drain(..) {
                notice.encode(out);
            }
        }
    }

    pub fn clear(&mut self, id: PlayerId) {
        if let Some(queue) = self.queue_mut(id) {
            queue.clear();
        }
    }

    pub fn pending(&self, id: PlayerId) -> impl Iterator<Item = &Notice> {
        (id as usize)
            .checked_sub(1)
            .and_then(|i| self.queues.get(i))
            .into_iter()
            .flatten()
    }

    pub fn len(&self, id: PlayerId) -> usize {
        (id as usize)
            .checked_sub(1)
            .and_then(|i| self.queues.get(i))
            .map_or(0, VecDeque::len)
    }
}

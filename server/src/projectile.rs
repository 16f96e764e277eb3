//! Projectile spawning, flight and damage.

use crate::config::WeaponStats;
use crate::game::GameState;
use crate::messages::Notice;
use crate::player::PlayerId;
use crate::utils::{distance, heading, normalize_angle, segment_distance};
use log::{debug, error, info};
use rand::Rng;
use shared::Weapon;
use std::time::Instant;

/// Radius around a player's position that counts as a hit.
pub const PLAYER_RADIUS: f32 = 16.0;

/// Refinement steps used to locate a wall impact along a segment.
const IMPACT_SEARCH_STEPS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub id: u32,
    pub owner: PlayerId,
    pub weapon: Weapon,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    /// Second launcher grenade, flies with the spread mirrored
    pub mirrored: bool,
    /// Distance covered so far
    pub traveled: f32,
}

enum Impact {
    Player(PlayerId),
    Wall(f32, f32),
}

impl GameState {
    /// Fires the player's current weapon
    ///
    /// Does nothing while the round is over, for dead players and spectators,
    /// or before the weapon has reloaded. Returns the ids of the spawned
    /// projectiles; projectiles that would start inside a wall are skipped.
    pub fn fire(&mut self, id: PlayerId, now: Instant) -> Vec<u32> {
        let mut spawned = Vec::new();
        if self.session.complete {
            return spawned;
        }
        let Some(index) = self.slot_index(id) else {
            error!("Fire requested for invalid player {}", id);
            return spawned;
        };

        let shooter = &self.players[index];
        if !shooter.active || shooter.is_dead() || shooter.team.is_spectator() {
            return spawned;
        }
        let weapon = shooter.weapon;
        let hand = shooter.hand_shot;
        let stats = self.config.weapon(weapon);
        if let Some(last) = shooter.last_shot {
            if now.saturating_duration_since(last) < stats.reload() {
                return spawned;
            }
        }
        self.players[index].last_shot = Some(now);

        for shot in 0..weapon.projectile_count() {
            let mirrored = weapon == Weapon::Launcher && shot == 1;
            let bullet_id = self.next_bullet_id();
            let Some(bullet) = self.spawn_bullet(index, bullet_id, mirrored, &stats) else {
                debug!("Projectile of player {} blocked at the muzzle", id);
                continue;
            };

            self.last_bullet_id = bullet_id;
            self.broadcast(
                Notice::NewBullet {
                    bullet_id,
                    shooter: id,
                    weapon,
                    x: bullet.x,
                    y: bullet.y,
                    angle: bullet.angle,
                    play_sound: spawned.is_empty(),
                    hand,
                },
                None,
            );
            self.bullets.insert(bullet_id, bullet);
            spawned.push(bullet_id);
        }
        spawned
    }

    /// Next unused projectile id; the counter only moves once a projectile
    /// is actually spawned.
    fn next_bullet_id(&self) -> u32 {
        let mut id = self.last_bullet_id.wrapping_add(1);
        while id == 0 || self.bullets.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        id
    }

    fn spawn_bullet(
        &mut self,
        index: usize,
        id: u32,
        mirrored: bool,
        stats: &WeaponStats,
    ) -> Option<Bullet> {
        let shooter = &self.players[index];
        let (owner, weapon, px, py, facing) =
            (shooter.id, shooter.weapon, shooter.x, shooter.y, shooter.angle);

        let offset = match weapon {
            Weapon::Launcher if mirrored => -stats.spread,
            Weapon::Launcher => stats.spread,
            _ if stats.spread > 0.0 => self.rng.gen_range(-stats.spread..=stats.spread),
            _ => 0.0,
        };
        let angle = normalize_angle(facing + offset);
        let (dx, dy) = heading(angle);
        let (x, y) = (px + dx * stats.muzzle_offset, py + dy * stats.muzzle_offset);

        if !self.map.contains(x, y) || self.map.find_wall(px, py, x, y) {
            return None;
        }

        Some(Bullet {
            id,
            owner,
            weapon,
            x,
            y,
            angle,
            mirrored,
            traveled: 0.0,
        })
    }

    /// Moves every live projectile one frame and resolves what it hits.
    pub fn advance_bullets(&mut self, now: Instant) {
        let ids: Vec<u32> = self.bullets.keys().copied().collect();
        for id in ids {
            let Some(mut bullet) = self.bullets.remove(&id) else {
                continue;
            };
            if !self.advance_bullet(&mut bullet, now) {
                self.bullets.insert(id, bullet);
            }
        }
    }

    /// Returns true once the projectile is done.
    fn advance_bullet(&mut self, bullet: &mut Bullet, now: Instant) -> bool {
        let stats = self.config.weapon(bullet.weapon);
        let step = stats.speed * self.frame_time;
        if step <= 0.0 {
            return false;
        }

        let (dx, dy) = heading(bullet.angle);
        let from = (bullet.x, bullet.y);
        let to = (bullet.x + dx * step, bullet.y + dy * step);

        match self.find_impact(bullet, from, to) {
            Some(Impact::Player(target)) => {
                self.hit_player(bullet, target, &stats, now);
                true
            }
            Some(Impact::Wall(x, y)) => {
                self.broadcast(
                    Notice::BulletHit {
                        bullet_id: bullet.id,
                        target: None,
                        x,
                        y,
                        weapon: bullet.weapon,
                    },
                    None,
                );
                true
            }
            None => {
                bullet.x = to.0;
                bullet.y = to.1;
                bullet.traveled += step;
                bullet.traveled >= stats.range
            }
        }
    }

    fn find_impact(&self, bullet: &Bullet, from: (f32, f32), to: (f32, f32)) -> Option<Impact> {
        let team_mode = self.game_mode.is_team_mode();
        let owner_team = self.player(bullet.owner).map(|p| p.team);

        let victim = self
            .players
            .iter()
            .filter(|p| p.active && !p.is_dead() && !p.team.is_spectator())
            .filter(|p| p.id != bullet.owner)
            .filter(|p| !(team_mode && Some(p.team) == owner_team))
            .filter(|p| segment_distance(from, to, p.position()) < PLAYER_RADIUS)
            .filter(|p| !self.map.find_wall(from.0, from.1, p.x, p.y))
            .min_by(|a, b| {
                distance(from, a.position()).total_cmp(&distance(from, b.position()))
            });
        if let Some(victim) = victim {
            return Some(Impact::Player(victim.id));
        }

        if self.map.find_wall(from.0, from.1, to.0, to.1) {
            return Some(self.wall_impact(from, to));
        }
        None
    }

    /// Last open point before the wall on the segment.
    fn wall_impact(&self, from: (f32, f32), to: (f32, f32)) -> Impact {
        let (mut open, mut blocked) = (0.0f32, 1.0f32);
        for _ in 0..IMPACT_SEARCH_STEPS {
            let mid = (open + blocked) / 2.0;
            let point = (from.0 + (to.0 - from.0) * mid, from.1 + (to.1 - from.1) * mid);
            if self.map.find_wall(from.0, from.1, point.0, point.1) {
                blocked = mid;
            } else {
                open = mid;
            }
        }
        Impact::Wall(
            from.0 + (to.0 - from.0) * open,
            from.1 + (to.1 - from.1) * open,
        )
    }

    fn hit_player(&mut self, bullet: &Bullet, target: PlayerId, stats: &WeaponStats, now: Instant) {
        let protection = self.config.spawn_protection();
        let Some(victim) = self.player_mut(target) else {
            return;
        };
        let (x, y) = victim.position();
        let killed = if victim.is_protected(now, protection) {
            false
        } else {
            victim.take_damage(stats.damage, now)
        };

        self.broadcast(
            Notice::BulletHit {
                bullet_id: bullet.id,
                target: Some(target),
                x,
                y,
                weapon: bullet.weapon,
            },
            None,
        );

        if killed {
            let killer_name = match self.player_mut(bullet.owner) {
                Some(killer) if killer.active => {
                    killer.kills += 1;
                    killer.name.clone()
                }
                _ => String::from("?"),
            };
            if let Some(victim) = self.player(target) {
                info!("{} killed {} with {:?}", killer_name, victim.name, bullet.weapon);
            }
            self.broadcast(
                Notice::Kill {
                    killer: bullet.owner,
                    victim: target,
                    weapon: bullet.weapon,
                },
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::test_support::*;
    use shared::{GameMode, Team};
    use std::time::Duration;

    fn duel(mode: GameMode) -> (GameState, PlayerId, PlayerId, Instant) {
        let t = Instant::now();
        let config = ServerConfig {
            game_mode: mode,
            spawn_protection_ms: 0,
            ..test_config()
        };
        let mut state = state_with(config, t);
        let a = login(&mut state, "alice", t);
        let b = login(&mut state, "bob", t);
        place(&mut state, a, 200.0, 200.0);
        place(&mut state, b, 400.0, 200.0);
        state.player_mut(a).unwrap().angle = 0.0;
        (state, a, b, t)
    }

    #[test]
    fn test_shotgun_spawns_six_distinct_ids() {
        let (mut state, a, _, t) = duel(GameMode::Deathmatch);
        state.player_mut(a).unwrap().weapon = Weapon::Shotgun;
        let ids = state.fire(a, t);
        assert_eq!(ids.len(), 6);
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 6);
        assert_eq!(state.bullets.len(), 6);

        let sounds = state
            .messages
            .pending(a)
            .filter(|n| matches!(n, Notice::NewBullet { play_sound: true, .. }))
            .count();
        assert_eq!(sounds, 1);
    }

    #[test]
    fn test_launcher_spread_is_mirrored() {
        let (mut state, a, _, t) = duel(GameMode::Deathmatch);
        state.player_mut(a).unwrap().weapon = Weapon::Launcher;
        let ids = state.fire(a, t);
        assert_eq!(ids.len(), 2);
        let first = &state.bullets[&ids[0]];
        let second = &state.bullets[&ids[1]];
        assert!(second.mirrored);
        let spread = state.config.weapon(Weapon::Launcher).spread;
        assert!((first.angle - spread).abs() < 1e-3);
        assert!((second.angle - (360.0 - spread)).abs() < 1e-3);
    }

    #[test]
    fn test_reload_time_is_respected() {
        let (mut state, a, _, t) = duel(GameMode::Deathmatch);
        assert_eq!(state.fire(a, t).len(), 1);
        assert!(state.fire(a, t + Duration::from_millis(100)).is_empty());
        assert_eq!(state.fire(a, t + Duration::from_millis(250)).len(), 1);
    }

    #[test]
    fn test_no_fire_when_round_over_dead_or_spectating() {
        let (mut state, a, b, t) = duel(GameMode::Deathmatch);
        state.session.complete = true;
        assert!(state.fire(a, t).is_empty());
        state.session.complete = false;

        state.player_mut(a).unwrap().kill(t);
        assert!(state.fire(a, t).is_empty());

        state.player_mut(b).unwrap().team = Team::Spectator;
        assert!(state.fire(b, t).is_empty());
        assert!(state.bullets.is_empty());
    }

    #[test]
    fn test_blocked_spawn_rolls_back_id() {
        let (mut state, a, _, t) = duel(GameMode::Deathmatch);
        // Right next to the left border, facing it
        place(&mut state, a, 40.0, 200.0);
        state.player_mut(a).unwrap().angle = 180.0;
        assert!(state.fire(a, t).is_empty());
        assert_eq!(state.last_bullet_id, 0);

        state.player_mut(a).unwrap().angle = 0.0;
        assert_eq!(state.fire(a, t + Duration::from_secs(1)), vec![1]);
    }

    #[test]
    fn test_ids_skip_live_bullets() {
        let (mut state, a, _, t) = duel(GameMode::Deathmatch);
        state.last_bullet_id = u32::MAX;
        let first = state.fire(a, t);
        assert_eq!(first, vec![1]);

        state.last_bullet_id = 0;
        let second = state.fire(a, t + Duration::from_secs(1));
        assert_eq!(second, vec![2]);
    }

    #[test]
    fn test_bullet_damages_and_kills() {
        let (mut state, a, b, t) = duel(GameMode::Deathmatch);
        let damage = state.config.weapon(Weapon::Pistol).damage;
        state.player_mut(b).unwrap().health = damage;
        state.fire(a, t);

        state.frame_time = 0.1;
        state.advance_bullets(t);
        state.advance_bullets(t);
        assert!(state.bullets.is_empty());

        let victim = state.player(b).unwrap();
        assert!(victim.is_dead());
        assert_eq!(victim.deaths, 1);
        assert_eq!(state.player(a).unwrap().kills, 1);
        assert!(state
            .messages
            .pending(a)
            .any(|n| *n == Notice::Kill { killer: a, victim: b, weapon: Weapon::Pistol }));
    }

    #[test]
    fn test_spawn_protection_blocks_damage() {
        let (mut state, a, b, t) = duel(GameMode::Deathmatch);
        state.config.spawn_protection_ms = 5_000;
        state.player_mut(b).unwrap().spawn_time = Some(t);
        state.fire(a, t);
        state.frame_time = 0.1;
        state.advance_bullets(t);
        state.advance_bullets(t);

        assert!(state.bullets.is_empty());
        assert_eq!(state.player(b).unwrap().health, 100);
        assert!(state
            .messages
            .pending(a)
            .any(|n| matches!(n, Notice::BulletHit { target: Some(id), .. } if *id == b)));
    }

    #[test]
    fn test_teammates_are_not_hit() {
        let (mut state, a, b, t) = duel(GameMode::TeamDeathmatch);
        let team = state.player(a).unwrap().team;
        state.player_mut(b).unwrap().team = team;
        state.player_mut(b).unwrap().wanted_team = team;
        state.fire(a, t);
        state.frame_time = 0.1;
        state.advance_bullets(t);
        state.advance_bullets(t);
        assert_eq!(state.player(b).unwrap().health, 100);
    }

    #[test]
    fn test_wall_hit_is_reported_without_target() {
        let (mut state, a, _, t) = duel(GameMode::Deathmatch);
        // 100 tiles of 32px, the right border starts at 3168
        place(&mut state, a, 3000.0, 200.0);
        state.fire(a, t);
        state.frame_time = 0.5;
        state.advance_bullets(t);
        assert!(state.bullets.is_empty());
        assert!(state
            .messages
            .pending(a)
            .any(|n| matches!(n, Notice::BulletHit { target: None, .. })));
    }

    #[test]
    fn test_bullet_expires_after_range() {
        use crate::map::{MemoryMapProvider, TileMap};

        let t = Instant::now();
        let mut state = GameState::new(
            test_config(),
            Box::new(MemoryMapProvider::new().with_map(TileMap::arena("alpha", 200, 10, 32.0))),
            t,
        )
        .unwrap();
        let a = login(&mut state, "alice", t);
        place(&mut state, a, 64.0, 160.0);
        state.player_mut(a).unwrap().weapon = Weapon::Chainsaw;
        state.player_mut(a).unwrap().angle = 0.0;
        state.fire(a, t);

        state.frame_time = 0.05;
        state.advance_bullets(t);
        state.advance_bullets(t);
        assert!(state.bullets.is_empty());
        assert!(!state
            .messages
            .pending(a)
            .any(|n| matches!(n, Notice::BulletHit { .. })));
    }
}

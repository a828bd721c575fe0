//! Entity model: players, bullets and bombs.
//!
//! Ids are unique within their kind for the lifetime of a match. Bullet and
//! bomb ids are minted by the owning client as `(owner, sequence)` and adopted
//! verbatim by the server, so predicted and confirmed projectiles share one id
//! space.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{math::Vec3, weapon::WeaponKind};

/// Maximum (and spawn) health.
pub const MAX_HEALTH: i32 = 100;

/// Server-assigned player id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Bullet id: owner plus the owner's local shot counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BulletId {
    pub owner: PlayerId,
    pub seq: u32,
}

/// Bomb id: owner plus the owner's local plant counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BombId {
    pub owner: PlayerId,
    pub seq: u32,
}

/// Entity kind, as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Bullet,
    Bomb,
}

/// Kind-tagged id of any entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Player(PlayerId),
    Bullet(BulletId),
    Bomb(BombId),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Player(_) => EntityKind::Player,
            EntityKey::Bullet(_) => EntityKind::Bullet,
            EntityKey::Bomb(_) => EntityKind::Bomb,
        }
    }
}

/// Player state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    /// 0..=100.
    pub health: i32,
    pub alive: bool,
    pub weapon: WeaponKind,
    pub kills: u32,
    pub deaths: u32,
}

impl Player {
    pub fn new(id: PlayerId, position: Vec3) -> Self {
        Self {
            id,
            name: String::new(),
            position,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
            health: MAX_HEALTH,
            alive: true,
            weapon: WeaponKind::default(),
            kills: 0,
            deaths: 0,
        }
    }

    /// Applies damage and reports whether the hit took the player to zero.
    ///
    /// Liveness follows health, but kill/death counters are left alone: those
    /// only move on an authoritative death notice.
    pub fn apply_damage(&mut self, damage: i32) -> bool {
        self.health = (self.health - damage.max(0)).clamp(0, MAX_HEALTH);
        if self.health == 0 {
            self.alive = false;
        }
        self.health == 0
    }

    /// Copies the authoritative pose and vitals from a snapshot while
    /// keeping locally-held counters.
    pub fn adopt_snapshot(&mut self, snap: &Player) {
        self.position = snap.position;
        self.velocity = snap.velocity;
        self.yaw = snap.yaw;
        self.pitch = snap.pitch;
        self.on_ground = snap.on_ground;
        self.health = snap.health;
        self.alive = snap.alive;
        self.weapon = snap.weapon;
        if !snap.name.is_empty() {
            self.name.clone_from(&snap.name);
        }
    }

    /// Eye height above the feet position.
    pub const EYE_HEIGHT: f32 = 1.6;
    /// Radius of the hit sphere. The sphere rests on the feet and reaches
    /// just above eye level.
    pub const HIT_RADIUS: f32 = 0.9;

    pub fn eye_position(&self) -> Vec3 {
        self.position + Vec3::new(0.0, Self::EYE_HEIGHT, 0.0)
    }

    pub fn hit_centre(&self) -> Vec3 {
        self.position + Vec3::new(0.0, Self::HIT_RADIUS, 0.0)
    }
}

/// Bullet state. Position is derived from the launch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub id: BulletId,
    pub owner: PlayerId,
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    /// Server-clock spawn time, milliseconds.
    pub spawn_time_ms: u64,
    pub weapon: WeaponKind,
}

impl Bullet {
    /// Position at `now_ms` for a bullet travelling at `speed` m/s.
    pub fn position_at(&self, now_ms: u64, speed: f32) -> Vec3 {
        let elapsed = now_ms.saturating_sub(self.spawn_time_ms) as f32 / 1000.0;
        self.origin + self.direction * (speed * elapsed)
    }
}

/// Bomb state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bomb {
    pub id: BombId,
    pub position: Vec3,
    pub planted_by: PlayerId,
    /// Server-clock arm time; `None` while only locally predicted.
    pub armed_at_ms: Option<u64>,
    pub fuse_ms: u64,
    pub detonated: bool,
}

impl Bomb {
    /// Server time at which the bomb goes off, once armed.
    pub fn detonates_at_ms(&self) -> Option<u64> {
        self.armed_at_ms.map(|t| t + self.fuse_ms)
    }

    /// Remaining fuse relative to an estimate of the server clock.
    pub fn remaining_fuse_ms(&self, server_now_ms: u64) -> Option<u64> {
        self.detonates_at_ms().map(|t| t.saturating_sub(server_now_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_marks_dead_without_touching_counters() {
        let mut p = Player::new(PlayerId(1), Vec3::ZERO);
        assert!(!p.apply_damage(60));
        assert!(p.alive);
        assert!(p.apply_damage(60));
        assert_eq!(p.health, 0);
        assert!(!p.alive);
        assert_eq!((p.kills, p.deaths), (0, 0));
    }

    #[test]
    fn bullet_travels_along_direction() {
        let b = Bullet {
            id: BulletId {
                owner: PlayerId(1),
                seq: 1,
            },
            owner: PlayerId(1),
            origin: Vec3::ZERO,
            direction: Vec3::new(0.0, 0.0, 1.0),
            spawn_time_ms: 1_000,
            weapon: WeaponKind::Pistol,
        };
        assert_eq!(b.position_at(1_500, 100.0), Vec3::new(0.0, 0.0, 50.0));
        assert_eq!(b.position_at(500, 100.0), Vec3::ZERO);
    }

    #[test]
    fn unarmed_bomb_has_no_countdown() {
        let mut bomb = Bomb {
            id: BombId {
                owner: PlayerId(2),
                seq: 1,
            },
            position: Vec3::ZERO,
            planted_by: PlayerId(2),
            armed_at_ms: None,
            fuse_ms: 40_000,
            detonated: false,
        };
        assert_eq!(bomb.remaining_fuse_ms(0), None);
        bomb.armed_at_ms = Some(10_000);
        assert_eq!(bomb.remaining_fuse_ms(30_000), Some(20_000));
        assert_eq!(bomb.remaining_fuse_ms(60_000), Some(0));
    }
}

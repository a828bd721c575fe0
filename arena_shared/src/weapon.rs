//! Weapon kinds and their tuning.
//!
//! Client and server read the same table so a predicted bullet flies exactly
//! like its authoritative counterpart.

use serde::{Deserialize, Serialize};

/// Equippable weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    /// Light sidearm.
    #[default]
    Pistol,
    /// Fast-firing automatic.
    Rifle,
    /// Slow, hard-hitting long range.
    Sniper,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 3] = [WeaponKind::Pistol, WeaponKind::Rifle, WeaponKind::Sniper];
}

/// Per-weapon tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponStats {
    /// Damage per confirmed hit (health points).
    pub damage: i32,
    /// Bullet speed in metres per second.
    pub bullet_speed: f32,
    /// Minimum time between shots, milliseconds.
    pub cooldown_ms: u64,
    /// Bullet lifetime, milliseconds.
    pub lifetime_ms: u64,
    /// Rounds per magazine.
    pub magazine: u32,
    /// Reload duration, milliseconds.
    pub reload_ms: u64,
}

/// Stats for every weapon kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponTable {
    pub pistol: WeaponStats,
    pub rifle: WeaponStats,
    pub sniper: WeaponStats,
}

impl Default for WeaponTable {
    fn default() -> Self {
        Self {
            pistol: WeaponStats {
                damage: 20,
                bullet_speed: 120.0,
                cooldown_ms: 300,
                lifetime_ms: 1_500,
                magazine: 12,
                reload_ms: 1_200,
            },
            rifle: WeaponStats {
                damage: 12,
                bullet_speed: 180.0,
                cooldown_ms: 100,
                lifetime_ms: 1_500,
                magazine: 30,
                reload_ms: 2_000,
            },
            sniper: WeaponStats {
                damage: 80,
                bullet_speed: 400.0,
                cooldown_ms: 1_200,
                lifetime_ms: 2_000,
                magazine: 5,
                reload_ms: 3_000,
            },
        }
    }
}

impl WeaponTable {
    pub fn stats(&self, kind: WeaponKind) -> &WeaponStats {
        match kind {
            WeaponKind::Pistol => &self.pistol,
            WeaponKind::Rifle => &self.rifle,
            WeaponKind::Sniper => &self.sniper,
        }
    }

    pub fn stats_mut(&mut self, kind: WeaponKind) -> &mut WeaponStats {
        match kind {
            WeaponKind::Pistol => &mut self.pistol,
            WeaponKind::Rifle => &mut self.rifle,
            WeaponKind::Sniper => &mut self.sniper,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_weapon_has_positive_tuning() {
        let table = WeaponTable::default();
        for kind in WeaponKind::ALL {
            let s = table.stats(kind);
            assert!(s.damage > 0, "{kind:?} damage");
            assert!(s.bullet_speed > 0.0, "{kind:?} speed");
            assert!(s.magazine > 0, "{kind:?} magazine");
            assert!(s.lifetime_ms > 0, "{kind:?} lifetime");
        }
    }
}

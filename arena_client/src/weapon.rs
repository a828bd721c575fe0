//! Weapon fire and hit resolution.
//!
//! Local shots are predicted: the bullet appears and the `fired` effect plays
//! the moment the trigger is pulled. Damage is never predicted; it lands only
//! when the server says so. Bombs follow the same pattern with a server arm
//! timestamp driving the fuse.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

use arena_shared::{
    config::{BombConfig, SyncConfig},
    effects::{Effect, EffectSink},
    entity::{Bomb, BombId, Bullet, BulletId, Player, PlayerId},
    error::SyncError,
    math::Vec3,
    net::{FireEvent, NetMsg},
    store::EntityStore,
    weapon::{WeaponKind, WeaponTable},
};
use tracing::{debug, info, warn};

/// Remembered retired bullet ids, for spotting late confirmations.
const RETIRED_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponPhase {
    Ready,
    /// A shot left the barrel this instant.
    Firing,
    Cooldown,
    Reloading,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    ammo: u32,
    last_shot: Option<Duration>,
    reload_until: Option<Duration>,
}

pub struct WeaponPipeline {
    weapons: WeaponTable,
    bomb: BombConfig,
    confirm_timeout_ms: u64,
    slots: BTreeMap<WeaponKind, Slot>,
    next_bullet_seq: u32,
    next_bomb_seq: u32,
    /// Predicted bullets awaiting the server echo, with their deadline in
    /// server time.
    unconfirmed: BTreeMap<BulletId, u64>,
    unconfirmed_bombs: BTreeMap<BombId, u64>,
    retired: VecDeque<BulletId>,
    detonated: HashSet<BombId>,
}

impl WeaponPipeline {
    pub fn new(cfg: &SyncConfig) -> Self {
        let mut pipeline = Self {
            weapons: cfg.weapons,
            bomb: cfg.bomb,
            confirm_timeout_ms: cfg.fire_confirm_timeout_ms,
            slots: BTreeMap::new(),
            next_bullet_seq: 1,
            next_bomb_seq: 1,
            unconfirmed: BTreeMap::new(),
            unconfirmed_bombs: BTreeMap::new(),
            retired: VecDeque::with_capacity(RETIRED_HISTORY),
            detonated: HashSet::new(),
        };
        pipeline.refill_slots();
        pipeline
    }

    fn refill_slots(&mut self) {
        self.slots = WeaponKind::ALL
            .iter()
            .map(|&kind| {
                let slot = Slot {
                    ammo: self.weapons.stats(kind).magazine,
                    last_shot: None,
                    reload_until: None,
                };
                (kind, slot)
            })
            .collect();
    }

    fn slot_mut(&mut self, kind: WeaponKind) -> &mut Slot {
        let magazine = self.weapons.stats(kind).magazine;
        self.slots.entry(kind).or_insert(Slot {
            ammo: magazine,
            last_shot: None,
            reload_until: None,
        })
    }

    /// Finishes reloads whose time is up.
    pub fn update(&mut self, now: Duration) {
        for (kind, slot) in self.slots.iter_mut() {
            if slot.reload_until.is_some_and(|t| t <= now) {
                slot.reload_until = None;
                slot.ammo = self.weapons.stats(*kind).magazine;
                debug!(weapon = ?kind, "reload complete");
            }
        }
    }

    pub fn phase(&self, kind: WeaponKind, now: Duration) -> WeaponPhase {
        let Some(slot) = self.slots.get(&kind) else {
            return WeaponPhase::Ready;
        };
        if slot.reload_until.is_some_and(|t| t > now) {
            return WeaponPhase::Reloading;
        }
        match slot.last_shot {
            Some(t) if t == now => WeaponPhase::Firing,
            Some(t) if now.saturating_sub(t) < self.cooldown(kind) => WeaponPhase::Cooldown,
            _ => WeaponPhase::Ready,
        }
    }

    fn cooldown(&self, kind: WeaponKind) -> Duration {
        Duration::from_millis(self.weapons.stats(kind).cooldown_ms)
    }

    pub fn ammo(&self, kind: WeaponKind) -> u32 {
        self.slots.get(&kind).map_or(0, |s| s.ammo)
    }

    pub fn weapons(&self) -> &WeaponTable {
        &self.weapons
    }

    /// Fires the local player's weapon if the slot allows it.
    ///
    /// On success the predicted bullet is in the store and the returned event
    /// must be sent to the server. On rejection nothing changes.
    pub fn try_fire(
        &mut self,
        store: &mut EntityStore,
        now: Duration,
        server_now_ms: u64,
        effects: &mut dyn EffectSink,
    ) -> Option<FireEvent> {
        self.update(now);
        let (player_id, kind, origin, direction) = {
            let p = store.local_player()?;
            if !p.alive {
                return None;
            }
            (p.id, p.weapon, p.eye_position(), Vec3::from_yaw_pitch(p.yaw, p.pitch))
        };

        match self.phase(kind, now) {
            WeaponPhase::Ready => {}
            phase => {
                debug!(weapon = ?kind, ?phase, "fire rejected");
                return None;
            }
        }
        if self.ammo(kind) == 0 {
            self.start_reload(store, now, effects);
            return None;
        }

        let bullet_id = BulletId {
            owner: player_id,
            seq: self.next_bullet_seq,
        };
        self.next_bullet_seq += 1;
        store.upsert(Bullet {
            id: bullet_id,
            owner: player_id,
            origin,
            direction,
            spawn_time_ms: server_now_ms,
            weapon: kind,
        });
        self.unconfirmed
            .insert(bullet_id, server_now_ms + self.confirm_timeout_ms);

        let slot = self.slot_mut(kind);
        slot.ammo -= 1;
        slot.last_shot = Some(now);
        let empty = slot.ammo == 0;

        effects.play(Effect::Fired {
            by: player_id,
            at: origin,
        });
        if empty {
            self.start_reload(store, now, effects);
        }

        Some(FireEvent {
            player_id,
            bullet_id,
            origin,
            direction,
            weapon: kind,
            fired_at_ms: server_now_ms,
        })
    }

    /// Starts reloading the local player's weapon. Returns `false` if a
    /// reload is already running or the magazine is full.
    pub fn start_reload(
        &mut self,
        store: &EntityStore,
        now: Duration,
        effects: &mut dyn EffectSink,
    ) -> bool {
        let Some(player) = store.local_player().filter(|p| p.alive) else {
            return false;
        };
        let (by, kind) = (player.id, player.weapon);
        let stats = *self.weapons.stats(kind);
        let slot = self.slot_mut(kind);
        if slot.reload_until.is_some_and(|t| t > now) || slot.ammo >= stats.magazine {
            return false;
        }
        slot.reload_until = Some(now + Duration::from_millis(stats.reload_ms));
        effects.play(Effect::Reload { by });
        true
    }

    /// Applies a server `FireEvent` broadcast.
    ///
    /// For the local player this is the confirmation of a predicted shot and
    /// the bullet takes the server's launch parameters. For anyone else it
    /// spawns the bullet.
    pub fn on_fire_event(
        &mut self,
        store: &mut EntityStore,
        event: &FireEvent,
        server_now_ms: u64,
        effects: &mut dyn EffectSink,
    ) {
        let lifetime = self.weapons.stats(event.weapon).lifetime_ms;
        let bullet = Bullet {
            id: event.bullet_id,
            owner: event.player_id,
            origin: event.origin,
            direction: event.direction.normalize_or_zero(),
            spawn_time_ms: event.fired_at_ms,
            weapon: event.weapon,
        };
        let local = store.local_player_id() == Some(event.player_id);
        if local {
            if self.unconfirmed.remove(&event.bullet_id).is_some() {
                store.upsert(bullet);
            } else {
                debug!(bullet = ?event.bullet_id, "echo for a bullet no longer tracked");
            }
            return;
        }
        if event.fired_at_ms + lifetime <= server_now_ms {
            debug!(bullet = ?event.bullet_id, "fire event arrived after bullet lifetime");
            return;
        }
        if store.upsert(bullet) {
            effects.play(Effect::Fired {
                by: event.player_id,
                at: event.origin,
            });
        }
    }

    /// Applies a server hit.
    ///
    /// Server truth is always applied. A hit for a bullet this client had
    /// already retired is reported as an authority conflict afterwards.
    pub fn on_hit_confirm(
        &mut self,
        store: &mut EntityStore,
        bullet_id: BulletId,
        target_id: PlayerId,
        damage: i32,
        effects: &mut dyn EffectSink,
    ) -> Result<(), SyncError> {
        self.unconfirmed.remove(&bullet_id);
        let was_live = store.remove::<Bullet>(bullet_id).is_some();
        let was_retired = !was_live && self.retired.contains(&bullet_id);
        if was_live {
            self.retire(bullet_id);
        }

        self.damage(store, target_id, damage, effects);

        if was_retired {
            return Err(SyncError::AuthorityConflict(format!(
                "hit confirmed for retired bullet {}:{}",
                bullet_id.owner, bullet_id.seq
            )));
        }
        Ok(())
    }

    /// Applies area damage from a detonation.
    pub fn on_blast_damage(
        &mut self,
        store: &mut EntityStore,
        bomb_id: BombId,
        target_id: PlayerId,
        damage: i32,
        effects: &mut dyn EffectSink,
    ) {
        debug!(bomb = ?bomb_id, target = %target_id, damage, "blast damage");
        self.damage(store, target_id, damage, effects);
    }

    fn damage(
        &mut self,
        store: &mut EntityStore,
        target_id: PlayerId,
        damage: i32,
        effects: &mut dyn EffectSink,
    ) {
        match store.get_mut::<Player>(target_id) {
            Some(target) => {
                let dropped = target.apply_damage(damage);
                effects.play(Effect::Hit {
                    target: target_id,
                    damage,
                });
                if dropped {
                    debug!(target = %target_id, "health reached zero");
                }
            }
            None => debug!(target = %target_id, "damage for unknown player"),
        }
    }

    /// Applies an authoritative death. This is the only place kill and death
    /// counters move.
    pub fn on_player_death(
        &mut self,
        store: &mut EntityStore,
        victim: PlayerId,
        killer: PlayerId,
        effects: &mut dyn EffectSink,
    ) {
        if let Some(p) = store.get_mut::<Player>(victim) {
            p.health = 0;
            p.alive = false;
            p.deaths += 1;
        }
        if killer != victim {
            if let Some(k) = store.get_mut::<Player>(killer) {
                k.kills += 1;
            }
        }
        info!(victim = %victim, killer = %killer, "player died");
        effects.play(Effect::Death { victim });
    }

    /// Drops bullets past their lifetime and predictions the server never
    /// confirmed. Neither deals damage.
    pub fn expire(&mut self, store: &mut EntityStore, server_now_ms: u64) {
        let timed_out: Vec<BulletId> = self
            .unconfirmed
            .iter()
            .filter(|(_, &deadline)| deadline <= server_now_ms)
            .map(|(&id, _)| id)
            .collect();
        for id in timed_out {
            self.unconfirmed.remove(&id);
            store.remove::<Bullet>(id);
            debug!(bullet = ?id, "predicted bullet unconfirmed; dropped");
            self.retire(id);
        }

        let weapons = &self.weapons;
        let mut spent = Vec::new();
        store.retain::<Bullet>(|b| {
            let alive = b.spawn_time_ms + weapons.stats(b.weapon).lifetime_ms > server_now_ms;
            if !alive {
                spent.push(b.id);
            }
            alive
        });
        for id in spent {
            self.unconfirmed.remove(&id);
            self.retire(id);
        }

        let stale_bombs: Vec<BombId> = self
            .unconfirmed_bombs
            .iter()
            .filter(|(_, &deadline)| deadline <= server_now_ms)
            .map(|(&id, _)| id)
            .collect();
        for id in stale_bombs {
            self.unconfirmed_bombs.remove(&id);
            store.remove::<Bomb>(id);
            debug!(bomb = ?id, "plant unconfirmed; dropped");
        }
    }

    fn retire(&mut self, id: BulletId) {
        if self.retired.len() == RETIRED_HISTORY {
            self.retired.pop_front();
        }
        self.retired.push_back(id);
    }

    pub fn is_unconfirmed(&self, id: BulletId) -> bool {
        self.unconfirmed.contains_key(&id)
    }

    pub fn is_unconfirmed_bomb(&self, id: BombId) -> bool {
        self.unconfirmed_bombs.contains_key(&id)
    }

    /// Places an unarmed local bomb and returns the plant request.
    pub fn try_plant(&mut self, store: &mut EntityStore, server_now_ms: u64) -> Option<NetMsg> {
        let player = store.local_player().filter(|p| p.alive)?;
        let (planted_by, position) = (player.id, player.position);
        let bomb_id = BombId {
            owner: planted_by,
            seq: self.next_bomb_seq,
        };
        self.next_bomb_seq += 1;
        store.upsert(Bomb {
            id: bomb_id,
            position,
            planted_by,
            armed_at_ms: None,
            fuse_ms: self.bomb.fuse_ms,
            detonated: false,
        });
        self.unconfirmed_bombs
            .insert(bomb_id, server_now_ms + self.confirm_timeout_ms);
        info!(bomb = ?bomb_id, "bomb planted locally");
        Some(NetMsg::BombPlant {
            bomb_id,
            planted_by,
            position,
            armed_at_ms: 0,
            fuse_ms: self.bomb.fuse_ms,
        })
    }

    /// Applies the server's confirmed placement.
    pub fn on_bomb_plant(
        &mut self,
        store: &mut EntityStore,
        bomb_id: BombId,
        planted_by: PlayerId,
        position: Vec3,
        armed_at_ms: u64,
        fuse_ms: u64,
    ) {
        if self.detonated.contains(&bomb_id) {
            debug!(bomb = ?bomb_id, "plant for a bomb that already went off");
            return;
        }
        self.unconfirmed_bombs.remove(&bomb_id);
        store.upsert(Bomb {
            id: bomb_id,
            position,
            planted_by,
            armed_at_ms: Some(armed_at_ms),
            fuse_ms,
            detonated: false,
        });
        info!(bomb = ?bomb_id, armed_at_ms, fuse_ms, "bomb armed");
    }

    /// Applies a detonation. Returns `false` for a repeat.
    pub fn on_bomb_detonate(
        &mut self,
        store: &mut EntityStore,
        bomb_id: BombId,
        position: Vec3,
        effects: &mut dyn EffectSink,
    ) -> bool {
        if !self.detonated.insert(bomb_id) {
            debug!(bomb = ?bomb_id, "duplicate detonation ignored");
            return false;
        }
        self.unconfirmed_bombs.remove(&bomb_id);
        store.remove::<Bomb>(bomb_id);
        effects.play(Effect::Explosion { at: position });
        info!(bomb = ?bomb_id, "bomb detonated");
        true
    }

    pub fn on_bomb_defuse(&mut self, store: &mut EntityStore, bomb_id: BombId, by: PlayerId) {
        self.unconfirmed_bombs.remove(&bomb_id);
        if store.remove::<Bomb>(bomb_id).is_some() {
            info!(bomb = ?bomb_id, by = %by, "bomb defused");
        }
    }

    /// Requests a defuse of the nearest armed bomb within reach.
    pub fn try_defuse(&self, store: &EntityStore) -> Option<NetMsg> {
        let player = store.local_player().filter(|p| p.alive)?;
        let reach = self.bomb.defuse_reach;
        let (bomb_id, _) = store
            .iter::<Bomb>()
            .filter(|b| b.armed_at_ms.is_some() && !b.detonated)
            .map(|b| (b.id, b.position.distance(player.position)))
            .filter(|&(_, d)| d <= reach)
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        Some(NetMsg::BombDefuse {
            bomb_id,
            defused_by: player.id,
        })
    }

    pub fn is_detonated(&self, id: BombId) -> bool {
        self.detonated.contains(&id)
    }

    /// Forgets predictions and refills magazines. Detonation history is kept
    /// so a replayed detonation after a reconnect stays silent.
    pub fn reset(&mut self) {
        if !self.unconfirmed.is_empty() {
            warn!(
                pending = self.unconfirmed.len(),
                "discarding unconfirmed shots"
            );
        }
        self.unconfirmed.clear();
        self.unconfirmed_bombs.clear();
        self.retired.clear();
        self.refill_slots();
    }
}

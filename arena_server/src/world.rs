//! Authoritative world simulation.
//!
//! Sans-IO: the socket layer hands in messages from identified players and
//! drains [`Outgoing`] messages after each step. Server time is derived from
//! the tick counter alone, so a run is reproducible from its inputs and seed.
//!
//! Determinism notes:
//! - Simulation runs in a fixed timestep.
//! - Players, bullets and bombs are walked in id order.
//! - The only randomness is spawn-point selection from a seeded generator.

use std::collections::{BTreeMap, VecDeque};

use arena_shared::{
    config::SyncConfig,
    entity::{Bomb, BombId, Bullet, BulletId, Player, PlayerId, MAX_HEALTH},
    input::SequencedInput,
    math::{segment_point_distance, Vec3},
    net::{EntityState, FireEvent, NetMsg, StateSnapshot},
    physics::{DefaultMotion, MotionModel, MotionState},
    store::EntityStore,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info, warn};

/// Claimed muzzle positions further than this from the shooter's eye are
/// replaced by the eye position, metres.
const MUZZLE_TOLERANCE: f32 = 2.0;

/// A message produced by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    To(PlayerId, NetMsg),
    Broadcast(NetMsg),
}

/// Per-player connection bookkeeping.
#[derive(Debug, Default)]
struct Seat {
    pending: VecDeque<SequencedInput>,
    last_queued: Option<u32>,
    last_processed: Option<u32>,
    last_bullet_seq: u32,
    last_shot_ms: Option<u64>,
    respawn_at_ms: Option<u64>,
}

pub struct ServerWorld {
    cfg: SyncConfig,
    store: EntityStore,
    motion: Box<dyn MotionModel>,
    seats: BTreeMap<PlayerId, Seat>,
    next_player_id: u32,
    tick: u32,
    rng: StdRng,
    outbox: Vec<Outgoing>,
}

impl ServerWorld {
    pub fn new(cfg: SyncConfig) -> Self {
        Self {
            store: EntityStore::default(),
            motion: Box::new(DefaultMotion::new(cfg.physics)),
            seats: BTreeMap::new(),
            next_player_id: 1,
            tick: 0,
            rng: StdRng::seed_from_u64(cfg.seed),
            outbox: Vec::new(),
            cfg,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Direct access for scenario setup and console commands.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Server clock, milliseconds since the match started.
    pub fn server_time_ms(&self) -> u64 {
        self.time_at(self.tick)
    }

    fn time_at(&self, tick: u32) -> u64 {
        u64::from(tick) * 1000 / u64::from(self.cfg.tick_hz.max(1))
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.seats.keys().copied().collect()
    }

    /// Last input sequence simulated for `id`.
    pub fn last_processed(&self, id: PlayerId) -> Option<u32> {
        self.seats.get(&id).and_then(|s| s.last_processed)
    }

    /// Messages produced since the last drain, in order.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    fn spawn_point(&mut self) -> Vec3 {
        let r = self.cfg.physics.arena_half_extent * 0.5;
        Vec3::new(self.rng.gen_range(-r..=r), 0.0, self.rng.gen_range(-r..=r))
    }

    /// Admits a player and queues their join acknowledgement.
    pub fn join(&mut self, name: &str) -> PlayerId {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        let mut player = Player::new(id, self.spawn_point());
        player.name = name.to_string();
        info!(player_id = %id, name, position = ?player.position, "player joined");
        self.store.upsert(player);
        self.seats.insert(id, Seat::default());

        self.outbox.push(Outgoing::To(
            id,
            NetMsg::JoinAck {
                player_id: id,
                server_time_ms: self.server_time_ms(),
                tick_hz: self.cfg.tick_hz,
            },
        ));
        id
    }

    /// Removes a player and tells everyone else.
    pub fn leave(&mut self, id: PlayerId) {
        if self.seats.remove(&id).is_none() {
            return;
        }
        self.store.remove::<Player>(id);
        info!(player_id = %id, "player left");
        self.outbox
            .push(Outgoing::Broadcast(NetMsg::Leave { player_id: id }));
    }

    /// Applies one message from a connected player.
    pub fn handle(&mut self, from: PlayerId, msg: NetMsg) {
        if !self.seats.contains_key(&from) {
            debug!(player_id = %from, kind = msg.kind(), "message from unknown player");
            return;
        }
        match msg {
            NetMsg::InputUpdate { player_id, inputs } if player_id == from => {
                self.queue_inputs(from, inputs);
            }
            NetMsg::FireEvent(event) if event.player_id == from => self.on_fire(from, event),
            NetMsg::BombPlant {
                bomb_id,
                planted_by,
                ..
            } if planted_by == from => self.on_plant(from, bomb_id),
            NetMsg::BombDefuse {
                bomb_id,
                defused_by,
            } if defused_by == from => self.on_defuse(from, bomb_id),
            NetMsg::Leave { player_id } if player_id == from => self.leave(from),
            other => {
                warn!(player_id = %from, kind = other.kind(), "unexpected message dropped");
            }
        }
    }

    fn queue_inputs(&mut self, from: PlayerId, inputs: Vec<SequencedInput>) {
        // Two seconds of input is far beyond any sane backlog.
        let cap = self.cfg.tick_hz.max(1) as usize * 2;
        let Some(seat) = self.seats.get_mut(&from) else {
            return;
        };
        for input in inputs {
            if seat.last_queued.is_some_and(|last| input.sequence <= last) {
                continue;
            }
            seat.last_queued = Some(input.sequence);
            seat.pending.push_back(input);
        }
        while seat.pending.len() > cap {
            // Dropped samples are still acknowledged so the client's replay
            // buffer keeps moving.
            if let Some(dropped) = seat.pending.pop_front() {
                seat.last_processed = Some(dropped.sequence);
            }
        }
    }

    fn alive(&self, id: PlayerId) -> Option<&Player> {
        self.store.get::<Player>(id).filter(|p| p.alive)
    }

    fn on_fire(&mut self, from: PlayerId, event: FireEvent) {
        let now = self.server_time_ms();
        let Some(shooter) = self.alive(from) else {
            debug!(player_id = %from, "dead players cannot fire");
            return;
        };
        let eye = shooter.eye_position();
        let weapon = shooter.weapon;
        let Some(seat) = self.seats.get(&from) else {
            return;
        };

        if event.bullet_id.owner != from || event.bullet_id.seq <= seat.last_bullet_seq {
            warn!(player_id = %from, bullet = ?event.bullet_id, "bullet id rejected");
            return;
        }
        if event.weapon != weapon {
            warn!(player_id = %from, claimed = ?event.weapon, equipped = ?weapon, "weapon mismatch");
            return;
        }
        // Half the cooldown absorbs delivery jitter between shots.
        let min_gap = self.cfg.weapons.stats(weapon).cooldown_ms / 2;
        if seat
            .last_shot_ms
            .is_some_and(|t| now.saturating_sub(t) < min_gap)
        {
            debug!(player_id = %from, "fire faster than cooldown rejected");
            return;
        }
        let direction = event.direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return;
        }
        let origin = if event.origin.distance(eye) <= MUZZLE_TOLERANCE {
            event.origin
        } else {
            eye
        };

        if let Some(seat) = self.seats.get_mut(&from) {
            seat.last_bullet_seq = event.bullet_id.seq;
            seat.last_shot_ms = Some(now);
        }
        let bullet = Bullet {
            id: event.bullet_id,
            owner: from,
            origin,
            direction,
            spawn_time_ms: now,
            weapon,
        };
        self.store.upsert(bullet);
        self.outbox
            .push(Outgoing::Broadcast(NetMsg::FireEvent(FireEvent {
                player_id: from,
                bullet_id: event.bullet_id,
                origin,
                direction,
                weapon,
                fired_at_ms: now,
            })));
    }

    fn on_plant(&mut self, from: PlayerId, bomb_id: BombId) {
        let Some(player) = self.alive(from) else {
            return;
        };
        if bomb_id.owner != from || self.store.contains::<Bomb>(bomb_id) {
            warn!(player_id = %from, bomb = ?bomb_id, "plant rejected");
            return;
        }
        let position = player.position;
        let armed_at_ms = self.server_time_ms();
        let fuse_ms = self.cfg.bomb.fuse_ms;
        self.store.upsert(Bomb {
            id: bomb_id,
            position,
            planted_by: from,
            armed_at_ms: Some(armed_at_ms),
            fuse_ms,
            detonated: false,
        });
        info!(player_id = %from, bomb = ?bomb_id, armed_at_ms, "bomb armed");
        self.outbox.push(Outgoing::Broadcast(NetMsg::BombPlant {
            bomb_id,
            planted_by: from,
            position,
            armed_at_ms,
            fuse_ms,
        }));
    }

    fn on_defuse(&mut self, from: PlayerId, bomb_id: BombId) {
        let Some(player) = self.alive(from) else {
            return;
        };
        let reach = self.cfg.bomb.defuse_reach;
        let in_reach = self
            .store
            .get::<Bomb>(bomb_id)
            .is_some_and(|b| !b.detonated && b.position.distance(player.position) <= reach);
        if !in_reach {
            debug!(player_id = %from, bomb = ?bomb_id, "defuse out of reach");
            return;
        }
        self.store.remove::<Bomb>(bomb_id);
        info!(player_id = %from, bomb = ?bomb_id, "bomb defused");
        self.outbox.push(Outgoing::Broadcast(NetMsg::BombDefuse {
            bomb_id,
            defused_by: from,
        }));
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) {
        let prev_ms = self.server_time_ms();
        self.tick += 1;
        let now = self.server_time_ms();

        self.simulate_players();
        self.advance_bullets(prev_ms, now);
        self.detonate_bombs(now);
        self.respawn(now);

        let every = self.cfg.snapshot_every_ticks.max(1);
        if self.tick % every == 0 {
            self.queue_snapshots(now);
        }
    }

    fn simulate_players(&mut self) {
        let dt = self.cfg.tick_dt();
        for (id, seat) in self.seats.iter_mut() {
            let Some(player) = self.store.get_mut::<Player>(*id) else {
                continue;
            };
            while let Some(input) = seat.pending.pop_front() {
                if player.alive {
                    let next = self.motion.step(&MotionState::of(player), &input.sample, dt);
                    next.write_to(player);
                }
                seat.last_processed = Some(input.sequence);
            }
        }
    }

    fn advance_bullets(&mut self, prev_ms: u64, now: u64) {
        let weapons = self.cfg.weapons;
        let mut hits = Vec::new();
        let mut spent = Vec::new();

        for bullet in self.store.iter::<Bullet>() {
            let stats = weapons.stats(bullet.weapon);
            let expires_ms = bullet.spawn_time_ms + stats.lifetime_ms;
            let end_ms = now.min(expires_ms);
            let from = bullet.position_at(prev_ms.max(bullet.spawn_time_ms), stats.bullet_speed);
            let to = bullet.position_at(end_ms, stats.bullet_speed);

            let target = self
                .store
                .iter::<Player>()
                .filter(|p| p.alive && p.id != bullet.owner)
                .filter(|p| segment_point_distance(from, to, p.hit_centre()) <= Player::HIT_RADIUS)
                .min_by(|a, b| {
                    from.distance(a.hit_centre())
                        .total_cmp(&from.distance(b.hit_centre()))
                })
                .map(|p| p.id);

            match target {
                Some(target) => hits.push((bullet.id, bullet.owner, target, stats.damage)),
                None if end_ms == expires_ms => spent.push(bullet.id),
                None => {}
            }
        }

        for id in spent {
            self.store.remove::<Bullet>(id);
        }
        for (bullet_id, owner, target, damage) in hits {
            self.store.remove::<Bullet>(bullet_id);
            self.outbox.push(Outgoing::Broadcast(NetMsg::HitConfirm {
                bullet_id,
                target_id: target,
                damage,
            }));
            self.damage(target, owner, damage, now);
        }
    }

    fn detonate_bombs(&mut self, now: u64) {
        let due: Vec<BombId> = self
            .store
            .iter::<Bomb>()
            .filter(|b| !b.detonated && b.detonates_at_ms().is_some_and(|t| t <= now))
            .map(|b| b.id)
            .collect();

        let blast = self.cfg.bomb;
        for bomb_id in due {
            let Some(bomb) = self.store.remove::<Bomb>(bomb_id) else {
                continue;
            };
            info!(bomb = ?bomb_id, "bomb detonated");
            self.outbox.push(Outgoing::Broadcast(NetMsg::BombDetonate {
                bomb_id,
                position: bomb.position,
                detonated_at_ms: now,
            }));

            let victims: Vec<(PlayerId, i32)> = self
                .store
                .iter::<Player>()
                .filter(|p| p.alive)
                .filter_map(|p| {
                    let d = p.hit_centre().distance(bomb.position);
                    if d > blast.blast_radius {
                        return None;
                    }
                    let falloff = 1.0 - d / blast.blast_radius.max(f32::EPSILON);
                    let damage = (blast.blast_damage as f32 * falloff).round() as i32;
                    (damage > 0).then_some((p.id, damage))
                })
                .collect();
            for (target_id, damage) in victims {
                self.outbox.push(Outgoing::Broadcast(NetMsg::BlastDamage {
                    bomb_id,
                    target_id,
                    damage,
                }));
                self.damage(target_id, bomb.planted_by, damage, now);
            }
        }
    }

    fn damage(&mut self, target: PlayerId, attacker: PlayerId, damage: i32, now: u64) {
        let Some(player) = self.store.get_mut::<Player>(target) else {
            return;
        };
        if !player.alive || !player.apply_damage(damage) {
            return;
        }
        player.deaths += 1;
        if attacker != target {
            if let Some(killer) = self.store.get_mut::<Player>(attacker) {
                killer.kills += 1;
            }
        }
        if let Some(seat) = self.seats.get_mut(&target) {
            seat.respawn_at_ms = Some(now + self.cfg.respawn_delay_ms);
        }
        info!(victim = %target, killer = %attacker, "player killed");
        self.outbox.push(Outgoing::Broadcast(NetMsg::PlayerDeath {
            player_id: target,
            killer_id: attacker,
        }));
    }

    fn respawn(&mut self, now: u64) {
        let due: Vec<PlayerId> = self
            .seats
            .iter()
            .filter(|(_, s)| s.respawn_at_ms.is_some_and(|t| t <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            let spawn = self.spawn_point();
            if let Some(seat) = self.seats.get_mut(&id) {
                seat.respawn_at_ms = None;
            }
            if let Some(p) = self.store.get_mut::<Player>(id) {
                p.position = spawn;
                p.velocity = Vec3::ZERO;
                p.on_ground = true;
                p.health = MAX_HEALTH;
                p.alive = true;
                info!(player_id = %id, position = ?spawn, "player respawned");
            }
        }
    }

    /// Full state, with each player's own acknowledgement.
    fn queue_snapshots(&mut self, now: u64) {
        let entities: Vec<EntityState> = self
            .store
            .iter::<Player>()
            .cloned()
            .map(EntityState::Player)
            .chain(self.store.iter::<Bomb>().cloned().map(EntityState::Bomb))
            .collect();
        for (id, seat) in &self.seats {
            self.outbox.push(Outgoing::To(
                *id,
                NetMsg::StateSnapshot(StateSnapshot {
                    tick: self.tick,
                    server_time_ms: now,
                    ack_sequence: seat.last_processed,
                    full: true,
                    entities: entities.clone(),
                }),
            ));
        }
    }

    /// Whether a bullet is still in flight.
    pub fn has_bullet(&self, id: BulletId) -> bool {
        self.store.contains::<Bullet>(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{input::InputSample, weapon::WeaponKind};

    fn world() -> ServerWorld {
        let mut cfg = SyncConfig::default();
        cfg.bomb.fuse_ms = 200;
        cfg.respawn_delay_ms = 100;
        ServerWorld::new(cfg)
    }

    fn place(w: &mut ServerWorld, id: PlayerId, at: Vec3) {
        let p = w.store_mut().get_mut::<Player>(id).unwrap();
        p.position = at;
        p.yaw = 0.0;
        p.pitch = 0.0;
    }

    fn shot(from: PlayerId, seq: u32, w: &ServerWorld) -> NetMsg {
        let p = w.store().get::<Player>(from).unwrap();
        NetMsg::FireEvent(FireEvent {
            player_id: from,
            bullet_id: BulletId { owner: from, seq },
            origin: p.eye_position(),
            direction: Vec3::new(0.0, 0.0, 1.0),
            weapon: WeaponKind::Pistol,
            fired_at_ms: 0,
        })
    }

    fn broadcasts(out: &[Outgoing]) -> Vec<&NetMsg> {
        out.iter()
            .filter_map(|o| match o {
                Outgoing::Broadcast(m) => Some(m),
                Outgoing::To(..) => None,
            })
            .collect()
    }

    #[test]
    fn join_assigns_ids_and_acks() {
        let mut w = world();
        let a = w.join("ana");
        let b = w.join("bo");
        assert_eq!((a, b), (PlayerId(1), PlayerId(2)));
        let out = w.drain_outgoing();
        assert!(matches!(
            &out[0],
            Outgoing::To(id, NetMsg::JoinAck { player_id, .. }) if *id == a && *player_id == a
        ));
        assert_eq!(w.store().get::<Player>(b).unwrap().name, "bo");
    }

    #[test]
    fn same_seed_same_spawns() {
        let mut a = world();
        let mut b = world();
        for _ in 0..3 {
            let (ia, ib) = (a.join("x"), b.join("x"));
            assert_eq!(
                a.store().get::<Player>(ia).unwrap().position,
                b.store().get::<Player>(ib).unwrap().position
            );
        }
    }

    #[test]
    fn inputs_are_simulated_and_acknowledged() {
        let mut w = world();
        let id = w.join("ana");
        place(&mut w, id, Vec3::ZERO);
        let walk = |sequence| SequencedInput {
            sequence,
            sample: InputSample {
                forward: 1.0,
                ..Default::default()
            },
        };
        w.handle(
            id,
            NetMsg::InputUpdate {
                player_id: id,
                inputs: vec![walk(1), walk(2), walk(3)],
            },
        );
        // Duplicates from a resend are ignored.
        w.handle(
            id,
            NetMsg::InputUpdate {
                player_id: id,
                inputs: vec![walk(2), walk(3)],
            },
        );
        w.drain_outgoing();
        w.step();
        w.step();
        assert_eq!(w.last_processed(id), Some(3));

        let motion = DefaultMotion::new(w.config().physics);
        let mut expected = MotionState::of(&Player::new(id, Vec3::ZERO));
        for i in 1..=3 {
            expected = motion.step(&expected, &walk(i).sample, w.config().tick_dt());
        }
        assert_eq!(w.store().get::<Player>(id).unwrap().position, expected.position);

        let snap = w
            .drain_outgoing()
            .into_iter()
            .find_map(|o| match o {
                Outgoing::To(to, NetMsg::StateSnapshot(s)) if to == id => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(snap.ack_sequence, Some(3));
        assert!(snap.full);
    }

    #[test]
    fn bullet_hits_and_kills() {
        let mut w = world();
        let shooter = w.join("ana");
        let target = w.join("bo");
        place(&mut w, shooter, Vec3::ZERO);
        place(&mut w, target, Vec3::new(0.0, 0.0, 10.0));
        w.store_mut().get_mut::<Player>(target).unwrap().health = 20;
        w.drain_outgoing();

        let msg = shot(shooter, 1, &w);
        w.handle(shooter, msg);
        let mut out = w.drain_outgoing();
        for _ in 0..16 {
            w.step();
            out.extend(w.drain_outgoing());
        }
        let b = broadcasts(&out);
        assert!(matches!(b[0], NetMsg::FireEvent(e) if e.bullet_id.seq == 1));
        assert!(b.iter().any(|m| matches!(
            m,
            NetMsg::HitConfirm { target_id, damage: 20, .. } if *target_id == target
        )));
        assert!(b.iter().any(|m| matches!(
            m,
            NetMsg::PlayerDeath { player_id, killer_id } if *player_id == target && *killer_id == shooter
        )));
        assert!(!w.has_bullet(BulletId {
            owner: shooter,
            seq: 1
        }));
        assert_eq!(w.store().get::<Player>(shooter).unwrap().kills, 1);
        assert_eq!(w.store().get::<Player>(target).unwrap().deaths, 1);
    }

    #[test]
    fn dead_player_respawns_after_delay() {
        let mut w = world();
        let shooter = w.join("ana");
        let target = w.join("bo");
        place(&mut w, shooter, Vec3::ZERO);
        place(&mut w, target, Vec3::new(0.0, 0.0, 5.0));
        w.store_mut().get_mut::<Player>(target).unwrap().health = 1;
        let msg = shot(shooter, 1, &w);
        w.handle(shooter, msg);
        for _ in 0..4 {
            w.step();
        }
        assert!(!w.store().get::<Player>(target).unwrap().alive);
        for _ in 0..8 {
            w.step();
        }
        let p = w.store().get::<Player>(target).unwrap();
        assert!(p.alive);
        assert_eq!(p.health, MAX_HEALTH);
        assert_eq!(p.deaths, 1);
    }

    #[test]
    fn fire_validation() {
        let mut w = world();
        let a = w.join("ana");
        let b = w.join("bo");
        w.drain_outgoing();

        // Someone else's bullet id.
        let mut forged = shot(a, 1, &w);
        if let NetMsg::FireEvent(e) = &mut forged {
            e.bullet_id.owner = b;
        }
        w.handle(a, forged);
        assert!(w.drain_outgoing().is_empty());

        let msg = shot(a, 5, &w);
        w.handle(a, msg);
        assert_eq!(w.drain_outgoing().len(), 1);

        // Replayed sequence.
        let msg = shot(a, 5, &w);
        w.handle(a, msg);
        assert!(w.drain_outgoing().is_empty());

        // Within half the cooldown.
        w.step();
        let msg = shot(a, 6, &w);
        w.handle(a, msg);
        assert!(w
            .drain_outgoing()
            .iter()
            .all(|o| !matches!(o, Outgoing::Broadcast(NetMsg::FireEvent(_)))));
    }

    #[test]
    fn bomb_arms_detonates_once_and_hurts_nearby() {
        let mut w = world();
        let a = w.join("ana");
        let b = w.join("bo");
        place(&mut w, a, Vec3::ZERO);
        place(&mut w, b, Vec3::new(3.0, 0.0, 0.0));
        w.drain_outgoing();

        let bomb_id = BombId { owner: a, seq: 1 };
        w.handle(
            a,
            NetMsg::BombPlant {
                bomb_id,
                planted_by: a,
                position: Vec3::new(40.0, 0.0, 40.0),
                armed_at_ms: 0,
                fuse_ms: 1,
            },
        );
        let out = w.drain_outgoing();
        assert!(matches!(
            broadcasts(&out)[0],
            NetMsg::BombPlant { position, fuse_ms: 200, .. } if *position == Vec3::ZERO
        ));

        let mut out = Vec::new();
        for _ in 0..40 {
            w.step();
            out.extend(w.drain_outgoing());
        }
        let b_msgs = broadcasts(&out);
        let detonations = b_msgs
            .iter()
            .filter(|m| matches!(m, NetMsg::BombDetonate { .. }))
            .count();
        assert_eq!(detonations, 1);
        assert!(b_msgs.iter().any(|m| matches!(
            m,
            NetMsg::BlastDamage { target_id, damage, .. } if *target_id == b && *damage > 0
        )));
        assert!(!w.store().contains::<Bomb>(bomb_id));
        assert!(w.store().get::<Player>(b).unwrap().health < MAX_HEALTH);
    }

    #[test]
    fn defuse_needs_reach() {
        let mut w = world();
        let a = w.join("ana");
        let b = w.join("bo");
        place(&mut w, a, Vec3::ZERO);
        place(&mut w, b, Vec3::new(10.0, 0.0, 0.0));
        let bomb_id = BombId { owner: a, seq: 1 };
        w.handle(
            a,
            NetMsg::BombPlant {
                bomb_id,
                planted_by: a,
                position: Vec3::ZERO,
                armed_at_ms: 0,
                fuse_ms: 0,
            },
        );
        w.drain_outgoing();

        w.handle(b, NetMsg::BombDefuse { bomb_id, defused_by: b });
        assert!(w.store().contains::<Bomb>(bomb_id));

        place(&mut w, b, Vec3::new(1.0, 0.0, 0.0));
        w.handle(b, NetMsg::BombDefuse { bomb_id, defused_by: b });
        assert!(!w.store().contains::<Bomb>(bomb_id));
        assert!(matches!(
            broadcasts(&w.drain_outgoing())[..],
            [NetMsg::BombDefuse { .. }]
        ));
    }

    #[test]
    fn leave_is_broadcast() {
        let mut w = world();
        let a = w.join("ana");
        w.drain_outgoing();
        w.handle(a, NetMsg::Leave { player_id: a });
        assert!(w.player_ids().is_empty());
        assert_eq!(
            w.drain_outgoing(),
            vec![Outgoing::Broadcast(NetMsg::Leave { player_id: a })]
        );
    }
}

//! Sans-IO client session.
//!
//! Owns the entity store and every synchronization component. The socket
//! layer ([`crate::client::GameClient`]) feeds it decoded messages and the
//! current time, and drains outbound messages from it; nothing in here does
//! I/O or reads a clock.

use std::collections::BTreeSet;
use std::time::Duration;

use arena_shared::{
    config::SyncConfig,
    effects::EffectSink,
    entity::{Bomb, BombId, EntityKey, Player, PlayerId},
    error::SyncError,
    input::{InputButtons, SequencedInput},
    math::Vec3,
    net::{decode, EntityState, NetMsg, StateSnapshot},
    physics::{DefaultMotion, MotionModel},
    render::RenderSink,
    store::EntityStore,
};
use tracing::{debug, info, trace, warn};

use crate::{
    input::{EdgeDetector, InputState},
    interp::{PoseSample, RemoteInterpolator, ServerClock},
    prediction::{PredictionEngine, Reconciled},
    weapon::WeaponPipeline,
};

/// Messages waiting for the socket.
#[derive(Debug, Default)]
struct Outbound {
    inputs: Vec<SequencedInput>,
    events: Vec<NetMsg>,
    last_input_flush: Option<Duration>,
}

pub struct ClientSession {
    cfg: SyncConfig,
    store: EntityStore,
    prediction: PredictionEngine,
    interp: RemoteInterpolator,
    weapons: WeaponPipeline,
    clock: ServerClock,
    last_tick: Option<u32>,
    edges: EdgeDetector,
    outbound: Outbound,
    /// Set while there is no live connection; input is not sampled and
    /// nothing is queued.
    frozen: bool,
}

impl ClientSession {
    pub fn new(cfg: SyncConfig) -> Self {
        let motion = DefaultMotion::new(cfg.physics);
        Self::with_motion(cfg, Box::new(motion))
    }

    /// Builds a session with a custom motion model. Client and server must
    /// agree on it for reconciliation to converge.
    pub fn with_motion(cfg: SyncConfig, motion: Box<dyn MotionModel>) -> Self {
        Self {
            prediction: PredictionEngine::new(motion, cfg.tick_dt(), cfg.input_buffer_len),
            interp: RemoteInterpolator::new(
                cfg.interpolation_delay_ms,
                Duration::from_millis(cfg.stale_timeout_ms),
            ),
            weapons: WeaponPipeline::new(&cfg),
            store: EntityStore::default(),
            clock: ServerClock::default(),
            last_tick: None,
            edges: EdgeDetector::default(),
            outbound: Outbound::default(),
            frozen: true,
            cfg,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn prediction(&self) -> &PredictionEngine {
        &self.prediction
    }

    pub fn weapons(&self) -> &WeaponPipeline {
        &self.weapons
    }

    pub fn interpolator(&self) -> &RemoteInterpolator {
        &self.interp
    }

    pub fn local_player_id(&self) -> Option<PlayerId> {
        self.store.local_player_id()
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Estimated server clock at local time `now`.
    pub fn server_now_ms(&self, now: Duration) -> u64 {
        self.clock.now_ms(now)
    }

    /// Binds the session to the id the server assigned.
    pub fn on_join_ack(&mut self, player_id: PlayerId, server_time_ms: u64, now: Duration) {
        self.store.set_local_player(Some(player_id));
        if !self.store.contains::<Player>(player_id) {
            let mut me = Player::new(player_id, Vec3::ZERO);
            me.name.clone_from(&self.cfg.player_name);
            self.store.upsert(me);
        }
        self.clock.observe(server_time_ms, now);
        self.frozen = false;
        info!(player_id = %player_id, server_time_ms, "joined");
    }

    /// Runs one fixed-rate tick: sample, predict, fire, expire.
    pub fn tick(&mut self, input: &InputState, now: Duration, effects: &mut dyn EffectSink) {
        let server_now = self.clock.now_ms(now);

        if !self.frozen && self.store.local_player_id().is_some() {
            let sample = input.to_sample(now.as_millis() as u64);
            let pressed = self.edges.update(sample.buttons);
            let sequenced = self.prediction.predict(&mut self.store, sample);
            self.outbound.inputs.push(sequenced);

            self.weapons.update(now);
            if pressed.contains(InputButtons::RELOAD) {
                self.weapons.start_reload(&self.store, now, effects);
            }
            if sample.pressed(InputButtons::FIRE) {
                if let Some(event) = self.weapons.try_fire(&mut self.store, now, server_now, effects)
                {
                    self.outbound.events.push(NetMsg::FireEvent(event));
                }
            }
            if pressed.contains(InputButtons::PLANT) {
                if let Some(msg) = self.weapons.try_plant(&mut self.store, server_now) {
                    self.outbound.events.push(msg);
                }
            }
            if pressed.contains(InputButtons::DEFUSE) {
                if let Some(msg) = self.weapons.try_defuse(&self.store) {
                    self.outbound.events.push(msg);
                }
            }
        }

        self.weapons.expire(&mut self.store, server_now);
        self.expire_remote(now);
    }

    fn expire_remote(&mut self, now: Duration) {
        let local = self.store.local_player_id();
        for key in self.interp.expire(now) {
            match key {
                EntityKey::Player(id) if Some(id) != local => {
                    self.store.remove::<Player>(id);
                    debug!(player_id = %id, "remote player expired");
                }
                EntityKey::Bomb(id) if !self.weapons.is_unconfirmed_bomb(id) => {
                    self.store.remove::<Bomb>(id);
                    debug!(bomb = ?id, "bomb expired");
                }
                _ => {}
            }
        }
    }

    /// Decodes and dispatches one frame payload.
    pub fn handle_frame(
        &mut self,
        bytes: &[u8],
        now: Duration,
        effects: &mut dyn EffectSink,
    ) -> Result<(), SyncError> {
        let msg = decode(bytes)?;
        self.handle_message(msg, now, effects)
    }

    /// Routes one inbound message to the component that owns it.
    ///
    /// Errors are reported after the message has been applied as far as
    /// possible; none of them leave the session unusable.
    pub fn handle_message(
        &mut self,
        msg: NetMsg,
        now: Duration,
        effects: &mut dyn EffectSink,
    ) -> Result<(), SyncError> {
        let kind = msg.kind();
        trace!(kind, "inbound");
        let server_now = self.clock.now_ms(now);
        match msg {
            NetMsg::JoinAck {
                player_id,
                server_time_ms,
                ..
            } => self.on_join_ack(player_id, server_time_ms, now),
            NetMsg::StateSnapshot(snap) => return self.apply_snapshot(snap, now),
            NetMsg::FireEvent(event) => {
                self.weapons
                    .on_fire_event(&mut self.store, &event, server_now, effects);
            }
            NetMsg::HitConfirm {
                bullet_id,
                target_id,
                damage,
            } => {
                return self.weapons.on_hit_confirm(
                    &mut self.store,
                    bullet_id,
                    target_id,
                    damage,
                    effects,
                );
            }
            NetMsg::BlastDamage {
                bomb_id,
                target_id,
                damage,
            } => self
                .weapons
                .on_blast_damage(&mut self.store, bomb_id, target_id, damage, effects),
            NetMsg::PlayerDeath {
                player_id,
                killer_id,
            } => self
                .weapons
                .on_player_death(&mut self.store, player_id, killer_id, effects),
            NetMsg::BombPlant {
                bomb_id,
                planted_by,
                position,
                armed_at_ms,
                fuse_ms,
            } => self.weapons.on_bomb_plant(
                &mut self.store,
                bomb_id,
                planted_by,
                position,
                armed_at_ms,
                fuse_ms,
            ),
            NetMsg::BombDetonate {
                bomb_id, position, ..
            } => {
                self.weapons
                    .on_bomb_detonate(&mut self.store, bomb_id, position, effects);
                self.interp.remove(&EntityKey::Bomb(bomb_id));
            }
            NetMsg::BombDefuse {
                bomb_id,
                defused_by,
            } => {
                self.weapons
                    .on_bomb_defuse(&mut self.store, bomb_id, defused_by);
                self.interp.remove(&EntityKey::Bomb(bomb_id));
            }
            NetMsg::Leave { player_id } => {
                if Some(player_id) == self.store.local_player_id() {
                    return Err(SyncError::ConnectionLost(
                        "removed by server".to_string(),
                    ));
                }
                self.store.remove::<Player>(player_id);
                self.interp.remove(&EntityKey::Player(player_id));
                info!(player_id = %player_id, "player left");
            }
            NetMsg::Join { .. } | NetMsg::InputUpdate { .. } => {
                warn!(kind, "server-bound message received by client; dropped");
            }
        }
        Ok(())
    }

    /// Applies an authoritative snapshot.
    ///
    /// Snapshots at or before the last applied tick are dropped whole.
    pub fn apply_snapshot(&mut self, snap: StateSnapshot, now: Duration) -> Result<(), SyncError> {
        if let Some(last) = self.last_tick {
            if snap.tick <= last {
                debug!(tick = snap.tick, last, "stale snapshot dropped");
                return Ok(());
            }
        }
        self.last_tick = Some(snap.tick);
        self.clock.observe(snap.server_time_ms, now);

        let local = self.store.local_player_id();
        let mut local_state = None;
        let mut seen_players = BTreeSet::new();
        let mut seen_bombs = BTreeSet::new();

        for entity in snap.entities {
            match entity {
                EntityState::Player(p) => {
                    seen_players.insert(p.id);
                    if Some(p.id) == local {
                        local_state = Some(p);
                        continue;
                    }
                    self.interp.push(
                        EntityKey::Player(p.id),
                        PoseSample {
                            server_time_ms: snap.server_time_ms,
                            position: p.position,
                            yaw: p.yaw,
                            pitch: p.pitch,
                        },
                        now,
                    );
                    match self.store.get_mut::<Player>(p.id) {
                        Some(existing) => existing.adopt_snapshot(&p),
                        None => {
                            debug!(player_id = %p.id, "remote player appeared");
                            self.store.upsert(p);
                        }
                    }
                }
                EntityState::Bomb(b) => {
                    if b.detonated || self.weapons.is_detonated(b.id) {
                        continue;
                    }
                    seen_bombs.insert(b.id);
                    self.interp.push(
                        EntityKey::Bomb(b.id),
                        PoseSample {
                            server_time_ms: snap.server_time_ms,
                            position: b.position,
                            yaw: 0.0,
                            pitch: 0.0,
                        },
                        now,
                    );
                    self.store.upsert(b);
                }
            }
        }

        if snap.full {
            self.prune_absent(&seen_players, &seen_bombs);
        }

        let Some(state) = local_state else {
            return Ok(());
        };
        match self
            .prediction
            .reconcile(&mut self.store, &state, snap.ack_sequence)?
        {
            Reconciled::Replayed {
                replayed,
                correction,
            } => {
                if correction > 0.01 {
                    debug!(replayed, correction, "prediction corrected");
                }
            }
            Reconciled::Stale => {}
        }
        Ok(())
    }

    fn prune_absent(&mut self, players: &BTreeSet<PlayerId>, bombs: &BTreeSet<BombId>) {
        let local = self.store.local_player_id();
        let gone_players: Vec<PlayerId> = self
            .store
            .ids::<Player>()
            .into_iter()
            .filter(|id| Some(*id) != local && !players.contains(id))
            .collect();
        for id in gone_players {
            self.store.remove::<Player>(id);
            self.interp.remove(&EntityKey::Player(id));
        }

        let gone_bombs: Vec<BombId> = self
            .store
            .ids::<Bomb>()
            .into_iter()
            .filter(|id| !bombs.contains(id) && !self.weapons.is_unconfirmed_bomb(*id))
            .collect();
        for id in gone_bombs {
            self.store.remove::<Bomb>(id);
            self.interp.remove(&EntityKey::Bomb(id));
        }
    }

    /// Drains what should go on the wire now.
    ///
    /// Combat and bomb events go out immediately; input is coalesced into at
    /// most one `InputUpdate` per send interval carrying every sample since
    /// the previous one.
    pub fn take_outbound(&mut self, now: Duration) -> Vec<NetMsg> {
        if self.frozen {
            return Vec::new();
        }
        let mut out: Vec<NetMsg> = std::mem::take(&mut self.outbound.events);

        let due = self
            .outbound
            .last_input_flush
            .map_or(true, |last| now.saturating_sub(last) >= self.cfg.send_interval());
        if due && !self.outbound.inputs.is_empty() {
            if let Some(player_id) = self.store.local_player_id() {
                out.push(NetMsg::InputUpdate {
                    player_id,
                    inputs: std::mem::take(&mut self.outbound.inputs),
                });
                self.outbound.last_input_flush = Some(now);
            }
        }
        out
    }

    /// Draws every live entity. Remote players and bombs are drawn at their
    /// interpolated pose; the local player and bullets at their current one.
    pub fn render(&self, now: Duration, sink: &mut dyn RenderSink) {
        let server_now = self.clock.now_ms(now);
        let render_ms = self.interp.render_time_ms(server_now);
        let local = self.store.local_player_id().map(EntityKey::Player);

        sink.begin_frame();
        for mut pose in self.store.poses(server_now, self.weapons.weapons()) {
            let interpolated = match pose.key {
                EntityKey::Player(_) if Some(pose.key) != local => true,
                EntityKey::Bomb(_) => true,
                _ => false,
            };
            if interpolated {
                if let Some(sample) = self.interp.pose_at(&pose.key, render_ms) {
                    pose.position = sample.position;
                    pose.yaw = sample.yaw;
                    pose.pitch = sample.pitch;
                }
            }
            sink.draw(&pose);
        }
        sink.end_frame();
    }

    /// Connection dropped: stop sending. With no snapshots arriving, remote
    /// entities age out through the stale timeout.
    pub fn mark_world_stale(&mut self) {
        if !self.frozen {
            warn!(
                remote = self.interp.len(),
                "world marked stale; outbound frozen"
            );
        }
        self.frozen = true;
        self.outbound = Outbound::default();
    }

    /// Clears everything tied to the old connection. The world is rebuilt
    /// from the next full snapshot after a fresh join.
    pub fn reset_for_reconnect(&mut self) {
        self.store.clear();
        self.store.set_local_player(None);
        self.prediction.reset();
        self.interp.clear();
        self.weapons.reset();
        self.clock.reset();
        self.last_tick = None;
        self.edges = EdgeDetector::default();
        self.outbound = Outbound::default();
        self.frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{
        effects::{EffectLog, NullEffects},
        entity::{Bomb, BombId, BulletId},
        render::PoseCollector,
    };

    const ME: PlayerId = PlayerId(1);
    const THEM: PlayerId = PlayerId(2);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn joined() -> ClientSession {
        let mut s = ClientSession::new(SyncConfig::default());
        s.on_join_ack(ME, 1_000, Duration::ZERO);
        s
    }

    fn snapshot(tick: u32, server_time_ms: u64, players: Vec<Player>) -> NetMsg {
        NetMsg::StateSnapshot(StateSnapshot {
            tick,
            server_time_ms,
            ack_sequence: None,
            full: false,
            entities: players.into_iter().map(EntityState::Player).collect(),
        })
    }

    #[test]
    fn join_creates_local_player() {
        let s = joined();
        assert_eq!(s.local_player_id(), Some(ME));
        assert_eq!(s.store().local_player().unwrap().name, "Player");
        assert!(!s.is_frozen());
    }

    #[test]
    fn out_of_order_snapshot_is_discarded() {
        let mut s = joined();
        let mut fx = NullEffects;
        let newer = Player::new(THEM, Vec3::new(1.0, 0.0, 0.0));
        let older = Player::new(THEM, Vec3::new(5.0, 0.0, 0.0));
        s.handle_message(snapshot(10, 1_100, vec![newer]), ms(100), &mut fx)
            .unwrap();
        s.handle_message(snapshot(9, 1_050, vec![older]), ms(110), &mut fx)
            .unwrap();
        assert_eq!(s.last_tick(), Some(10));
        assert_eq!(
            s.store().get::<Player>(THEM).unwrap().position,
            Vec3::new(1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn input_is_coalesced_per_send_interval() {
        let mut s = joined();
        let mut fx = NullEffects;
        let walk = InputState {
            forward: 1.0,
            ..Default::default()
        };

        s.tick(&walk, ms(0), &mut fx);
        assert_eq!(s.take_outbound(ms(0)).len(), 1);

        for t in [15, 30, 45] {
            s.tick(&walk, ms(t), &mut fx);
            assert!(s.take_outbound(ms(t)).is_empty());
        }
        s.tick(&walk, ms(50), &mut fx);
        let out = s.take_outbound(ms(50));
        assert_eq!(out.len(), 1);
        match &out[0] {
            NetMsg::InputUpdate { player_id, inputs } => {
                assert_eq!(*player_id, ME);
                let seqs: Vec<u32> = inputs.iter().map(|i| i.sequence).collect();
                assert_eq!(seqs, vec![2, 3, 4, 5]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fire_goes_out_immediately() {
        let mut s = joined();
        let mut fx = EffectLog::default();
        let shoot = InputState {
            fire: true,
            ..Default::default()
        };
        s.tick(&shoot, ms(0), &mut fx);
        s.tick(&shoot, ms(100), &mut fx);
        s.tick(&shoot, ms(200), &mut fx);
        let out = s.take_outbound(ms(200));
        let fires = out
            .iter()
            .filter(|m| matches!(m, NetMsg::FireEvent(_)))
            .count();
        assert_eq!(fires, 1);
        assert_eq!(fx.count("fired"), 1);

        // Pistol cooldown is 300 ms; the event does not wait for the input batch.
        s.tick(&shoot, ms(300), &mut fx);
        let out = s.take_outbound(ms(300));
        assert!(matches!(out.first(), Some(NetMsg::FireEvent(_))));
        assert_eq!(fx.count("fired"), 2);
    }

    #[test]
    fn local_snapshot_reconciles_with_ack() {
        let mut s = joined();
        let mut fx = NullEffects;
        let walk = InputState {
            forward: 1.0,
            ..Default::default()
        };
        for t in 0..4 {
            s.tick(&walk, ms(t * 16), &mut fx);
        }
        let server_me = Player::new(ME, Vec3::new(0.0, 0.0, 0.25));
        s.handle_message(
            NetMsg::StateSnapshot(StateSnapshot {
                tick: 1,
                server_time_ms: 1_064,
                ack_sequence: Some(4),
                full: true,
                entities: vec![EntityState::Player(server_me.clone())],
            }),
            ms(64),
            &mut fx,
        )
        .unwrap();
        assert_eq!(s.prediction().pending_len(), 0);
        assert_eq!(s.store().local_player().unwrap().position, server_me.position);
    }

    #[test]
    fn full_snapshot_prunes_missing_remotes() {
        let mut s = joined();
        let mut fx = NullEffects;
        s.handle_message(
            snapshot(1, 1_000, vec![Player::new(THEM, Vec3::ZERO)]),
            ms(0),
            &mut fx,
        )
        .unwrap();
        assert!(s.store().contains::<Player>(THEM));
        s.handle_message(
            NetMsg::StateSnapshot(StateSnapshot {
                tick: 2,
                server_time_ms: 1_050,
                ack_sequence: None,
                full: true,
                entities: Vec::new(),
            }),
            ms(50),
            &mut fx,
        )
        .unwrap();
        assert!(!s.store().contains::<Player>(THEM));
        assert!(s.store().contains::<Player>(ME));
    }

    #[test]
    fn remote_players_render_interpolated() {
        let mut s = joined();
        let mut fx = NullEffects;
        s.handle_message(
            snapshot(1, 1_000, vec![Player::new(THEM, Vec3::ZERO)]),
            ms(0),
            &mut fx,
        )
        .unwrap();
        s.handle_message(
            snapshot(2, 1_100, vec![Player::new(THEM, Vec3::new(10.0, 0.0, 0.0))]),
            ms(100),
            &mut fx,
        )
        .unwrap();
        let mut sink = PoseCollector::default();
        // Clock offset is ~1000 ms, so local 150 ms renders at server 1050.
        s.render(ms(150), &mut sink);
        let them = sink
            .poses
            .iter()
            .find(|p| p.key == EntityKey::Player(THEM))
            .unwrap();
        assert!(them.position.x > 0.0 && them.position.x < 10.0);
        assert_eq!(
            s.store().get::<Player>(THEM).unwrap().position.x,
            10.0,
            "store keeps the latest authoritative state"
        );
    }

    #[test]
    fn unknown_frame_is_a_protocol_error() {
        let mut s = joined();
        let err = s
            .handle_frame(br#"{"type":"emote"}"#, ms(0), &mut NullEffects)
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn late_hit_reports_conflict_but_applies_damage() {
        let mut s = joined();
        let mut fx = EffectLog::default();
        s.handle_message(
            snapshot(1, 1_000, vec![Player::new(THEM, Vec3::ZERO)]),
            ms(0),
            &mut fx,
        )
        .unwrap();
        s.tick(
            &InputState {
                fire: true,
                ..Default::default()
            },
            ms(0),
            &mut fx,
        );
        // Well past the confirmation deadline.
        s.tick(&InputState::default(), ms(2_000), &mut fx);
        let err = s
            .handle_message(
                NetMsg::HitConfirm {
                    bullet_id: BulletId { owner: ME, seq: 1 },
                    target_id: THEM,
                    damage: 20,
                },
                ms(2_010),
                &mut fx,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::AuthorityConflict(_)));
        assert_eq!(s.store().get::<Player>(THEM).unwrap().health, 80);
    }

    #[test]
    fn detonation_at_fuse_end_explodes_once() {
        let mut s = joined();
        let mut fx = EffectLog::default();
        let bomb_id = BombId { owner: THEM, seq: 1 };
        let armed_at_ms = 1_000;
        s.handle_message(
            NetMsg::BombPlant {
                bomb_id,
                planted_by: THEM,
                position: Vec3::new(4.0, 0.0, 4.0),
                armed_at_ms,
                fuse_ms: 40_000,
            },
            ms(0),
            &mut fx,
        )
        .unwrap();
        let bomb = s.store().get::<Bomb>(bomb_id).unwrap();
        assert_eq!(bomb.detonates_at_ms(), Some(armed_at_ms + 40_000));

        let detonate = NetMsg::BombDetonate {
            bomb_id,
            position: Vec3::new(4.0, 0.0, 4.0),
            detonated_at_ms: armed_at_ms + 40_000,
        };
        s.tick(&InputState::default(), ms(40_000), &mut fx);
        s.handle_message(detonate.clone(), ms(40_000), &mut fx).unwrap();
        assert_eq!(fx.count("explosion"), 1);
        assert!(!s.store().contains::<Bomb>(bomb_id));

        // A late repeat five seconds on changes nothing.
        s.tick(&InputState::default(), ms(45_000), &mut fx);
        s.handle_message(detonate, ms(45_000), &mut fx).unwrap();
        assert_eq!(fx.count("explosion"), 1);
        assert!(!s.store().contains::<Bomb>(bomb_id));
    }

    #[test]
    fn stale_world_freezes_outbound_and_ages_out() {
        let mut s = joined();
        let mut fx = NullEffects;
        s.handle_message(
            snapshot(1, 1_000, vec![Player::new(THEM, Vec3::ZERO)]),
            ms(0),
            &mut fx,
        )
        .unwrap();
        s.tick(&InputState::default(), ms(10), &mut fx);
        s.mark_world_stale();
        assert!(s.take_outbound(ms(100)).is_empty());
        s.tick(&InputState::default(), ms(2_000), &mut fx);
        assert!(s.store().contains::<Player>(THEM));
        s.tick(&InputState::default(), ms(3_100), &mut fx);
        assert!(!s.store().contains::<Player>(THEM));
        assert!(s.store().contains::<Player>(ME));

        s.reset_for_reconnect();
        assert_eq!(s.local_player_id(), None);
        assert_eq!(s.store().len::<Player>(), 0);
    }

    #[test]
    fn remote_leave_removes_player() {
        let mut s = joined();
        let mut fx = NullEffects;
        s.handle_message(
            snapshot(1, 1_000, vec![Player::new(THEM, Vec3::ZERO)]),
            ms(0),
            &mut fx,
        )
        .unwrap();
        s.handle_message(NetMsg::Leave { player_id: THEM }, ms(5), &mut fx)
            .unwrap();
        assert!(!s.store().contains::<Player>(THEM));
        assert!(matches!(
            s.handle_message(NetMsg::Leave { player_id: ME }, ms(6), &mut fx),
            Err(SyncError::ConnectionLost(_))
        ));
    }
}

//! Client-side prediction and server reconciliation.
//!
//! Every tick the local input sample is stored in a bounded buffer keyed by
//! sequence number and immediately applied to the local player with the
//! shared motion function. When the server acknowledges a sequence, samples
//! up to it are discarded, the local player is reset to the server's state and
//! the remaining samples are replayed on top. Divergence therefore lasts at
//! most one round trip.

use std::collections::VecDeque;

use arena_shared::{
    entity::Player,
    error::{DesyncReason, SyncError},
    input::{InputSample, SequencedInput},
    physics::{MotionModel, MotionState},
    store::EntityStore,
};
use tracing::{debug, warn};

/// Outcome of applying an authoritative local-player state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciled {
    /// State reset to the server and `replayed` pending samples re-applied.
    /// `correction` is how far the predicted position moved, in metres.
    Replayed { replayed: usize, correction: f32 },
    /// The acknowledgement was older than one already applied.
    Stale,
}

pub struct PredictionEngine {
    motion: Box<dyn MotionModel>,
    dt_sec: f32,
    capacity: usize,
    buffer: VecDeque<SequencedInput>,
    next_sequence: u32,
    last_acked: Option<u32>,
    /// Set when local prediction can no longer be trusted; the next
    /// authoritative state is taken verbatim.
    resync: Option<DesyncReason>,
}

impl PredictionEngine {
    pub fn new(motion: Box<dyn MotionModel>, dt_sec: f32, capacity: usize) -> Self {
        Self {
            motion,
            dt_sec,
            capacity: capacity.max(1),
            buffer: VecDeque::with_capacity(capacity.max(1)),
            next_sequence: 1,
            last_acked: None,
            resync: None,
        }
    }

    /// Records a sample under the next sequence number and advances the
    /// local player by one tick. Returns the sequenced sample to send.
    pub fn predict(&mut self, store: &mut EntityStore, sample: InputSample) -> SequencedInput {
        let input = SequencedInput {
            sequence: self.next_sequence,
            sample,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if self.buffer.len() >= self.capacity {
            warn!(
                capacity = self.capacity,
                "input buffer exhausted; dropping prediction history"
            );
            self.buffer.clear();
            self.resync = Some(DesyncReason::BufferExhausted {
                capacity: self.capacity,
            });
        }
        self.buffer.push_back(input);

        if let Some(player) = store.local_player_mut() {
            self.apply(player, &input.sample);
        }
        input
    }

    fn apply(&self, player: &mut Player, sample: &InputSample) {
        if !player.alive {
            return;
        }
        let next = self.motion.step(&MotionState::of(player), sample, self.dt_sec);
        next.write_to(player);
    }

    /// Applies the server's view of the local player.
    ///
    /// A desync (buffer exhaustion earlier, or an acknowledgement that went
    /// backwards) is resolved by this same call: `authoritative` is taken
    /// verbatim with no replay and every pending sample is dropped. Nothing
    /// waits for a later snapshot. The error is still returned so the caller
    /// can report it.
    pub fn reconcile(
        &mut self,
        store: &mut EntityStore,
        authoritative: &Player,
        ack: Option<u32>,
    ) -> Result<Reconciled, SyncError> {
        if let (Some(got), Some(last)) = (ack, self.last_acked) {
            if got < last && self.resync.is_none() {
                self.resync = Some(DesyncReason::AckRegression { last, got });
            }
        } else if ack.is_none() && self.last_acked.is_some() && self.resync.is_none() {
            debug!("snapshot without acknowledgement after acks began; ignoring");
            return Ok(Reconciled::Stale);
        }

        if let Some(reason) = self.resync.take() {
            self.buffer.clear();
            self.last_acked = ack;
            adopt(store, authoritative);
            return Err(SyncError::Desync(reason));
        }

        if let Some(ack) = ack {
            while self.buffer.front().is_some_and(|i| i.sequence <= ack) {
                self.buffer.pop_front();
            }
            self.last_acked = Some(ack);
        }

        let before = store.local_player().map(|p| p.position);
        adopt(store, authoritative);

        let Some(player) = store.local_player_mut() else {
            return Ok(Reconciled::Replayed {
                replayed: 0,
                correction: 0.0,
            });
        };
        for input in &self.buffer {
            if !player.alive {
                break;
            }
            let next = self
                .motion
                .step(&MotionState::of(player), &input.sample, self.dt_sec);
            next.write_to(player);
        }
        let correction = before.map_or(0.0, |b| b.distance(player.position));
        Ok(Reconciled::Replayed {
            replayed: self.buffer.len(),
            correction,
        })
    }

    /// Samples not yet acknowledged by the server, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &SequencedInput> {
        self.buffer.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn last_acked(&self) -> Option<u32> {
        self.last_acked
    }

    /// Sequence the next sample will get.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Forgets all history. Used when the connection is rebuilt.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_sequence = 1;
        self.last_acked = None;
        self.resync = None;
    }
}

fn adopt(store: &mut EntityStore, authoritative: &Player) {
    match store.local_player_mut() {
        Some(local) => local.adopt_snapshot(authoritative),
        None => {
            store.upsert(authoritative.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{
        entity::PlayerId,
        math::Vec3,
        physics::{DefaultMotion, PhysicsConfig},
    };

    const DT: f32 = 1.0 / 64.0;
    const ME: PlayerId = PlayerId(1);

    fn setup(capacity: usize) -> (PredictionEngine, EntityStore) {
        let mut store = EntityStore::default();
        store.set_local_player(Some(ME));
        store.upsert(Player::new(ME, Vec3::ZERO));
        let engine = PredictionEngine::new(
            Box::new(DefaultMotion::new(PhysicsConfig::default())),
            DT,
            capacity,
        );
        (engine, store)
    }

    fn forward() -> InputSample {
        InputSample {
            forward: 1.0,
            ..Default::default()
        }
    }

    fn strafe() -> InputSample {
        InputSample {
            right: 1.0,
            yaw_delta: 0.05,
            ..Default::default()
        }
    }

    fn local(store: &EntityStore) -> &Player {
        store.local_player().unwrap()
    }

    #[test]
    fn prediction_moves_local_player_immediately() {
        let (mut engine, mut store) = setup(64);
        let input = engine.predict(&mut store, forward());
        assert_eq!(input.sequence, 1);
        assert!(local(&store).position.z > 0.0);
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn converges_to_server_plus_replay_of_later_inputs() {
        let (mut engine, mut store) = setup(64);
        for _ in 0..5 {
            engine.predict(&mut store, forward());
        }
        let later = [strafe(), forward()];
        for s in later {
            engine.predict(&mut store, s);
        }

        let mut server = Player::new(ME, Vec3::new(0.0, 0.0, 1.0));
        server.on_ground = true;
        let out = engine.reconcile(&mut store, &server, Some(5)).unwrap();
        assert!(matches!(out, Reconciled::Replayed { replayed: 2, .. }));

        let motion = DefaultMotion::new(PhysicsConfig::default());
        let mut expected = MotionState::of(&server);
        for s in &later {
            expected = motion.step(&expected, s, DT);
        }
        assert_eq!(local(&store).position, expected.position);
        assert_eq!(local(&store).yaw, expected.yaw);
    }

    #[test]
    fn ack_of_latest_sequence_equals_server_exactly() {
        let (mut engine, mut store) = setup(64);
        for _ in 0..3 {
            engine.predict(&mut store, forward());
        }
        let mut server = Player::new(ME, Vec3::new(4.0, 0.0, -2.5));
        server.yaw = 1.25;
        engine.reconcile(&mut store, &server, Some(3)).unwrap();
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(local(&store).position, server.position);
        assert_eq!(local(&store).yaw, server.yaw);
    }

    #[test]
    fn ack_gap_replays_from_last_acknowledged() {
        let (mut engine, mut store) = setup(64);
        for _ in 0..10 {
            engine.predict(&mut store, forward());
        }
        engine
            .reconcile(&mut store, &Player::new(ME, Vec3::ZERO), Some(2))
            .unwrap();
        // Server skipped straight from 2 to 7.
        let out = engine
            .reconcile(&mut store, &Player::new(ME, Vec3::ZERO), Some(7))
            .unwrap();
        assert!(matches!(out, Reconciled::Replayed { replayed: 3, .. }));
        assert_eq!(engine.pending().next().unwrap().sequence, 8);
    }

    #[test]
    fn ack_regression_forces_verbatim_resync() {
        let (mut engine, mut store) = setup(64);
        for _ in 0..6 {
            engine.predict(&mut store, forward());
        }
        engine
            .reconcile(&mut store, &Player::new(ME, Vec3::ZERO), Some(5))
            .unwrap();
        let truth = Player::new(ME, Vec3::new(9.0, 0.0, 9.0));
        let err = engine.reconcile(&mut store, &truth, Some(3)).unwrap_err();
        assert_eq!(
            err,
            SyncError::Desync(DesyncReason::AckRegression { last: 5, got: 3 })
        );
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(local(&store).position, truth.position);
    }

    #[test]
    fn buffer_exhaustion_resyncs_on_next_snapshot() {
        let (mut engine, mut store) = setup(4);
        for _ in 0..5 {
            engine.predict(&mut store, forward());
        }
        let truth = Player::new(ME, Vec3::new(1.0, 0.0, 1.0));
        let err = engine.reconcile(&mut store, &truth, Some(1)).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Desync(DesyncReason::BufferExhausted { capacity: 4 })
        ));
        assert_eq!(local(&store).position, truth.position);

        // Back to normal afterwards.
        engine.predict(&mut store, forward());
        assert!(engine
            .reconcile(&mut store, &truth, Some(6))
            .is_ok());
    }

    #[test]
    fn dead_player_does_not_move() {
        let (mut engine, mut store) = setup(8);
        store.local_player_mut().unwrap().alive = false;
        engine.predict(&mut store, forward());
        assert_eq!(local(&store).position, Vec3::ZERO);
    }

    #[test]
    fn reconcile_keeps_local_counters() {
        let (mut engine, mut store) = setup(8);
        store.local_player_mut().unwrap().kills = 3;
        let mut server = Player::new(ME, Vec3::ZERO);
        server.kills = 99;
        engine.reconcile(&mut store, &server, None).unwrap();
        assert_eq!(local(&store).kills, 3);
    }
}

//! Interpolation.
//!
//! The server sends discrete snapshots at tick boundaries.
//! The client renders at its own rate, a fixed delay behind its estimate of
//! the server clock, so remote entities are drawn between two authoritative
//! samples instead of jumping from one to the next.

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use std::time::Duration;

use arena_shared::{entity::EntityKey, math::Vec3};
use tracing::debug;

/// Estimate of the server clock relative to a local monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerClock {
    /// `server_ms - local_ms`.
    offset_ms: Option<f64>,
}

impl ServerClock {
    /// Fraction of the observed error folded in per snapshot.
    const CORRECTION: f64 = 0.1;

    /// Folds in one server timestamp received at local time `local_now`.
    pub fn observe(&mut self, server_ms: u64, local_now: Duration) {
        let sample = server_ms as f64 - local_now.as_secs_f64() * 1000.0;
        self.offset_ms = Some(match self.offset_ms {
            None => sample,
            Some(offset) => offset + (sample - offset) * Self::CORRECTION,
        });
    }

    pub fn is_synced(&self) -> bool {
        self.offset_ms.is_some()
    }

    /// Estimated server time at `local_now`. Zero before the first sample.
    pub fn now_ms(&self, local_now: Duration) -> u64 {
        match self.offset_ms {
            Some(offset) => (local_now.as_secs_f64() * 1000.0 + offset).round().max(0.0) as u64,
            None => 0,
        }
    }

    pub fn reset(&mut self) {
        self.offset_ms = None;
    }
}

/// One authoritative pose at a server timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub server_time_ms: u64,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone)]
struct Track {
    older: Option<PoseSample>,
    newer: PoseSample,
    last_update: Duration,
}

impl Track {
    fn pose_at(&self, render_ms: u64) -> PoseSample {
        let Some(older) = self.older else {
            return self.newer;
        };
        let span = self.newer.server_time_ms.saturating_sub(older.server_time_ms);
        if span == 0 {
            return self.newer;
        }
        let t = (render_ms.saturating_sub(older.server_time_ms) as f64 / span as f64)
            .clamp(0.0, 1.0) as f32;
        PoseSample {
            server_time_ms: render_ms.clamp(older.server_time_ms, self.newer.server_time_ms),
            position: older.position.lerp(self.newer.position, t),
            yaw: lerp_angle(older.yaw, self.newer.yaw, t),
            pitch: older.pitch + (self.newer.pitch - older.pitch) * t,
        }
    }
}

/// Interpolates along the shorter arc.
fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    let mut delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }
    (from + delta * t).rem_euclid(TAU)
}

/// Per-entity two-sample history for remote entities.
#[derive(Debug)]
pub struct RemoteInterpolator {
    delay_ms: u64,
    stale_after: Duration,
    tracks: HashMap<EntityKey, Track>,
}

impl RemoteInterpolator {
    pub fn new(delay_ms: u64, stale_after: Duration) -> Self {
        Self {
            delay_ms,
            stale_after,
            tracks: HashMap::new(),
        }
    }

    /// Records an authoritative sample. Returns `false` when the sample is
    /// not newer than the newest one held and was ignored.
    pub fn push(&mut self, key: EntityKey, sample: PoseSample, now: Duration) -> bool {
        match self.tracks.get_mut(&key) {
            Some(track) => {
                if sample.server_time_ms <= track.newer.server_time_ms {
                    debug!(?key, at = sample.server_time_ms, "out-of-order sample ignored");
                    return false;
                }
                track.older = Some(track.newer);
                track.newer = sample;
                track.last_update = now;
            }
            None => {
                self.tracks.insert(
                    key,
                    Track {
                        older: None,
                        newer: sample,
                        last_update: now,
                    },
                );
            }
        }
        true
    }

    /// Server time at which remote entities are drawn.
    pub fn render_time_ms(&self, server_now_ms: u64) -> u64 {
        server_now_ms.saturating_sub(self.delay_ms)
    }

    /// Pose to draw at `render_ms`, clamped to the held segment.
    pub fn pose_at(&self, key: &EntityKey, render_ms: u64) -> Option<PoseSample> {
        self.tracks.get(key).map(|t| t.pose_at(render_ms))
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.tracks.contains_key(key)
    }

    /// Drops and returns every entity that has not been updated within the
    /// stale timeout.
    pub fn expire(&mut self, now: Duration) -> Vec<EntityKey> {
        let stale_after = self.stale_after;
        let mut expired = Vec::new();
        self.tracks.retain(|key, track| {
            let keep = now.saturating_sub(track.last_update) <= stale_after;
            if !keep {
                expired.push(*key);
            }
            keep
        });
        expired.sort();
        expired
    }

    pub fn remove(&mut self, key: &EntityKey) {
        self.tracks.remove(key);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

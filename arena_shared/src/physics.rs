//! Deterministic player motion.
//!
//! The client predicts with exactly the function the server simulates with.
//! Determinism is a cross-process contract: identical state, input and `dt`
//! must give bit-identical output on every peer, so the step uses only plain
//! `f32` arithmetic in a fixed order.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::{
    entity::Player,
    input::{InputButtons, InputSample},
    math::Vec3,
};

/// Physics parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Acceleration applied while airborne, m/s².
    pub gravity: Vec3,
    /// Ground speed, m/s.
    pub walk_speed: f32,
    /// Multiplier applied to `walk_speed` while sprinting.
    pub sprint_multiplier: f32,
    /// Upward velocity on jump, m/s.
    pub jump_speed: f32,
    /// The arena floor spans `-half_extent..=half_extent` on X and Z.
    pub arena_half_extent: f32,
    /// Pitch is clamped to `±max_pitch` radians.
    pub max_pitch: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -20.0, 0.0),
            walk_speed: 5.0,
            sprint_multiplier: 1.6,
            jump_speed: 6.0,
            arena_half_extent: 50.0,
            max_pitch: 1.5,
        }
    }
}

/// The subset of player state that motion reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl MotionState {
    pub fn of(player: &Player) -> Self {
        Self {
            position: player.position,
            velocity: player.velocity,
            yaw: player.yaw,
            pitch: player.pitch,
            on_ground: player.on_ground,
        }
    }

    pub fn write_to(&self, player: &mut Player) {
        player.position = self.position;
        player.velocity = self.velocity;
        player.yaw = self.yaw;
        player.pitch = self.pitch;
        player.on_ground = self.on_ground;
    }
}

/// Motion function shared by prediction and authoritative simulation.
pub trait MotionModel: Send + Sync {
    fn step(&self, state: &MotionState, input: &InputSample, dt_sec: f32) -> MotionState;
}

/// Walk/sprint/jump over a flat, walled arena.
#[derive(Debug, Clone, Default)]
pub struct DefaultMotion {
    pub cfg: PhysicsConfig,
}

impl DefaultMotion {
    pub fn new(cfg: PhysicsConfig) -> Self {
        Self { cfg }
    }
}

impl MotionModel for DefaultMotion {
    fn step(&self, state: &MotionState, input: &InputSample, dt_sec: f32) -> MotionState {
        let cfg = &self.cfg;
        let mut s = *state;

        s.yaw = (s.yaw + input.yaw_delta).rem_euclid(TAU);
        s.pitch = (s.pitch + input.pitch_delta).clamp(-cfg.max_pitch, cfg.max_pitch);

        let (sy, cy) = s.yaw.sin_cos();
        let forward = Vec3::new(sy, 0.0, cy);
        let right = Vec3::new(cy, 0.0, -sy);
        let mut wish = forward * input.forward.clamp(-1.0, 1.0) + right * input.right.clamp(-1.0, 1.0);
        if wish.len_sq() > 1.0 {
            wish = wish.normalize_or_zero();
        }

        let mut speed = cfg.walk_speed;
        if input.pressed(InputButtons::SPRINT) {
            speed *= cfg.sprint_multiplier;
        }
        s.velocity.x = wish.x * speed;
        s.velocity.z = wish.z * speed;

        if s.on_ground && input.pressed(InputButtons::JUMP) {
            s.velocity.y = cfg.jump_speed;
            s.on_ground = false;
        }
        if !s.on_ground {
            s.velocity += cfg.gravity * dt_sec;
        }

        s.position += s.velocity * dt_sec;

        // Collision response: floor plane, then arena walls.
        if s.position.y <= 0.0 {
            s.position.y = 0.0;
            s.velocity.y = 0.0;
            s.on_ground = true;
        }
        let limit = cfg.arena_half_extent;
        if s.position.x.abs() > limit {
            s.position.x = s.position.x.clamp(-limit, limit);
            s.velocity.x = 0.0;
        }
        if s.position.z.abs() > limit {
            s.position.z = s.position.z.clamp(-limit, limit);
            s.velocity.z = 0.0;
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(samples: &[InputSample]) -> MotionState {
        let motion = DefaultMotion::default();
        let start = MotionState {
            on_ground: true,
            ..Default::default()
        };
        samples
            .iter()
            .fold(start, |s, i| motion.step(&s, i, 1.0 / 64.0))
    }

    #[test]
    fn replay_is_deterministic() {
        let samples: Vec<InputSample> = (0..200)
            .map(|i| InputSample {
                timestamp_ms: i,
                forward: ((i % 7) as f32 / 3.0) - 1.0,
                right: ((i % 5) as f32 / 2.0) - 1.0,
                yaw_delta: 0.013 * (i % 11) as f32,
                pitch_delta: -0.007,
                buttons: if i % 40 == 0 {
                    InputButtons::JUMP
                } else if i % 3 == 0 {
                    InputButtons::SPRINT
                } else {
                    InputButtons::empty()
                },
            })
            .collect();
        assert_eq!(run(&samples), run(&samples));
    }

    #[test]
    fn forward_moves_along_positive_z() {
        let s = run(&[InputSample {
            forward: 1.0,
            ..Default::default()
        }]);
        assert!(s.position.z > 0.0);
        assert_eq!(s.position.x, 0.0);
        assert_eq!(s.position.y, 0.0);
    }

    #[test]
    fn jump_leaves_ground_and_lands() {
        let mut samples = vec![InputSample {
            buttons: InputButtons::JUMP,
            ..Default::default()
        }];
        let airborne = run(&samples);
        assert!(!airborne.on_ground);
        assert!(airborne.position.y > 0.0);

        samples.extend(std::iter::repeat(InputSample::default()).take(128));
        let landed = run(&samples);
        assert!(landed.on_ground);
        assert_eq!(landed.position.y, 0.0);
    }

    #[test]
    fn walls_stop_motion() {
        let samples = vec![
            InputSample {
                forward: 1.0,
                buttons: InputButtons::SPRINT,
                ..Default::default()
            };
            64 * 20
        ];
        let s = run(&samples);
        assert_eq!(s.position.z, PhysicsConfig::default().arena_half_extent);
    }
}

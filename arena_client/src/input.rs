//! Input handling.
//!
//! In a real game this would integrate with windowing, raw mouse/keyboard,
//! action bindings, and per-frame sampling. Here an [`InputSource`] hands the
//! client one [`InputState`] per simulation tick, and the state is turned into
//! the device-agnostic [`InputSample`] the prediction engine consumes.

use arena_shared::input::{InputButtons, InputSample};

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    pub yaw_delta: f32,
    pub pitch_delta: f32,
    pub jump: bool,
    pub fire: bool,
    pub sprint: bool,
    pub reload: bool,
    pub plant: bool,
    pub defuse: bool,
}

impl InputState {
    pub fn buttons(&self) -> InputButtons {
        let mut b = InputButtons::empty();
        b.set(InputButtons::JUMP, self.jump);
        b.set(InputButtons::FIRE, self.fire);
        b.set(InputButtons::SPRINT, self.sprint);
        b.set(InputButtons::RELOAD, self.reload);
        b.set(InputButtons::PLANT, self.plant);
        b.set(InputButtons::DEFUSE, self.defuse);
        b
    }

    /// Turns sampled input into the sample for one tick.
    pub fn to_sample(&self, timestamp_ms: u64) -> InputSample {
        InputSample {
            timestamp_ms,
            forward: self.forward.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
            yaw_delta: self.yaw_delta,
            pitch_delta: self.pitch_delta,
            buttons: self.buttons(),
        }
    }
}

/// Supplies input once per tick.
pub trait InputSource {
    fn sample(&mut self) -> InputState;
}

/// Replays a fixed script, then holds still.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    script: std::collections::VecDeque<InputState>,
}

impl ScriptedInput {
    pub fn new(script: impl IntoIterator<Item = InputState>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputState {
        self.script.pop_front().unwrap_or_default()
    }
}

/// Tracks which buttons went down this tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeDetector {
    held: InputButtons,
}

impl EdgeDetector {
    /// Returns the buttons pressed now that were not held last tick.
    pub fn update(&mut self, now: InputButtons) -> InputButtons {
        let pressed = now - self.held;
        self.held = now;
        pressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_maps_to_sample() {
        let input = InputState {
            forward: 2.0,
            right: -0.5,
            sprint: true,
            fire: true,
            ..Default::default()
        };
        let s = input.to_sample(42);
        assert_eq!(s.timestamp_ms, 42);
        assert_eq!(s.forward, 1.0);
        assert_eq!(s.right, -0.5);
        assert!(s.pressed(InputButtons::SPRINT));
        assert!(s.pressed(InputButtons::FIRE));
        assert!(!s.pressed(InputButtons::JUMP));
    }

    #[test]
    fn edges_fire_once_per_press() {
        let mut edges = EdgeDetector::default();
        assert_eq!(edges.update(InputButtons::PLANT), InputButtons::PLANT);
        assert_eq!(edges.update(InputButtons::PLANT), InputButtons::empty());
        assert_eq!(edges.update(InputButtons::empty()), InputButtons::empty());
        assert_eq!(edges.update(InputButtons::PLANT), InputButtons::PLANT);
    }

    #[test]
    fn script_runs_out_to_idle() {
        let mut src = ScriptedInput::new([InputState {
            jump: true,
            ..Default::default()
        }]);
        assert!(src.sample().jump);
        assert_eq!(src.sample(), InputState::default());
    }
}

//! Audio/effects abstraction.
//!
//! Discrete gameplay events are pushed to an [`EffectSink`] by name.
//! Delivery is fire-and-forget; nothing is read back.

use crate::{entity::PlayerId, math::Vec3};

/// A discrete event worth a sound or a particle burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Fired { by: PlayerId, at: Vec3 },
    Hit { target: PlayerId, damage: i32 },
    Death { victim: PlayerId },
    Reload { by: PlayerId },
    Explosion { at: Vec3 },
}

impl Effect {
    /// Stable event name handed to the audio collaborator.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Fired { .. } => "fired",
            Effect::Hit { .. } => "hit",
            Effect::Death { .. } => "death",
            Effect::Reload { .. } => "reload",
            Effect::Explosion { .. } => "explosion",
        }
    }
}

pub trait EffectSink {
    fn play(&mut self, effect: Effect);
}

/// Drops every effect.
#[derive(Default)]
pub struct NullEffects;

impl EffectSink for NullEffects {
    fn play(&mut self, _effect: Effect) {}
}

/// Records effects in order; used by tests and replay tooling.
#[derive(Default, Debug)]
pub struct EffectLog {
    pub events: Vec<Effect>,
}

impl EffectLog {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(Effect::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.name() == name).count()
    }
}

impl EffectSink for EffectLog {
    fn play(&mut self, effect: Effect) {
        self.events.push(effect);
    }
}

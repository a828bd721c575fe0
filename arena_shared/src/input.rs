//! Input samples.
//!
//! An [`InputSample`] is the unit the prediction engine consumes every tick
//! and the server re-simulates. Samples are device-agnostic.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Buttons held during a tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputButtons: u8 {
        const JUMP = 1 << 0;
        const FIRE = 1 << 1;
        const SPRINT = 1 << 2;
        const RELOAD = 1 << 3;
        const PLANT = 1 << 4;
        const DEFUSE = 1 << 5;
    }
}

/// One tick of player input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSample {
    /// Client clock when sampled, milliseconds.
    pub timestamp_ms: u64,
    /// Forward/back axis, -1..=1.
    pub forward: f32,
    /// Strafe axis, -1..=1 (positive is right).
    pub right: f32,
    /// Look delta this tick, radians.
    pub yaw_delta: f32,
    pub pitch_delta: f32,
    #[serde(with = "button_bits")]
    pub buttons: InputButtons,
}

impl InputSample {
    pub fn pressed(&self, button: InputButtons) -> bool {
        self.buttons.contains(button)
    }
}

/// A sample tagged with the client's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequencedInput {
    pub sequence: u32,
    pub sample: InputSample,
}

mod button_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::InputButtons;

    pub fn serialize<S: Serializer>(buttons: &InputButtons, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(buttons.bits())
    }

    // Unknown bits from a newer peer are dropped rather than rejected.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<InputButtons, D::Error> {
        Ok(InputButtons::from_bits_truncate(u8::deserialize(d)?))
    }
}

//! Light-driven mapping: a touch plays the colour shown under the finger.

use super::{LightSnapshot, PolicyOutput, SensorSnapshot};
use crate::theory::hue_to_pitch_class;

/// Never writes lights; the display is only read.
#[derive(Clone, Debug, PartialEq)]
pub struct LightDrivenPolicy {
    octave: i32,
}

impl LightDrivenPolicy {
    pub fn new(octave: i32) -> Self {
        Self { octave }
    }

    pub(crate) fn process(
        &self,
        previous: &SensorSnapshot,
        current: &SensorSnapshot,
        displayed: &LightSnapshot,
    ) -> PolicyOutput {
        let mut output = PolicyOutput::default();
        for channel in current.rising_since(previous) {
            match displayed.hue(channel) {
                Some(hue) => output
                    .pitches
                    .push(hue_to_pitch_class(hue) + self.octave * 12),
                None => log::warn!("[MAPPER] No light reported for channel {}", channel),
            }
        }
        output
    }
}

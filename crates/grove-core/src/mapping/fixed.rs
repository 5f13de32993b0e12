//! Fixed mapping: each channel plays its own note when touched.

use super::{LightCell, LightEffect, PolicyOutput, SensorSnapshot};
use crate::theory::pitch_hue;

#[derive(Clone, Debug, PartialEq)]
pub struct FixedPolicy {
    notes: Vec<i32>,
    octave: i32,
}

impl FixedPolicy {
    pub fn new(notes: Vec<i32>, octave: i32) -> Self {
        Self { notes, octave }
    }

    /// Pitch played by `channel`, if it has a note.
    pub fn pitch(&self, channel: usize) -> Option<i32> {
        self.notes.get(channel).map(|note| note + self.octave * 12)
    }

    pub(crate) fn process(&self, previous: &SensorSnapshot, current: &SensorSnapshot) -> PolicyOutput {
        let mut output = PolicyOutput::default();
        for channel in current.rising_since(previous) {
            let Some(pitch) = self.pitch(channel) else {
                continue;
            };
            let hue = pitch_hue(self.notes[channel]);
            output.pitches.push(pitch);
            output.lights.push((
                channel,
                LightCell::new(hue, 255).with_effect(LightEffect::Flash),
            ));
        }
        output
    }
}

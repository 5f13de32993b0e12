//! Step sequencer: walks the channels on the beat, ignoring the sensors.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{LightSnapshot, PolicyOutput};
use crate::theory::hue_to_pitch_class;

/// Semitone offsets the progression source cycles through.
pub const PROGRESSION: [i32; 8] = [0, 2, 4, 7, 9, 12, 14, 16];

/// Where a step's pitch comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    /// A fixed rising progression.
    #[default]
    Progression,
    /// The hue currently shown at the step's channel.
    Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequencerPolicy {
    channels: usize,
    source: StepSource,
    octave: i32,
    interval: Duration,
    step: usize,
    next_step_at: Option<Instant>,
}

impl SequencerPolicy {
    /// One step per beat at `bpm`.
    pub fn new(channels: usize, source: StepSource, octave: i32, bpm: f64) -> Self {
        Self {
            channels: channels.max(1),
            source,
            octave,
            interval: Duration::from_secs_f64(60.0 / bpm.max(1.0)),
            step: 0,
            next_step_at: None,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Emits step 0 on the first call, then one note each time a beat
    /// interval has elapsed. If the caller falls more than a beat behind the
    /// schedule restarts from `now` instead of replaying missed steps.
    pub(crate) fn process(&mut self, displayed: &LightSnapshot, now: Instant) -> PolicyOutput {
        let mut output = PolicyOutput::default();
        match self.next_step_at {
            None => {
                self.next_step_at = Some(now + self.interval);
            }
            Some(due) if now >= due => {
                self.step = (self.step + 1) % self.channels;
                let mut next = due + self.interval;
                if now >= next {
                    log::debug!("[SEQUENCER] Fell behind, resyncing");
                    next = now + self.interval;
                }
                self.next_step_at = Some(next);
            }
            Some(_) => return output,
        }
        if let Some(pitch) = self.pitch(self.step, displayed) {
            log::trace!("[SEQUENCER] Step {} -> {}", self.step, pitch);
            output.pitches.push(pitch);
        }
        output
    }

    fn pitch(&self, step: usize, displayed: &LightSnapshot) -> Option<i32> {
        let base = self.octave * 12;
        match self.source {
            StepSource::Progression => Some(base + PROGRESSION[step % PROGRESSION.len()]),
            StepSource::Color => displayed
                .hue(step)
                .map(|hue| base + hue_to_pitch_class(hue)),
        }
    }
}

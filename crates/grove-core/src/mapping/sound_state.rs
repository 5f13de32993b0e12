//! The rotation policies' local view of the sound.
//!
//! Rotation policies step through values (next instrument, next scale, key
//! up a fourth ...) starting from where they last left off, so they keep
//! their own copy of the rotatable parameters and report each step as a
//! [`Parameter`] for the composer.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::music::{Layer, LayerMap};
use crate::state::{MusicalState, Parameter};
use crate::theory::{BaselineStyle, ScaleId, MELODIES};
use crate::timing::TempoRange;

/// Key changes wrap within the octave above this pitch.
pub const KEY_CENTER: i32 = 60;

/// What holding or touching a rotation channel does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// `i`: next instrument in the catalog, one layer at a time.
    Instrument,
    /// `t`: tempo up by the step, bouncing back down at the range limit.
    Tempo,
    /// `t+`
    TempoUp,
    /// `t-`
    TempoDown,
    /// `k+`: up a fourth.
    KeyUp,
    /// `k-`: down a major third.
    KeyDown,
    /// `m`
    Melody,
    /// `s`
    Scale,
    /// `b`
    Baseline,
}

impl Role {
    pub fn code(self) -> &'static str {
        match self {
            Role::Instrument => "i",
            Role::Tempo => "t",
            Role::TempoUp => "t+",
            Role::TempoDown => "t-",
            Role::KeyUp => "k+",
            Role::KeyDown => "k-",
            Role::Melody => "m",
            Role::Scale => "s",
            Role::Baseline => "b",
        }
    }

    /// Parse a list of role codes. An empty string or `-` leaves the
    /// channel unassigned.
    pub fn parse_all(codes: &[String]) -> Result<Vec<Option<Role>>> {
        codes
            .iter()
            .map(|code| match code.trim() {
                "" | "-" => Ok(None),
                code => code.parse().map(Some),
            })
            .collect()
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "i" => Role::Instrument,
            "t" => Role::Tempo,
            "t+" => Role::TempoUp,
            "t-" => Role::TempoDown,
            "k+" => Role::KeyUp,
            "k-" => Role::KeyDown,
            "m" => Role::Melody,
            "s" => Role::Scale,
            "b" => Role::Baseline,
            other => return Err(Error::Config(format!("unknown channel role '{}'", other))),
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Rotatable parameters plus the cursors that drive the rotation.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundState {
    pub instruments: LayerMap<String>,
    pub bpm: f64,
    pub key: i32,
    pub scale: ScaleId,
    pub melody_pattern: usize,
    pub baseline_style: BaselineStyle,
    catalog: Vec<String>,
    next_instrument_layer: Layer,
    tempo_direction: f64,
    tempo_range: TempoRange,
}

impl SoundState {
    pub fn new(initial: &MusicalState, catalog: Vec<String>, tempo_range: TempoRange) -> Self {
        Self {
            instruments: initial.instruments.clone(),
            bpm: initial.bpm,
            key: initial.key,
            scale: initial.scale,
            melody_pattern: initial.melody_pattern,
            baseline_style: initial.baseline_style,
            catalog,
            next_instrument_layer: Layer::Melody,
            tempo_direction: 1.0,
            tempo_range,
        }
    }

    /// Apply `role` once and return the resulting mutation.
    pub fn rotate(&mut self, role: Role, tempo_step: f64) -> Parameter {
        match role {
            Role::Instrument => self.change_instrument(),
            Role::Tempo => self.bounce_tempo(tempo_step),
            Role::TempoUp => self.step_tempo(tempo_step),
            Role::TempoDown => self.step_tempo(-tempo_step),
            Role::KeyUp => self.change_key(5),
            Role::KeyDown => self.change_key(-4),
            Role::Melody => self.change_melody(),
            Role::Scale => self.change_scale(),
            Role::Baseline => self.change_baseline(),
        }
    }

    /// Advance the next layer's instrument through the catalog, then move
    /// on to the following layer.
    pub fn change_instrument(&mut self) -> Parameter {
        let layer = self.next_instrument_layer;
        if !self.catalog.is_empty() {
            let current = &self.instruments[layer];
            let next = self
                .catalog
                .iter()
                .position(|id| id == current)
                .map_or(0, |i| (i + 1) % self.catalog.len());
            self.instruments[layer] = self.catalog[next].clone();
        }
        self.next_instrument_layer = layer.next();
        Parameter::Instruments(self.instruments.clone())
    }

    /// Move tempo by `delta` in the current direction, reversing direction
    /// when the move would leave the range.
    pub fn bounce_tempo(&mut self, delta: f64) -> Parameter {
        let next = self.bpm + delta * self.tempo_direction;
        if next > self.tempo_range.max {
            self.tempo_direction = -1.0;
        } else if next < self.tempo_range.min {
            self.tempo_direction = 1.0;
        }
        self.bpm = self
            .tempo_range
            .clamp(self.bpm + delta * self.tempo_direction);
        Parameter::Bpm(self.bpm)
    }

    pub fn step_tempo(&mut self, delta: f64) -> Parameter {
        self.bpm = self.tempo_range.clamp(self.bpm + delta);
        Parameter::Bpm(self.bpm)
    }

    /// Shift the key by `delta` semitones, wrapping within the octave above
    /// [`KEY_CENTER`].
    pub fn change_key(&mut self, delta: i32) -> Parameter {
        self.key = KEY_CENTER + (self.key - KEY_CENTER + delta).rem_euclid(12);
        Parameter::Key(self.key)
    }

    pub fn change_melody(&mut self) -> Parameter {
        self.melody_pattern = (self.melody_pattern + 1) % MELODIES.len();
        Parameter::MelodyPattern(self.melody_pattern)
    }

    pub fn change_scale(&mut self) -> Parameter {
        self.scale = self.scale.next();
        Parameter::Scale(self.scale)
    }

    pub fn change_baseline(&mut self) -> Parameter {
        self.baseline_style = self.baseline_style.next();
        Parameter::BaselineStyle(self.baseline_style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound() -> SoundState {
        let initial = MusicalState {
            instruments: LayerMap::new("a".into(), "b".into(), "c".into()),
            ..MusicalState::default()
        };
        SoundState::new(
            &initial,
            vec!["a".into(), "b".into(), "c".into()],
            TempoRange::new(30.0, 200.0),
        )
    }

    #[test]
    fn test_parse_roles() {
        let codes: Vec<String> = ["i", "t+", "", "k-"].iter().map(|s| s.to_string()).collect();
        let roles = Role::parse_all(&codes).unwrap();
        assert_eq!(
            roles,
            vec![Some(Role::Instrument), Some(Role::TempoUp), None, Some(Role::KeyDown)]
        );
        assert!(Role::parse_all(&["x".to_string()]).is_err());
    }

    #[test]
    fn test_instrument_rotation_walks_layers() {
        let mut sound = sound();
        sound.change_instrument();
        sound.change_instrument();
        sound.change_instrument();
        assert_eq!(sound.instruments, LayerMap::new("b".into(), "c".into(), "a".into()));
    }

    #[test]
    fn test_key_wraps_within_octave() {
        let mut sound = sound();
        assert_eq!(sound.change_key(5), Parameter::Key(65));
        assert_eq!(sound.change_key(5), Parameter::Key(70));
        assert_eq!(sound.change_key(5), Parameter::Key(63));
        assert_eq!(sound.change_key(-4), Parameter::Key(71));
    }

    #[test]
    fn test_tempo_bounces_at_limits() {
        let mut sound = sound();
        sound.bpm = 195.0;
        assert_eq!(sound.bounce_tempo(5.0), Parameter::Bpm(200.0));
        assert_eq!(sound.bounce_tempo(5.0), Parameter::Bpm(195.0));
        assert_eq!(sound.bounce_tempo(5.0), Parameter::Bpm(190.0));

        sound.bpm = 35.0;
        assert_eq!(sound.bounce_tempo(5.0), Parameter::Bpm(30.0));
        assert_eq!(sound.bounce_tempo(5.0), Parameter::Bpm(35.0));
    }

    #[test]
    fn test_melody_and_scale_wrap() {
        let mut sound = sound();
        sound.melody_pattern = MELODIES.len() - 1;
        assert_eq!(sound.change_melody(), Parameter::MelodyPattern(0));
        sound.scale = ScaleId::Chromatic;
        assert_eq!(sound.change_scale(), Parameter::Scale(ScaleId::Major));
    }
}

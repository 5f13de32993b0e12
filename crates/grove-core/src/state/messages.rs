//! Parameter mutations.
//!
//! Every change to the musical state requested from outside the composer is
//! a [`Parameter`] value passed to
//! [`Composer::apply`](crate::composer::Composer::apply).

use super::model::MusicalState;
use crate::music::{LayerMap, NoteEvent};
use crate::theory::{BaselineStyle, ScaleId};

/// A named parameter together with its requested value.
#[derive(Clone, Debug, PartialEq)]
pub enum Parameter {
    /// Instrument id per layer.
    Instruments(LayerMap<String>),
    /// Volume per layer.
    Volume(LayerMap<f32>),
    /// Tonic as a MIDI pitch.
    Key(i32),
    /// Tempo in BPM (ramped, not applied instantly).
    Bpm(f64),
    Scale(ScaleId),
    MelodyPattern(usize),
    BaselineStyle(BaselineStyle),
    /// A batch of one-shot notes. Replaces any batch not yet dispatched.
    ReactionNotes(Vec<NoteEvent>),
}

impl Parameter {
    /// Parameter name as used in logs and relay payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Instruments(_) => "instruments",
            Parameter::Volume(_) => "volume",
            Parameter::Key(_) => "key",
            Parameter::Bpm(_) => "bpm",
            Parameter::Scale(_) => "melody_scale",
            Parameter::MelodyPattern(_) => "melody_number",
            Parameter::BaselineStyle(_) => "baseline_style",
            Parameter::ReactionNotes(_) => "reaction_notes",
        }
    }

    /// Whether applying this value would change `state`.
    pub fn differs_from(&self, state: &MusicalState) -> bool {
        match self {
            Parameter::Instruments(instruments) => *instruments != state.instruments,
            Parameter::Volume(volume) => *volume != state.volume,
            Parameter::Key(key) => *key != state.key,
            Parameter::Bpm(bpm) => *bpm != state.bpm,
            Parameter::Scale(scale) => *scale != state.scale,
            Parameter::MelodyPattern(index) => *index != state.melody_pattern,
            Parameter::BaselineStyle(style) => *style != state.baseline_style,
            Parameter::ReactionNotes(notes) => *notes != state.reaction_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_differs_from_equal_values() {
        let state = MusicalState::default();
        assert!(!Parameter::Key(60).differs_from(&state));
        assert!(Parameter::Key(61).differs_from(&state));
        assert!(!Parameter::ReactionNotes(vec![]).differs_from(&state));
        assert!(Parameter::ReactionNotes(vec![NoteEvent::new(60, 1.0, 1.0)]).differs_from(&state));
        assert!(!Parameter::Volume(state.volume.clone()).differs_from(&state));
    }

    #[test]
    fn test_parameter_names() {
        assert_eq!(Parameter::Bpm(100.0).name(), "bpm");
        assert_eq!(Parameter::ReactionNotes(vec![]).name(), "reaction_notes");
    }
}

//! Musical value types shared by voices, mappers and the audio boundary.
//!
//! - [`Layer`] - The three logical parts a pillar plays (melody, harmony, background)
//! - [`LayerMap`] - A per-layer record (volumes, instruments)
//! - [`NoteEvent`] - A single immutable note handed to the audio backend
//! - [`Chord`] - A set of pitches sharing one envelope and duration

use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical musical layer. Each layer has exactly one continuous voice and
/// at most one bound instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Melody,
    Harmony,
    Background,
}

impl Layer {
    /// All layers in their canonical order.
    pub const ALL: [Layer; 3] = [Layer::Melody, Layer::Harmony, Layer::Background];

    /// Lowercase name used in logs and configuration.
    pub fn name(self) -> &'static str {
        match self {
            Layer::Melody => "melody",
            Layer::Harmony => "harmony",
            Layer::Background => "background",
        }
    }

    /// The layer after this one, wrapping around.
    pub fn next(self) -> Layer {
        match self {
            Layer::Melody => Layer::Harmony,
            Layer::Harmony => Layer::Background,
            Layer::Background => Layer::Melody,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value per layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerMap<T> {
    pub melody: T,
    pub harmony: T,
    pub background: T,
}

impl<T> LayerMap<T> {
    pub fn new(melody: T, harmony: T, background: T) -> Self {
        Self {
            melody,
            harmony,
            background,
        }
    }

    /// Build a map by calling `f` for each layer.
    pub fn from_fn(mut f: impl FnMut(Layer) -> T) -> Self {
        Self {
            melody: f(Layer::Melody),
            harmony: f(Layer::Harmony),
            background: f(Layer::Background),
        }
    }

    pub fn get(&self, layer: Layer) -> &T {
        match layer {
            Layer::Melody => &self.melody,
            Layer::Harmony => &self.harmony,
            Layer::Background => &self.background,
        }
    }

    pub fn get_mut(&mut self, layer: Layer) -> &mut T {
        match layer {
            Layer::Melody => &mut self.melody,
            Layer::Harmony => &mut self.harmony,
            Layer::Background => &mut self.background,
        }
    }

    /// Iterate `(layer, value)` pairs in canonical layer order.
    pub fn iter(&self) -> impl Iterator<Item = (Layer, &T)> {
        Layer::ALL.into_iter().map(move |layer| (layer, self.get(layer)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> LayerMap<U> {
        LayerMap {
            melody: f(&self.melody),
            harmony: f(&self.harmony),
            background: f(&self.background),
        }
    }
}

impl<T> std::ops::Index<Layer> for LayerMap<T> {
    type Output = T;

    fn index(&self, layer: Layer) -> &T {
        self.get(layer)
    }
}

impl<T> std::ops::IndexMut<Layer> for LayerMap<T> {
    fn index_mut(&mut self, layer: Layer) -> &mut T {
        self.get_mut(layer)
    }
}

/// How a note is played.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Articulation {
    Staccato,
    Tremolo,
}

/// A single note. Immutable once created; use the `with_*` builders to derive
/// a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch (60 = middle C).
    pub pitch: i32,
    /// Loudness in [0, 1].
    pub velocity: f32,
    /// Length in beats.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub articulation: Option<Articulation>,
}

impl NoteEvent {
    /// Create a note with no articulation.
    pub fn new(pitch: i32, velocity: f32, duration: f64) -> Self {
        Self {
            pitch,
            velocity: velocity.clamp(0.0, 1.0),
            duration: duration.max(0.0),
            articulation: None,
        }
    }

    pub fn with_articulation(mut self, articulation: Articulation) -> Self {
        self.articulation = Some(articulation);
        self
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = velocity.clamp(0.0, 1.0);
        self
    }

    /// Frequency in Hz (A4 = 440).
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.pitch as f64 - 69.0) / 12.0)
    }
}

/// Attack/decay/sustain/release envelope; times in beats, `level` is the peak
/// amplitude in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub level: f32,
}

impl Envelope {
    pub fn adsr(attack: f64, level: f32, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
            level: level.clamp(0.0, 1.0),
        }
    }
}

/// Several pitches played together.
#[derive(Clone, Debug, PartialEq)]
pub struct Chord {
    pub pitches: Vec<i32>,
    pub envelope: Envelope,
    /// Length in beats.
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_map_indexing() {
        let mut volumes = LayerMap::new(1.0, 0.5, 0.3);
        assert_eq!(volumes[Layer::Harmony], 0.5);
        volumes[Layer::Background] = 0.8;
        assert_eq!(volumes.background, 0.8);
        let layers: Vec<Layer> = volumes.iter().map(|(l, _)| l).collect();
        assert_eq!(layers, Layer::ALL.to_vec());
    }

    #[test]
    fn test_layer_next_cycles() {
        assert_eq!(Layer::Melody.next(), Layer::Harmony);
        assert_eq!(Layer::Background.next(), Layer::Melody);
    }

    #[test]
    fn test_note_event_clamps() {
        let note = NoteEvent::new(60, 1.7, -1.0);
        assert_eq!(note.velocity, 1.0);
        assert_eq!(note.duration, 0.0);
        assert!((NoteEvent::new(69, 1.0, 1.0).frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_event_json_shape() {
        let note = NoteEvent::new(72, 0.5, 1.0).with_articulation(Articulation::Staccato);
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("\"articulation\":\"staccato\""));
        let plain = serde_json::to_string(&NoteEvent::new(72, 0.5, 1.0)).unwrap();
        assert!(!plain.contains("articulation"));
    }
}

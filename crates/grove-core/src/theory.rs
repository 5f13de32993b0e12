//! Scales, melodic patterns, key sets and colour/pitch lookups.
//!
//! These tables are data, not structure: the voices and mappers only rely on
//! the lookup functions here.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifies a scale by its interval pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleId {
    Major,
    NaturalMinor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    Pentatonic,
    PentatonicMinor,
    Blues,
    WholeTone,
    Octatonic,
    Chromatic,
}

impl ScaleId {
    /// Rotation order used when a sensor advances the scale.
    pub const ALL: [ScaleId; 15] = [
        ScaleId::Major,
        ScaleId::NaturalMinor,
        ScaleId::Dorian,
        ScaleId::Phrygian,
        ScaleId::Lydian,
        ScaleId::Mixolydian,
        ScaleId::Locrian,
        ScaleId::HarmonicMinor,
        ScaleId::MelodicMinor,
        ScaleId::Pentatonic,
        ScaleId::PentatonicMinor,
        ScaleId::Blues,
        ScaleId::WholeTone,
        ScaleId::Octatonic,
        ScaleId::Chromatic,
    ];

    /// Semitone offsets from the tonic, ascending, within one octave.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ScaleId::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleId::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleId::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleId::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleId::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            ScaleId::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleId::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            ScaleId::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleId::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            ScaleId::Pentatonic => &[0, 2, 4, 7, 9],
            ScaleId::PentatonicMinor => &[0, 3, 5, 7, 10],
            ScaleId::Blues => &[0, 3, 5, 6, 7, 10],
            ScaleId::WholeTone => &[0, 2, 4, 6, 8, 10],
            ScaleId::Octatonic => &[0, 2, 3, 5, 6, 8, 9, 11],
            ScaleId::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    /// Pitch of a (possibly negative or multi-octave) scale degree above `key`.
    pub fn degree_to_pitch(self, key: i32, degree: i32) -> i32 {
        let intervals = self.intervals();
        let len = intervals.len() as i32;
        let octave = degree.div_euclid(len);
        let index = degree.rem_euclid(len) as usize;
        key + intervals[index] + 12 * octave
    }

    /// The scale after this one in [`ScaleId::ALL`], wrapping around.
    pub fn next(self) -> ScaleId {
        let index = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

/// Rhythmic treatment of the background drone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStyle {
    /// One long sustained note.
    Long,
    /// One long note with tremolo.
    Pulsing,
    /// Four short staccato hits.
    Beat,
}

impl BaselineStyle {
    pub const ALL: [BaselineStyle; 3] = [
        BaselineStyle::Long,
        BaselineStyle::Pulsing,
        BaselineStyle::Beat,
    ];

    pub fn next(self) -> BaselineStyle {
        match self {
            BaselineStyle::Long => BaselineStyle::Pulsing,
            BaselineStyle::Pulsing => BaselineStyle::Beat,
            BaselineStyle::Beat => BaselineStyle::Long,
        }
    }
}

/// One melodic step: a scale degree (or a rest) and its length in beats.
pub type MelodyStep = (Option<i32>, f64);

/// Built-in melodic patterns, indexed by `melody_pattern`.
pub const MELODIES: &[&[MelodyStep]] = &[
    &[(Some(0), 0.25), (Some(1), 0.25), (Some(2), 0.25), (Some(3), 0.25), (Some(4), 0.25)],
    &[(Some(4), 0.25), (Some(3), 0.25), (Some(2), 0.25), (Some(1), 0.25), (Some(0), 0.25)],
    &[(Some(0), 0.25), (Some(2), 0.25), (Some(4), 0.25), (Some(-1), 0.5)],
    &[(Some(0), 0.5), (None, 0.25), (Some(5), 0.5), (Some(4), 0.5)],
    &[(Some(4), 0.3), (Some(3), 0.2), (Some(4), 0.3), (Some(3), 0.2), (Some(4), 0.3), (Some(3), 0.2)],
    &[(Some(6), 0.25), (Some(4), 0.25), (Some(2), 0.25), (Some(5), 0.25), (Some(3), 0.25), (Some(1), 0.25)],
    &[(Some(-3), 0.25), (Some(2), 0.25), (Some(6), 0.25)],
    &[(Some(1), 0.25), (Some(2), 0.5), (None, 0.5), (Some(5), 0.25), (Some(4), 0.5)],
    &[(Some(0), 0.125), (Some(1), 0.125), (Some(0), 0.125), (Some(-1), 0.125), (Some(0), 0.125)],
    &[
        (Some(4), 0.125), (Some(-3), 0.125), (Some(3), 0.125), (Some(-2), 0.125),
        (Some(2), 0.125), (Some(-1), 0.125), (Some(1), 0.125), (Some(0), 0.125),
    ],
    &[(Some(0), 0.125), (None, 0.125), (Some(0), 0.25), (None, 0.125), (Some(0), 0.25), (None, 0.125)],
    &[(Some(0), 0.25), (Some(2), 0.25), (Some(4), 0.25), (Some(6), 0.25), (Some(9), 0.25)],
    &[(Some(5), 0.25), (Some(5), 0.25), (Some(5), 0.25), (Some(0), 0.25)],
    &[(Some(7), 0.125), (Some(6), 0.125), (Some(5), 0.125), (Some(2), 0.125), (Some(3), 0.125)],
    &[
        (Some(0), 0.125), (Some(1), 0.125), (Some(2), 0.125), (Some(4), 0.25),
        (Some(5), 0.125), (Some(2), 0.125), (Some(1), 0.25),
    ],
    &[(Some(-4), 0.25), (Some(0), 0.25), (Some(4), 0.25), (Some(8), 0.25), (Some(12), 0.25)],
    &[
        (Some(0), 0.25), (Some(0), 0.25), (Some(4), 0.25), (Some(4), 0.25),
        (Some(5), 0.25), (Some(5), 0.25), (Some(4), 0.5),
    ],
    &[
        (Some(3), 0.25), (Some(3), 0.25), (Some(2), 0.25), (Some(2), 0.25),
        (Some(1), 0.25), (Some(1), 0.25), (Some(0), 0.5),
    ],
    &[(Some(0), 0.875), (Some(-1), 0.125)],
];

/// Fetch a melodic pattern, wrapping out-of-range indices.
pub fn melody(index: usize) -> &'static [MelodyStep] {
    MELODIES[index % MELODIES.len()]
}

/// Hue (0-255) shown for each pitch class, ordered around the circle of fifths
/// so that neighbouring keys get neighbouring colours.
pub const PITCH_CLASS_HUES: [u8; 12] = [
    0,   // C
    150, // C#
    42,  // D
    193, // D#
    85,  // E
    235, // F
    128, // F#
    21,  // G
    171, // G#
    64,  // A
    214, // A#
    107, // B
];

/// Hue used to display a pitch.
pub fn pitch_hue(pitch: i32) -> u8 {
    PITCH_CLASS_HUES[pitch.rem_euclid(12) as usize]
}

/// Quantise a hue into one of 12 equal bins, yielding a pitch class 0-11.
pub fn hue_to_pitch_class(hue: u8) -> i32 {
    (hue as i32 * 12) / 256
}

/// Keys the harmony cycles through: eleven steps around the circle of
/// fifths starting on C3, stopping short of G.
pub fn circle_of_fifths_keys() -> Vec<i32> {
    (0..11).map(|i| 48 + (i * 5) % 12).collect()
}

/// Hands out keys from a fixed set in shuffled order, reshuffling once the set
/// is exhausted. Consecutive keys are never equal, even across a reshuffle.
#[derive(Clone, Debug)]
pub struct KeyShuffle {
    keys: Vec<i32>,
    order: Vec<i32>,
    last: Option<i32>,
}

impl KeyShuffle {
    pub fn new(keys: Vec<i32>) -> Self {
        Self {
            keys,
            order: Vec::new(),
            last: None,
        }
    }

    /// Next key, or `None` if the key set is empty.
    pub fn next_key<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<i32> {
        if self.order.is_empty() {
            self.order = self.keys.clone();
            self.order.shuffle(rng);
            // `order` is consumed from the back.
            if self.order.len() > 1 && self.order.last().copied() == self.last {
                self.order.swap(0, self.keys.len() - 1);
            }
        }
        let key = self.order.pop()?;
        self.last = Some(key);
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_degree_to_pitch_wraps_octaves() {
        let major = ScaleId::Major;
        assert_eq!(major.degree_to_pitch(60, 0), 60);
        assert_eq!(major.degree_to_pitch(60, 4), 67);
        assert_eq!(major.degree_to_pitch(60, 7), 72);
        assert_eq!(major.degree_to_pitch(60, 10), 77);
        assert_eq!(major.degree_to_pitch(60, -1), 59);
        assert_eq!(ScaleId::Pentatonic.degree_to_pitch(60, 5), 72);
    }

    #[test]
    fn test_scale_rotation_wraps() {
        assert_eq!(ScaleId::Major.next(), ScaleId::NaturalMinor);
        assert_eq!(ScaleId::Chromatic.next(), ScaleId::Major);
        assert_eq!(BaselineStyle::Beat.next(), BaselineStyle::Long);
    }

    #[test]
    fn test_intervals_are_ascending_within_octave() {
        for scale in ScaleId::ALL {
            let intervals = scale.intervals();
            assert_eq!(intervals[0], 0);
            assert!(intervals.windows(2).all(|w| w[0] < w[1]), "{scale:?}");
            assert!(*intervals.last().unwrap() < 12);
        }
    }

    #[test]
    fn test_hue_quantisation_bins() {
        assert_eq!(hue_to_pitch_class(0), 0);
        assert_eq!(hue_to_pitch_class(21), 0);
        assert_eq!(hue_to_pitch_class(22), 1);
        assert_eq!(hue_to_pitch_class(127), 5);
        assert_eq!(hue_to_pitch_class(255), 11);
    }

    #[test]
    fn test_pitch_hue_uses_pitch_class() {
        assert_eq!(pitch_hue(60), 0);
        assert_eq!(pitch_hue(67), 21);
        assert_eq!(pitch_hue(-5), pitch_hue(7));
    }

    #[test]
    fn test_circle_of_fifths_keys() {
        let mut keys = circle_of_fifths_keys();
        assert_eq!(keys.len(), 11);
        assert_eq!(keys[0], 48);
        assert_eq!(keys[1], 53);
        assert_eq!(keys[10], 50);
        keys.sort();
        let expected: Vec<i32> = (48..60).filter(|&k| k != 55).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_key_shuffle_never_repeats() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut shuffle = KeyShuffle::new(circle_of_fifths_keys());
        let mut previous = None;
        for _ in 0..200 {
            let key = shuffle.next_key(&mut rng).unwrap();
            assert_ne!(Some(key), previous);
            previous = Some(key);
        }
    }

    #[test]
    fn test_key_shuffle_visits_every_key_per_round() {
        let mut rng = StdRng::seed_from_u64(3);
        let keys = circle_of_fifths_keys();
        let mut shuffle = KeyShuffle::new(keys.clone());
        let mut round: Vec<i32> = (0..keys.len())
            .map(|_| shuffle.next_key(&mut rng).unwrap())
            .collect();
        round.sort();
        let mut expected = keys;
        expected.sort();
        assert_eq!(round, expected);
    }

    #[test]
    fn test_key_shuffle_empty_set() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(KeyShuffle::new(vec![]).next_key(&mut rng), None);
    }

    #[test]
    fn test_melody_index_wraps() {
        assert_eq!(melody(MELODIES.len()), melody(0));
    }
}

//! Musical state model.

use crate::music::{LayerMap, NoteEvent};
use crate::theory::{BaselineStyle, ScaleId};

/// Instrument id meaning "no instrument bound to this layer".
pub const UNSET_INSTRUMENT: &str = "unset";

/// The parameters every voice reads.
///
/// Tempo and harmonic complexity live outside this struct (in the
/// [`TempoClock`](crate::timing::TempoClock) and an atomic counter
/// respectively) so they can be read and updated without the lock.
#[derive(Clone, Debug, PartialEq)]
pub struct MusicalState {
    /// Tonic as a MIDI pitch.
    pub key: i32,
    /// Last requested tempo; the clock ramps towards it.
    pub bpm: f64,
    pub scale: ScaleId,
    /// Index into the melodic pattern table.
    pub melody_pattern: usize,
    pub baseline_style: BaselineStyle,
    /// Per-layer volume in [0, 1].
    pub volume: LayerMap<f32>,
    /// Per-layer instrument id, or [`UNSET_INSTRUMENT`].
    pub instruments: LayerMap<String>,
    /// Reaction notes waiting to be dispatched. Cleared on dispatch.
    pub reaction_queue: Vec<NoteEvent>,
    /// Incremented on every mutation.
    pub version: u64,
}

impl Default for MusicalState {
    fn default() -> Self {
        Self {
            key: 60,
            bpm: 100.0,
            scale: ScaleId::Pentatonic,
            melody_pattern: 0,
            baseline_style: BaselineStyle::Long,
            volume: LayerMap::new(1.0, 0.5, 0.3),
            instruments: LayerMap::from_fn(|_| UNSET_INSTRUMENT.to_string()),
            reaction_queue: Vec::new(),
            version: 0,
        }
    }
}

impl MusicalState {
    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

/// A consistent copy of everything voices can observe, including the
/// lock-free parts.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    pub state: MusicalState,
    /// Tempo the clock reports right now (may be mid-ramp).
    pub tempo: f64,
    /// Ramp destination while a ramp is in progress.
    pub tempo_target: Option<f64>,
    pub harmonic_complexity: u32,
}

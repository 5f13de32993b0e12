//! Backend that only logs.

use std::sync::atomic::{AtomicI32, Ordering};

use super::{AudioBackend, ResourceId};
use crate::error::Result;
use crate::music::{Chord, Layer, NoteEvent};

/// Writes every backend call to the log at info level.
#[derive(Debug)]
pub struct LogBackend {
    next_resource: AtomicI32,
}

impl LogBackend {
    pub fn new() -> Self {
        Self {
            next_resource: AtomicI32::new(1),
        }
    }
}

impl Default for LogBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for LogBackend {
    fn load_instrument(&self, layer: Layer, instrument_id: &str) -> Result<ResourceId> {
        let resource = ResourceId(self.next_resource.fetch_add(1, Ordering::Relaxed));
        log::info!("[AUDIO] Load '{}' for {} as {}", instrument_id, layer, resource);
        Ok(resource)
    }

    fn release_instrument(&self, resource: ResourceId) -> Result<()> {
        log::info!("[AUDIO] Release {}", resource);
        Ok(())
    }

    fn play_note(&self, resource: ResourceId, note: &NoteEvent) -> Result<()> {
        log::info!(
            "[AUDIO] {} note {} vel={:.2} dur={:.2}{}",
            resource,
            note.pitch,
            note.velocity,
            note.duration,
            note.articulation
                .map(|a| format!(" {:?}", a).to_lowercase())
                .unwrap_or_default()
        );
        Ok(())
    }

    fn play_chord(&self, resource: ResourceId, chord: &Chord) -> Result<()> {
        log::info!(
            "[AUDIO] {} chord {:?} level={:.2} dur={:.2}",
            resource,
            chord.pitches,
            chord.envelope.level,
            chord.duration
        );
        Ok(())
    }

    fn set_tempo(&self, bpm: f64) -> Result<()> {
        log::info!("[AUDIO] Tempo {:.1} bpm", bpm);
        Ok(())
    }
}

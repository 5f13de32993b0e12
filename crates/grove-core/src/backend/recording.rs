//! Backend that records calls for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{AudioBackend, ResourceId};
use crate::error::{Error, Result};
use crate::music::{Chord, Layer, NoteEvent};

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Load {
        layer: Layer,
        instrument: String,
        resource: ResourceId,
    },
    Release(ResourceId),
    Note(ResourceId, NoteEvent),
    Chord(ResourceId, Chord),
    Tempo(f64),
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<BackendCall>,
    live: HashMap<ResourceId, Layer>,
}

/// Keeps every call in memory and tracks which resources are still loaded.
#[derive(Debug)]
pub struct RecordingBackend {
    inner: Mutex<Inner>,
    next_resource: AtomicI32,
    fail_notes: AtomicBool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_resource: AtomicI32::new(1),
            fail_notes: AtomicBool::new(false),
        }
    }

    /// Make `play_note` and `play_chord` fail until switched off again.
    pub fn set_fail_notes(&self, fail: bool) {
        self.fail_notes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Notes played on any resource, in call order.
    pub fn notes(&self) -> Vec<NoteEvent> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Note(_, note) => Some(note.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn chords(&self) -> Vec<Chord> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Chord(_, chord) => Some(chord.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of resources loaded for `layer` and not yet released.
    pub fn live_resources(&self, layer: Layer) -> usize {
        self.lock().live.values().filter(|l| **l == layer).count()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_playable(&self, resource: ResourceId) -> Result<()> {
        if self.fail_notes.load(Ordering::SeqCst) {
            return Err(Error::Backend("playback disabled".to_string()));
        }
        if !self.lock().live.contains_key(&resource) {
            return Err(Error::Backend(format!("{} is not loaded", resource)));
        }
        Ok(())
    }
}

impl AudioBackend for RecordingBackend {
    fn load_instrument(&self, layer: Layer, instrument_id: &str) -> Result<ResourceId> {
        let resource = ResourceId(self.next_resource.fetch_add(1, Ordering::SeqCst));
        let mut inner = self.lock();
        inner.live.insert(resource, layer);
        inner.calls.push(BackendCall::Load {
            layer,
            instrument: instrument_id.to_string(),
            resource,
        });
        Ok(resource)
    }

    fn release_instrument(&self, resource: ResourceId) -> Result<()> {
        let mut inner = self.lock();
        inner.live.remove(&resource);
        inner.calls.push(BackendCall::Release(resource));
        Ok(())
    }

    fn play_note(&self, resource: ResourceId, note: &NoteEvent) -> Result<()> {
        self.check_playable(resource)?;
        self.lock().calls.push(BackendCall::Note(resource, note.clone()));
        Ok(())
    }

    fn play_chord(&self, resource: ResourceId, chord: &Chord) -> Result<()> {
        self.check_playable(resource)?;
        self.lock()
            .calls
            .push(BackendCall::Chord(resource, chord.clone()));
        Ok(())
    }

    fn set_tempo(&self, bpm: f64) -> Result<()> {
        self.lock().calls.push(BackendCall::Tempo(bpm));
        Ok(())
    }
}

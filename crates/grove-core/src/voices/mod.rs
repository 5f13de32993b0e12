//! Continuous voices and reaction notes.
//!
//! Each continuous voice runs exactly one cycle per thread and then returns;
//! the [`Composer`](crate::composer::Composer) supervisor starts the next
//! cycle on a later tick. Waits are the only suspension points. They end
//! early when the composer shuts down, in which case the cycle returns at
//! its next wait.
//!
//! - [`harmony`] - One chord per cycle on a freshly shuffled key
//! - [`melody`] - One pass through the active melodic pattern
//! - [`background`] - A low drone two octaves below the key
//! - [`reaction`] - One-shot notes with a bounded lifetime

pub mod background;
pub mod harmony;
pub mod melody;
pub mod reaction;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::backend::AudioBackend;
use crate::instruments::InstrumentRegistry;
use crate::music::{Chord, Layer, NoteEvent};
use crate::state::SharedState;
use crate::theory::KeyShuffle;

/// Everything a voice thread needs. Shared by all voice and reaction threads.
pub struct VoiceContext {
    pub state: SharedState,
    pub registry: Arc<InstrumentRegistry>,
    pub backend: Arc<dyn AudioBackend>,
    /// Length of one harmony chord in beats.
    pub chord_beats: f64,
    keys: Mutex<KeyShuffle>,
    shutdown: Receiver<()>,
}

impl VoiceContext {
    /// `shutdown` is never sent on; dropping its sender ends every wait.
    pub fn new(
        state: SharedState,
        registry: Arc<InstrumentRegistry>,
        backend: Arc<dyn AudioBackend>,
        chord_beats: f64,
        keys: KeyShuffle,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            state,
            registry,
            backend,
            chord_beats,
            keys: Mutex::new(keys),
            shutdown,
        }
    }

    /// Next harmony key from the shuffle, or the current key if the set is
    /// empty.
    pub fn next_key<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        let next = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_key(rng);
        next.unwrap_or_else(|| self.state.key())
    }

    /// Sleep for `duration`. Returns `false` if the composer is shutting down.
    pub fn wait(&self, duration: Duration) -> bool {
        matches!(
            self.shutdown.recv_timeout(duration),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Sleep for `beats` at the current tempo.
    pub fn wait_beats(&self, beats: f64) -> bool {
        self.wait(self.state.clock().beats_to_duration(beats))
    }

    /// Disconnects when the composer shuts down.
    pub(crate) fn shutdown_signal(&self) -> &Receiver<()> {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        !self.wait(Duration::ZERO)
    }

    /// Play `note` on whatever `layer` is bound to right now. Failures are
    /// logged and the note is lost.
    pub fn play_note(&self, layer: Layer, note: &NoteEvent) {
        let Some(resource) = self.registry.resource(layer) else {
            log::trace!("[VOICE] {} has no instrument, dropping note {}", layer, note.pitch);
            return;
        };
        log::trace!("[VOICE] {} note {} ({:.2} beats)", layer, note.pitch, note.duration);
        if let Err(e) = self.backend.play_note(resource, note) {
            log::error!("[VOICE] {} lost note {}: {}", layer, note.pitch, e);
        }
    }

    /// Play `chord` on whatever `layer` is bound to right now.
    pub fn play_chord(&self, layer: Layer, chord: &Chord) {
        let Some(resource) = self.registry.resource(layer) else {
            log::trace!("[VOICE] {} has no instrument, dropping chord", layer);
            return;
        };
        log::trace!("[VOICE] {} chord {:?}", layer, chord.pitches);
        if let Err(e) = self.backend.play_chord(resource, chord) {
            log::error!("[VOICE] {} lost chord {:?}: {}", layer, chord.pitches, e);
        }
    }
}

impl std::fmt::Debug for VoiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceContext")
            .field("state", &self.state)
            .field("chord_beats", &self.chord_beats)
            .finish_non_exhaustive()
    }
}

/// Run one cycle of the continuous voice for `layer`.
pub fn run_cycle(layer: Layer, ctx: &VoiceContext) {
    match layer {
        Layer::Melody => melody::run_cycle(ctx),
        Layer::Harmony => harmony::run_cycle(ctx, &mut rand::rng()),
        Layer::Background => background::run_cycle(ctx),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::fast_context;
    use super::*;

    #[test]
    fn test_wait_ends_on_shutdown() {
        let (ctx, _backend, tx) = fast_context();
        assert!(ctx.wait(Duration::from_millis(1)));
        assert!(!ctx.is_shutting_down());
        drop(tx);
        assert!(!ctx.wait(Duration::from_secs(60)));
        assert!(ctx.is_shutting_down());
    }

    #[test]
    fn test_play_note_survives_backend_failure() {
        let (ctx, backend, _tx) = fast_context();
        backend.set_fail_notes(true);
        ctx.play_note(Layer::Melody, &NoteEvent::new(60, 1.0, 1.0));
        backend.set_fail_notes(false);
        ctx.play_note(Layer::Melody, &NoteEvent::new(62, 1.0, 1.0));
        assert_eq!(backend.notes().len(), 1);
    }
}

//! The voice scheduler.
//!
//! The [`Composer`] owns the shared musical state and is the only way to
//! change it from outside. It supervises one thread per continuous voice and
//! a pool of reaction threads:
//!
//! - [`Composer::apply`] changes one parameter if the value is new
//! - [`Composer::tick`] dispatches queued reactions and restarts any voice
//!   whose previous cycle has finished, never starting a second copy of a
//!   voice that is still running

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::backend::AudioBackend;
use crate::error::{Error, Result};
use crate::instruments::InstrumentRegistry;
use crate::music::{Layer, LayerMap};
use crate::state::{MusicalState, Parameter, SharedState, StateSnapshot};
use crate::theory::{circle_of_fifths_keys, KeyShuffle};
use crate::timing::{TempoClock, TempoRange};
use crate::voices::reaction::{ReactionLimits, ReactionPool};
use crate::voices::{self, VoiceContext};

/// Tunables for the composer.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposerSettings {
    /// Interactions stop raising harmonic complexity at this value.
    pub max_complexity: u32,
    /// Length of a harmony chord in beats.
    pub chord_beats: f64,
    pub tempo_range: TempoRange,
    /// How long a tempo change takes to ramp in.
    pub tempo_ramp: Duration,
    pub reactions: ReactionLimits,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            max_complexity: 4,
            chord_beats: 4.0,
            tempo_range: TempoRange::default(),
            tempo_ramp: Duration::from_millis(200),
            reactions: ReactionLimits::default(),
        }
    }
}

/// Voice scheduler and sole writer of the musical state.
pub struct Composer {
    state: SharedState,
    ctx: Arc<VoiceContext>,
    settings: ComposerSettings,
    voices: LayerMap<Option<JoinHandle<()>>>,
    starts: LayerMap<u64>,
    reactions: ReactionPool,
    /// Dropped to end every voice wait.
    shutdown: Option<Sender<()>>,
}

impl Composer {
    /// Create a composer and bind the initial instruments.
    ///
    /// Fails on an instrument outside `catalog`, a tempo outside the range
    /// or a backend that refuses the initial instruments.
    pub fn new(
        initial: MusicalState,
        catalog: Vec<String>,
        backend: Arc<dyn AudioBackend>,
        settings: ComposerSettings,
    ) -> Result<Self> {
        let range = settings.tempo_range;
        if range.min <= 0.0 || range.min > range.max {
            return Err(Error::Config(format!(
                "invalid tempo range {}..{}",
                range.min, range.max
            )));
        }
        if !(range.min..=range.max).contains(&initial.bpm) {
            return Err(Error::Config(format!(
                "bpm {} outside {}..{}",
                initial.bpm, range.min, range.max
            )));
        }

        let registry = Arc::new(InstrumentRegistry::new(catalog, backend.clone()));
        for (layer, id) in initial.instruments.iter() {
            if !registry.is_known(id) {
                return Err(Error::Config(format!(
                    "unknown instrument '{}' for layer {}",
                    id, layer
                )));
            }
        }
        for (layer, id) in initial.instruments.iter() {
            registry.bind(layer, id)?;
        }
        backend.set_tempo(initial.bpm)?;

        let clock = TempoClock::new(initial.bpm, range);
        let state = SharedState::new(initial, clock);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let ctx = Arc::new(VoiceContext::new(
            state.clone(),
            registry,
            backend,
            settings.chord_beats,
            KeyShuffle::new(circle_of_fifths_keys()),
            shutdown_rx,
        ));

        log::info!(
            "[COMPOSER] Ready: key={} bpm={:.1} instruments={:?}",
            state.key(),
            state.tempo(),
            state.with_state_read(|s| s.instruments.clone())
        );

        Ok(Self {
            state,
            ctx,
            reactions: ReactionPool::new(settings.reactions),
            settings,
            voices: LayerMap::from_fn(|_| None),
            starts: LayerMap::new(0, 0, 0),
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.ctx.registry
    }

    pub fn settings(&self) -> &ComposerSettings {
        &self.settings
    }

    /// Apply a parameter change.
    ///
    /// Does nothing and returns `false` when the value equals the current
    /// one. Otherwise the change counts as an interaction and raises harmonic
    /// complexity (up to the cap).
    pub fn apply(&mut self, parameter: Parameter) -> bool {
        let parameter = match parameter {
            Parameter::Bpm(bpm) => Parameter::Bpm(self.settings.tempo_range.clamp(bpm)),
            Parameter::Volume(volume) => Parameter::Volume(volume.map(|v| v.clamp(0.0, 1.0))),
            other => other,
        };
        if !self.state.with_state_read(|s| parameter.differs_from(s)) {
            log::trace!("[COMPOSER] {} unchanged", parameter.name());
            return false;
        }
        if let Parameter::Instruments(requested) = &parameter {
            if !self.swap_instruments(requested) {
                log::debug!("[COMPOSER] No requested instrument could be bound");
                return false;
            }
        }

        let complexity = self.state.excite(self.settings.max_complexity);
        log::debug!(
            "[COMPOSER] {} changed (complexity {})",
            parameter.name(),
            complexity
        );

        match parameter {
            Parameter::Instruments(_) => {}
            Parameter::Volume(volume) => self.state.with_state_write(|s| s.volume = volume),
            Parameter::Key(key) => self.state.with_state_write(|s| s.key = key),
            Parameter::Bpm(bpm) => {
                self.state.with_state_write(|s| s.bpm = bpm);
                self.state.clock().set_target(bpm, self.settings.tempo_ramp);
                if let Err(e) = self.ctx.backend.set_tempo(bpm) {
                    log::warn!("[COMPOSER] Backend rejected tempo {:.1}: {}", bpm, e);
                }
            }
            Parameter::Scale(scale) => self.state.with_state_write(|s| s.scale = scale),
            Parameter::MelodyPattern(index) => {
                self.state.with_state_write(|s| s.melody_pattern = index)
            }
            Parameter::BaselineStyle(style) => {
                self.state.with_state_write(|s| s.baseline_style = style)
            }
            Parameter::ReactionNotes(notes) => {
                let superseded = self
                    .state
                    .with_state_write(|s| std::mem::replace(&mut s.reaction_queue, notes));
                if !superseded.is_empty() {
                    log::debug!(
                        "[COMPOSER] Dropped {} undispatched reaction notes",
                        superseded.len()
                    );
                }
            }
        }
        true
    }

    /// Bind every requested instrument the catalog knows. Returns whether
    /// any layer ended up bound to something new.
    fn swap_instruments(&self, requested: &LayerMap<String>) -> bool {
        let registry = &self.ctx.registry;
        let previous = self.state.with_state_read(|s| s.instruments.clone());
        let mut bound = previous.clone();
        for (layer, id) in requested.iter() {
            match registry.bind(layer, id) {
                Ok(_) => bound[layer] = id.clone(),
                Err(e) => {
                    log::warn!("[COMPOSER] {}; keeping '{}'", e, bound[layer]);
                    bound[layer] = registry.bound(layer);
                }
            }
        }
        if bound == previous {
            return false;
        }
        self.state.with_state_write(|s| s.instruments = bound);
        true
    }

    /// Dispatch pending reactions and keep one cycle of every voice running.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        if self.shutdown.is_none() {
            return;
        }

        for note in self.state.take_reaction_queue() {
            self.reactions.dispatch(&self.ctx, note, now);
        }
        self.reactions.prune(now);

        for layer in Layer::ALL {
            if matches!(&self.voices[layer], Some(handle) if !handle.is_finished()) {
                continue;
            }
            if let Some(handle) = self.voices[layer].take() {
                if handle.join().is_err() {
                    log::error!("[COMPOSER] {} voice panicked, restarting", layer);
                }
            }
            self.start_voice(layer);
        }
    }

    fn start_voice(&mut self, layer: Layer) {
        let ctx = Arc::clone(&self.ctx);
        let spawned = thread::Builder::new()
            .name(format!("grove-{}", layer))
            .spawn(move || voices::run_cycle(layer, &ctx));
        match spawned {
            Ok(handle) => {
                self.voices[layer] = Some(handle);
                self.starts[layer] += 1;
                log::trace!("[COMPOSER] Started {} cycle {}", layer, self.starts[layer]);
            }
            Err(e) => log::error!("[COMPOSER] Could not start {} voice: {}", layer, e),
        }
    }

    /// Whether a cycle of `layer` is currently running.
    pub fn is_running(&self, layer: Layer) -> bool {
        self.voices[layer]
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// How many cycles of `layer` have been started.
    pub fn voice_starts(&self, layer: Layer) -> u64 {
        self.starts[layer]
    }

    pub fn active_reactions(&self) -> usize {
        self.reactions.active()
    }

    /// Stop restarting voices, end their current waits, join them and
    /// release every instrument. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.shutdown.take().is_none() {
            return;
        }
        log::info!("[COMPOSER] Stopping voices");
        for layer in Layer::ALL {
            if let Some(handle) = self.voices[layer].take() {
                if handle.join().is_err() {
                    log::error!("[COMPOSER] {} voice panicked", layer);
                }
            }
        }
        self.reactions.join_all();
        self.ctx.registry.release_all();
    }
}

impl Drop for Composer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("reactions", &self.reactions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::instruments::default_catalog;
    use crate::music::NoteEvent;
    use crate::theory::ScaleId;

    fn settings(max_bpm: f64) -> ComposerSettings {
        ComposerSettings {
            tempo_range: TempoRange::new(30.0, max_bpm),
            ..ComposerSettings::default()
        }
    }

    fn initial(bpm: f64) -> MusicalState {
        MusicalState {
            bpm,
            instruments: LayerMap::new("piano".into(), "strings".into(), "cello".into()),
            ..MusicalState::default()
        }
    }

    fn composer(bpm: f64) -> (Composer, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        let composer = Composer::new(
            initial(bpm),
            default_catalog(),
            backend.clone(),
            settings(bpm.max(200.0)),
        )
        .unwrap();
        (composer, backend)
    }

    #[test]
    fn test_new_rejects_unknown_instrument() {
        let mut state = initial(100.0);
        state.instruments.harmony = "kazoo".into();
        let err = Composer::new(
            state,
            default_catalog(),
            Arc::new(RecordingBackend::new()),
            ComposerSettings::default(),
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_new_rejects_bpm_outside_range() {
        let err = Composer::new(
            initial(500.0),
            default_catalog(),
            Arc::new(RecordingBackend::new()),
            ComposerSettings::default(),
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_apply_equal_value_is_noop() {
        let (mut composer, backend) = composer(100.0);
        let calls = backend.calls().len();
        let version = composer.state().version();

        assert!(!composer.apply(Parameter::Key(60)));
        assert!(!composer.apply(Parameter::Instruments(LayerMap::new(
            "piano".into(),
            "strings".into(),
            "cello".into()
        ))));
        assert!(!composer.apply(Parameter::ReactionNotes(vec![])));

        assert_eq!(backend.calls().len(), calls);
        assert_eq!(composer.state().version(), version);
        assert_eq!(composer.state().harmonic_complexity(), 0);
    }

    #[test]
    fn test_complexity_capped() {
        let (mut composer, _backend) = composer(100.0);
        for key in 61..75 {
            assert!(composer.apply(Parameter::Key(key)));
        }
        assert_eq!(composer.state().harmonic_complexity(), 4);
    }

    #[test]
    fn test_instrument_swap_and_unknown_id() {
        let (mut composer, backend) = composer(100.0);
        let changed = composer.apply(Parameter::Instruments(LayerMap::new(
            "harp".into(),
            "kazoo".into(),
            "cello".into(),
        )));
        assert!(changed);

        let state = composer.snapshot().state;
        assert_eq!(state.instruments.melody, "harp");
        assert_eq!(state.instruments.harmony, "strings");
        assert_eq!(state.instruments.background, "cello");
        for layer in Layer::ALL {
            assert_eq!(backend.live_resources(layer), 1);
        }
    }

    #[test]
    fn test_all_unknown_instruments_is_not_a_change() {
        let (mut composer, backend) = composer(100.0);
        let calls = backend.calls().len();
        let version = composer.state().version();

        let changed = composer.apply(Parameter::Instruments(LayerMap::new(
            "kazoo".into(),
            "theremin".into(),
            "cello".into(),
        )));
        assert!(!changed);
        assert_eq!(composer.state().harmonic_complexity(), 0);
        assert_eq!(composer.state().version(), version);
        assert_eq!(backend.calls().len(), calls);
        assert_eq!(composer.snapshot().state.instruments, initial(100.0).instruments);
    }

    #[test]
    fn test_bpm_ramps_and_clamps() {
        let (mut composer, backend) = composer(100.0);
        assert!(composer.apply(Parameter::Bpm(500.0)));
        let snapshot = composer.snapshot();
        assert_eq!(snapshot.state.bpm, 200.0);
        assert!(snapshot.tempo < 200.0);
        assert!(backend.calls().contains(&BackendCall::Tempo(200.0)));
        // Same value after clamping.
        assert!(!composer.apply(Parameter::Bpm(300.0)));
    }

    #[test]
    fn test_other_parameters_are_written() {
        let (mut composer, _backend) = composer(100.0);
        composer.apply(Parameter::Scale(ScaleId::Blues));
        composer.apply(Parameter::MelodyPattern(5));
        composer.apply(Parameter::Volume(LayerMap::new(2.0, 0.2, 0.1)));
        let state = composer.snapshot().state;
        assert_eq!(state.scale, ScaleId::Blues);
        assert_eq!(state.melody_pattern, 5);
        assert_eq!(state.volume.melody, 1.0);
        assert_eq!(state.volume.harmony, 0.2);
    }

    #[test]
    fn test_tick_never_duplicates_running_voice() {
        let (mut composer, _backend) = composer(100.0);
        for _ in 0..5 {
            composer.tick();
        }
        for layer in Layer::ALL {
            assert_eq!(composer.voice_starts(layer), 1);
            assert!(composer.is_running(layer));
        }
        composer.stop();
        for layer in Layer::ALL {
            assert!(!composer.is_running(layer));
        }
        composer.tick();
        assert_eq!(composer.voice_starts(Layer::Melody), 1);
    }

    #[test]
    fn test_tick_restarts_finished_voices() {
        let (mut composer, backend) = composer(60_000.0);
        composer.tick();
        thread::sleep(Duration::from_millis(300));
        composer.tick();
        for layer in Layer::ALL {
            assert_eq!(composer.voice_starts(layer), 2);
        }
        composer.stop();
        assert_eq!(backend.chords().len(), 2);
    }

    #[test]
    fn test_reaction_batches_supersede() {
        let (mut composer, backend) = composer(100.0);
        let batch = |pitches: &[i32]| {
            Parameter::ReactionNotes(pitches.iter().map(|&p| NoteEvent::new(p, 1.0, 1.0)).collect())
        };
        assert!(composer.apply(batch(&[100, 104])));
        assert!(composer.apply(batch(&[107])));
        composer.tick();
        assert!(composer.snapshot().state.reaction_queue.is_empty());
        composer.stop();

        let reactions: Vec<i32> = backend
            .notes()
            .iter()
            .map(|n| n.pitch)
            .filter(|&p| p >= 100)
            .collect();
        assert_eq!(reactions, vec![107]);
    }

    #[test]
    fn test_stop_releases_instruments() {
        let (mut composer, backend) = composer(100.0);
        composer.tick();
        composer.stop();
        for layer in Layer::ALL {
            assert_eq!(backend.live_resources(layer), 0);
        }
    }
}

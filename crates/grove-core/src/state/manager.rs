//! Thread-safe access to the musical state.
//!
//! The [`SharedState`] wraps [`MusicalState`] in an `Arc<RwLock>` so voices
//! can read concurrently while the composer writes. Harmonic complexity is a
//! separate atomic so harmony cycles can consume it without taking the lock,
//! and tempo is owned by the [`TempoClock`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use super::model::{MusicalState, StateSnapshot};
use crate::music::{Layer, NoteEvent};
use crate::theory::{BaselineStyle, ScaleId};
use crate::timing::TempoClock;

/// Shared handle to the single musical state of a pillar.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct SharedState {
    state: Arc<RwLock<MusicalState>>,
    complexity: Arc<AtomicU32>,
    clock: Arc<TempoClock>,
}

impl SharedState {
    pub fn new(state: MusicalState, clock: TempoClock) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            complexity: Arc::new(AtomicU32::new(0)),
            clock: Arc::new(clock),
        }
    }

    /// Read the state with a closure.
    pub fn with_state_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&MusicalState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Write to the state with a closure. Bumps the version.
    ///
    /// Only the composer and the voices mutate state; outside callers go
    /// through [`Composer::apply`](crate::composer::Composer::apply).
    pub(crate) fn with_state_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut MusicalState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        state.bump_version();
        result
    }

    pub fn clock(&self) -> &Arc<TempoClock> {
        &self.clock
    }

    pub fn key(&self) -> i32 {
        self.with_state_read(|s| s.key)
    }

    pub fn scale(&self) -> ScaleId {
        self.with_state_read(|s| s.scale)
    }

    pub fn melody_pattern(&self) -> usize {
        self.with_state_read(|s| s.melody_pattern)
    }

    pub fn baseline_style(&self) -> BaselineStyle {
        self.with_state_read(|s| s.baseline_style)
    }

    pub fn volume(&self, layer: Layer) -> f32 {
        self.with_state_read(|s| s.volume[layer])
    }

    pub fn instrument(&self, layer: Layer) -> String {
        self.with_state_read(|s| s.instruments[layer].clone())
    }

    /// Current tempo as reported by the clock.
    pub fn tempo(&self) -> f64 {
        self.clock.current_tempo()
    }

    pub fn version(&self) -> u64 {
        self.with_state_read(|s| s.version)
    }

    /// Set the shared key without counting as an interaction.
    pub(crate) fn set_key(&self, key: i32) {
        self.with_state_write(|s| s.key = key);
    }

    /// Take the pending reaction batch, leaving the queue empty.
    pub(crate) fn take_reaction_queue(&self) -> Vec<NoteEvent> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.reaction_queue.is_empty() {
            return Vec::new();
        }
        state.bump_version();
        std::mem::take(&mut state.reaction_queue)
    }

    pub fn harmonic_complexity(&self) -> u32 {
        self.complexity.load(Ordering::Acquire)
    }

    /// Raise harmonic complexity by one, saturating at `max`. Returns the new
    /// value.
    pub(crate) fn excite(&self, max: u32) -> u32 {
        match self
            .complexity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < max).then_some(c + 1)
            }) {
            Ok(previous) => previous + 1,
            Err(current) => current,
        }
    }

    /// Consume one unit of harmonic complexity. Never goes below zero, even
    /// when several harmony cycles race. Returns the value before consuming.
    pub(crate) fn consume_complexity(&self) -> u32 {
        match self
            .complexity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
        {
            Ok(previous) => previous,
            Err(_) => 0,
        }
    }

    /// Copy of the state plus tempo and complexity.
    pub fn snapshot(&self) -> StateSnapshot {
        let now = Instant::now();
        StateSnapshot {
            state: self.with_state_read(|s| s.clone()),
            tempo: self.clock.current_tempo_at(now),
            tempo_target: self.clock.target_at(now),
            harmonic_complexity: self.harmonic_complexity(),
        }
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("version", &self.version())
            .field("harmonic_complexity", &self.harmonic_complexity())
            .finish_non_exhaustive()
    }
}

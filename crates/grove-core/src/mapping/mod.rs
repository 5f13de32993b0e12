//! Sensor mapping.
//!
//! The [`Mapper`] turns one sensor snapshot per control tick into parameter
//! mutations for the composer, reaction notes, and light updates. Which of
//! those it produces is decided by the pillar's [`MappingPolicy`], chosen
//! once from configuration:
//!
//! - continuous rotation: every held channel steps its role each tick
//! - edge rotation: a channel steps its role once per touch
//! - fixed: a touch plays the channel's note
//! - step sequencer: plays one step per beat whatever the sensors say
//! - light driven: a touch plays the colour displayed on that channel
//!
//! Only the mapper keeps the previous snapshot ([`EdgeState`]); policies are
//! handed both snapshots and only keep their own counters.

mod fixed;
mod light;
mod rotation;
mod sequencer;
mod snapshot;
mod sound_state;

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

pub use fixed::FixedPolicy;
pub use light::LightDrivenPolicy;
pub use rotation::{cool_warm_hue, RotationPolicy};
pub use sequencer::{SequencerPolicy, StepSource, PROGRESSION};
pub use snapshot::{EdgeState, LightCell, LightEffect, LightSnapshot, SensorSnapshot};
pub use sound_state::{Role, SoundState, KEY_CENTER};

use crate::config::MappingConfig;
use crate::error::Result;
use crate::music::NoteEvent;
use crate::state::{MusicalState, Parameter};
use crate::timing::TempoRange;

/// What a policy sees besides the two snapshots.
pub(crate) struct PolicyContext<'a> {
    /// Colours currently on the display.
    pub(crate) displayed: &'a LightSnapshot,
    pub(crate) now: Instant,
    pub(crate) rng: &'a mut StdRng,
}

/// Raw policy result, before pitches become notes.
#[derive(Debug, Default)]
pub(crate) struct PolicyOutput {
    pub(crate) mutations: Vec<Parameter>,
    pub(crate) pitches: Vec<i32>,
    pub(crate) lights: Vec<(usize, LightCell)>,
}

/// Everything a tick produced, in channel order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapperOutput {
    pub mutations: Vec<Parameter>,
    pub notes: Vec<NoteEvent>,
    /// The full light state to write, if anything changed.
    pub lights: Option<LightSnapshot>,
}

impl MapperOutput {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.notes.is_empty() && self.lights.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapperSettings {
    pub channels: usize,
    /// Instrument ids the instrument role cycles through.
    pub catalog: Vec<String>,
    pub tempo_range: TempoRange,
    /// Velocity of emitted reaction notes.
    pub note_velocity: f32,
    /// Duration of emitted reaction notes, in beats.
    pub note_beats: f64,
}

/// The configured policy.
#[derive(Clone, Debug, PartialEq)]
pub enum MappingPolicy {
    ContinuousRotation(RotationPolicy),
    EdgeRotation(RotationPolicy),
    Fixed(FixedPolicy),
    StepSequencer(SequencerPolicy),
    LightDriven(LightDrivenPolicy),
}

impl MappingPolicy {
    pub fn from_config(
        config: &MappingConfig,
        initial: &MusicalState,
        settings: &MapperSettings,
    ) -> Result<Self> {
        config.validate(settings.channels)?;
        let rotation = |roles: &[String], tempo_step: f64| -> Result<RotationPolicy> {
            let sound = SoundState::new(initial, settings.catalog.clone(), settings.tempo_range);
            Ok(RotationPolicy::new(Role::parse_all(roles)?, tempo_step, sound))
        };
        Ok(match config {
            MappingConfig::ContinuousRotation { roles, tempo_step } => {
                MappingPolicy::ContinuousRotation(rotation(roles, *tempo_step)?)
            }
            MappingConfig::EdgeRotation { roles, tempo_step } => {
                MappingPolicy::EdgeRotation(rotation(roles, *tempo_step)?)
            }
            MappingConfig::Fixed { notes, octave } => {
                MappingPolicy::Fixed(FixedPolicy::new(notes.clone(), *octave))
            }
            MappingConfig::StepSequencer { source, octave } => MappingPolicy::StepSequencer(
                SequencerPolicy::new(settings.channels, *source, *octave, initial.bpm),
            ),
            MappingConfig::LightDriven { octave } => {
                MappingPolicy::LightDriven(LightDrivenPolicy::new(*octave))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            MappingPolicy::ContinuousRotation(_) => "continuous_rotation",
            MappingPolicy::EdgeRotation(_) => "edge_rotation",
            MappingPolicy::Fixed(_) => "fixed",
            MappingPolicy::StepSequencer(_) => "step_sequencer",
            MappingPolicy::LightDriven(_) => "light_driven",
        }
    }

    /// Light-driven pillars only read the display.
    pub fn writes_lights(&self) -> bool {
        !matches!(self, MappingPolicy::LightDriven(_))
    }

    fn process(
        &mut self,
        previous: &SensorSnapshot,
        current: &SensorSnapshot,
        ctx: &mut PolicyContext<'_>,
    ) -> PolicyOutput {
        match self {
            MappingPolicy::ContinuousRotation(policy) => policy.process(current.active(), ctx),
            MappingPolicy::EdgeRotation(policy) => {
                policy.process(current.rising_since(previous), ctx)
            }
            MappingPolicy::Fixed(policy) => policy.process(previous, current),
            MappingPolicy::StepSequencer(policy) => policy.process(ctx.displayed, ctx.now),
            MappingPolicy::LightDriven(policy) => policy.process(previous, current, ctx.displayed),
        }
    }
}

/// Per-pillar input processor.
#[derive(Debug)]
pub struct Mapper {
    policy: MappingPolicy,
    settings: MapperSettings,
    edges: EdgeState,
    lights: LightSnapshot,
    lights_written: bool,
    rng: StdRng,
}

impl Mapper {
    /// Build the mapper for a pillar. `seed` makes colours reproducible.
    pub fn new(
        config: &MappingConfig,
        initial: &MusicalState,
        settings: MapperSettings,
        seed: Option<u64>,
    ) -> Result<Self> {
        let policy = MappingPolicy::from_config(config, initial, &settings)?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let lights = LightSnapshot::random(settings.channels, &mut rng);
        log::info!(
            "[MAPPER] {} policy on {} channels",
            policy.name(),
            settings.channels
        );
        Ok(Self {
            policy,
            edges: EdgeState::new(settings.channels),
            settings,
            lights,
            lights_written: false,
            rng,
        })
    }

    pub fn policy(&self) -> &MappingPolicy {
        &self.policy
    }

    pub fn channels(&self) -> usize {
        self.settings.channels
    }

    /// The lights as last written by this mapper.
    pub fn lights(&self) -> &LightSnapshot {
        &self.lights
    }

    /// Map one pair of snapshots. Does not touch the stored edge state.
    ///
    /// `reported` is what the display says it shows; when absent the
    /// mapper's own last write stands in for it.
    pub fn process(
        &mut self,
        previous: &SensorSnapshot,
        current: &SensorSnapshot,
        reported: Option<&LightSnapshot>,
        now: Instant,
    ) -> MapperOutput {
        let raw = {
            let mut ctx = PolicyContext {
                displayed: reported.unwrap_or(&self.lights),
                now,
                rng: &mut self.rng,
            };
            self.policy.process(previous, current, &mut ctx)
        };

        let notes = raw
            .pitches
            .into_iter()
            .map(|pitch| NoteEvent::new(pitch, self.settings.note_velocity, self.settings.note_beats))
            .collect();

        let mut lights_changed = !self.lights_written && self.policy.writes_lights();
        for (channel, cell) in raw.lights {
            self.lights.set(channel, cell);
            lights_changed = true;
        }
        let lights = if lights_changed {
            self.lights_written = true;
            Some(self.lights.clone())
        } else {
            None
        };

        MapperOutput {
            mutations: raw.mutations,
            notes,
            lights,
        }
    }

    /// Map a raw sensor reading against the previous tick's reading.
    pub fn update(
        &mut self,
        raw: Vec<bool>,
        reported: Option<&LightSnapshot>,
        now: Instant,
    ) -> MapperOutput {
        let current = SensorSnapshot::normalize(raw, self.settings.channels);
        let previous = std::mem::replace(&mut self.edges.previous, current.clone());
        self.process(&previous, &current, reported, now)
    }

    /// Same as [`update`](Self::update) with the sensors unchanged since the
    /// last tick; used when a sensor read fails.
    pub fn repeat(&mut self, reported: Option<&LightSnapshot>, now: Instant) -> MapperOutput {
        let current = self.edges.previous.clone();
        self.process(&current, &current, reported, now)
    }
}

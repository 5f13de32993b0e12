//! Grove Core - Voice scheduling and sensor mapping for interactive
//! sound/light pillars.
//!
//! This crate provides the building blocks for a pillar:
//!
//! - **Music** - Notes, chords, layers, scales and melodic patterns
//! - **State** - The shared musical state every voice reads
//! - **Composer** - Voice supervisor and sole writer of the state
//! - **Voices** - Melody, harmony, background and reaction voices
//! - **Instruments** - Per-layer instrument binding with hot swap
//! - **Mapping** - Sensor snapshots to mutations, notes and lights
//! - **Backend** - Audio backends (log, SuperCollider OSC, recording)
//! - **Hardware** - Sensor and light collaborators
//! - **Relay** - Sharing reaction notes between pillars
//! - **Runtime** - The control loop and its thread
//!
//! # Architecture
//!
//! Each control tick the [`Mapper`] diffs the sensor snapshot against the
//! previous one and produces [`Parameter`] mutations and reaction notes. The
//! [`Composer`] applies them (only when a value actually changes) and then
//! makes sure each continuous voice has exactly one cycle running. Voices run
//! on their own threads and read the [`SharedState`] at every step, sizing
//! their waits from the ramping [`TempoClock`].
//!
//! # Feature Flags
//!
//! - `native` (default) - SuperCollider backend over UDP OSC

pub mod backend;
pub mod composer;
pub mod config;
pub mod error;
pub mod hardware;
pub mod instruments;
pub mod mapping;
pub mod music;
pub mod relay;
pub mod runtime;
pub mod state;
pub mod theory;
pub mod timing;
pub mod voices;

// Re-export main types for convenience
pub use backend::{AudioBackend, LogBackend, RecordingBackend, ResourceId};
pub use composer::{Composer, ComposerSettings};
pub use config::{InstallationConfig, MappingConfig, PillarConfig, PillarSettings};
pub use error::{Error, Result};
pub use hardware::{LightSink, LogLightSink, ScriptedSensors, SensorSource, SimulatedSensors};
pub use instruments::InstrumentRegistry;
pub use mapping::{
    LightCell, LightSnapshot, Mapper, MapperOutput, MapperSettings, MappingPolicy, SensorSnapshot,
};
pub use music::{Articulation, Chord, Envelope, Layer, LayerMap, NoteEvent};
pub use relay::{LoopbackBus, LoopbackRelay, Relay, RelayMessage};
pub use runtime::{ControlLoop, ControlMessage, PillarIo, Runtime, RuntimeHandle};
pub use state::{MusicalState, Parameter, SharedState, StateSnapshot};
pub use theory::{BaselineStyle, ScaleId};
pub use timing::{TempoClock, TempoRange};

// Native-only re-exports
#[cfg(feature = "native")]
pub use backend::OscBackend;

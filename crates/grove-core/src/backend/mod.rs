//! Audio backends.
//!
//! The composer never talks to a synthesiser directly. It goes through the
//! [`AudioBackend`] trait, which binds instruments to layers and plays notes
//! and chords on them:
//!
//! - [`LogBackend`] - Logs every call; used for dry runs and on machines
//!   without a synthesis server
//! - [`OscBackend`] - Sends OSC commands to a SuperCollider server
//! - [`RecordingBackend`] - Records calls for inspection in tests

mod logging;
#[cfg(feature = "native")]
mod osc;
mod recording;

pub use self::logging::LogBackend;
#[cfg(feature = "native")]
pub use self::osc::{OscBackend, OscClient};
pub use self::recording::{BackendCall, RecordingBackend};

use std::fmt;

use crate::error::Result;
use crate::music::{Chord, Layer, NoteEvent};

/// Opaque handle to an instrument loaded into a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub i32);

impl ResourceId {
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A sound-producing backend.
///
/// Calls may arrive from several voice threads at once.
pub trait AudioBackend: Send + Sync {
    /// Load instrument `instrument_id` for `layer` and return its handle.
    fn load_instrument(&self, layer: Layer, instrument_id: &str) -> Result<ResourceId>;

    /// Release a handle returned by [`load_instrument`](Self::load_instrument).
    /// Sounding notes on it may be cut off.
    fn release_instrument(&self, resource: ResourceId) -> Result<()>;

    fn play_note(&self, resource: ResourceId, note: &NoteEvent) -> Result<()>;

    fn play_chord(&self, resource: ResourceId, chord: &Chord) -> Result<()>;

    /// Tempo used to convert beat lengths into seconds.
    fn set_tempo(&self, bpm: f64) -> Result<()>;
}

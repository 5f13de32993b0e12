//! Error types for grove.

use crate::music::Layer;
use thiserror::Error;

/// Result type alias for grove operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in grove.
///
/// Only [`Error::Config`], [`Error::UnknownPillar`] and the parse variants are
/// meant to reach the process boundary; everything else is logged and absorbed
/// by the control loop.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is invalid (reported at startup).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration has no section for the requested pillar.
    #[error("Pillar '{0}' is not present in the configuration")]
    UnknownPillar(String),

    /// An instrument id outside the catalog was requested for a layer.
    #[error("Unknown instrument '{instrument}' for layer {layer}")]
    UnknownInstrument { layer: Layer, instrument: String },

    /// The audio backend rejected a call.
    #[error("Audio backend error: {0}")]
    Backend(String),

    /// The inter-pillar relay failed.
    #[error("Relay error: {0}")]
    Relay(String),

    /// Sensor or light hardware failed.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// The control loop has already shut down.
    #[error("Runtime has stopped")]
    Stopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error belongs to the startup (fail fast) class.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::UnknownPillar(_) | Error::TomlParse(_)
        )
    }
}

//! Installation configuration.
//!
//! One TOML file describes every pillar of an installation: shared defaults
//! and tunables at the top, one `[pillars.<id>]` table per pillar. A pillar
//! process calls [`InstallationConfig::resolve`] with its own id to get the
//! merged, validated [`PillarSettings`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::composer::ComposerSettings;
use crate::error::{Error, Result};
use crate::instruments::default_catalog;
use crate::mapping::{MapperSettings, Role, StepSource, PROGRESSION};
use crate::music::LayerMap;
use crate::state::{MusicalState, UNSET_INSTRUMENT};
use crate::theory::{BaselineStyle, ScaleId, MELODIES};
use crate::timing::TempoRange;
use crate::voices::reaction::ReactionLimits;

/// Whole-installation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    /// Known instrument ids, in rotation order.
    pub instruments: Vec<String>,
    pub defaults: DefaultsConfig,
    pub tempo: TempoConfig,
    pub composer: ComposerConfig,
    pub reactions: ReactionConfig,
    pub relay: RelayConfig,
    pub control: ControlConfig,
    pub pillars: BTreeMap<String, PillarConfig>,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            instruments: default_catalog(),
            defaults: DefaultsConfig::default(),
            tempo: TempoConfig::default(),
            composer: ComposerConfig::default(),
            reactions: ReactionConfig::default(),
            relay: RelayConfig::default(),
            control: ControlConfig::default(),
            pillars: BTreeMap::new(),
        }
    }
}

/// Initial musical state shared by all pillars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub key: i32,
    pub bpm: f64,
    pub scale: ScaleId,
    pub melody_pattern: usize,
    pub baseline_style: BaselineStyle,
    pub volume: LayerMap<f32>,
    pub instruments: LayerMap<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let state = MusicalState::default();
        Self {
            key: state.key,
            bpm: state.bpm,
            scale: state.scale,
            melody_pattern: state.melody_pattern,
            baseline_style: state.baseline_style,
            volume: state.volume,
            instruments: LayerMap::new("piano".into(), "pad_warm".into(), "synth_bass".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min: f64,
    pub max: f64,
    /// How long a tempo change takes to ramp in.
    #[serde(with = "humantime_serde")]
    pub ramp: Duration,
}

impl Default for TempoConfig {
    fn default() -> Self {
        let range = TempoRange::default();
        Self {
            min: range.min,
            max: range.max,
            ramp: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub max_complexity: u32,
    pub chord_beats: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_complexity: 4,
            chord_beats: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    pub duration_beats: f64,
    pub velocity: f32,
    pub max_active: usize,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(3),
            duration_beats: 1.0,
            velocity: 1.0,
            max_active: 32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Share reaction notes with the other pillars.
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_rate_hz: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 15.0 }
    }
}

fn default_channels() -> usize {
    4
}

fn default_tempo_step() -> f64 {
    5.0
}

/// One pillar's section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarConfig {
    /// Number of sensor channels.
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<LayerMap<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruments: Option<LayerMap<String>>,
    pub mapping: MappingConfig,
}

/// Which mapping policy a pillar uses, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MappingConfig {
    /// Held channels step their role every tick.
    ContinuousRotation {
        roles: Vec<String>,
        #[serde(default = "default_tempo_step")]
        tempo_step: f64,
    },
    /// Touched channels step their role once per touch.
    EdgeRotation {
        roles: Vec<String>,
        #[serde(default = "default_tempo_step")]
        tempo_step: f64,
    },
    /// A touch plays `notes[channel] + octave * 12`.
    Fixed { notes: Vec<i32>, octave: i32 },
    /// One step per beat across the channels.
    StepSequencer {
        #[serde(default)]
        source: StepSource,
        octave: i32,
    },
    /// A touch plays the colour shown on the touched channel.
    LightDriven { octave: i32 },
}

impl MappingConfig {
    pub fn policy_name(&self) -> &'static str {
        match self {
            MappingConfig::ContinuousRotation { .. } => "continuous_rotation",
            MappingConfig::EdgeRotation { .. } => "edge_rotation",
            MappingConfig::Fixed { .. } => "fixed",
            MappingConfig::StepSequencer { .. } => "step_sequencer",
            MappingConfig::LightDriven { .. } => "light_driven",
        }
    }

    /// Check the policy's parameters against a pillar with `channels`
    /// sensors.
    pub fn validate(&self, channels: usize) -> Result<()> {
        if channels == 0 {
            return Err(Error::Config("a pillar needs at least one channel".into()));
        }
        match self {
            MappingConfig::ContinuousRotation { roles, tempo_step }
            | MappingConfig::EdgeRotation { roles, tempo_step } => {
                if roles.len() > channels {
                    return Err(Error::Config(format!(
                        "{} roles for {} channels",
                        roles.len(),
                        channels
                    )));
                }
                Role::parse_all(roles)?;
                if !(*tempo_step > 0.0 && tempo_step.is_finite()) {
                    return Err(Error::Config(format!("tempo_step {} must be positive", tempo_step)));
                }
            }
            MappingConfig::Fixed { notes, octave } => {
                if notes.len() > channels {
                    return Err(Error::Config(format!(
                        "{} notes for {} channels",
                        notes.len(),
                        channels
                    )));
                }
                for note in notes {
                    check_pitch(note + octave * 12)?;
                }
            }
            MappingConfig::StepSequencer { source, octave } => {
                let highest = match source {
                    StepSource::Progression => PROGRESSION.iter().copied().max().unwrap_or(0),
                    StepSource::Color => 11,
                };
                check_pitch(octave * 12)?;
                check_pitch(octave * 12 + highest)?;
            }
            MappingConfig::LightDriven { octave } => {
                check_pitch(octave * 12)?;
                check_pitch(octave * 12 + 11)?;
            }
        }
        Ok(())
    }
}

fn check_pitch(pitch: i32) -> Result<()> {
    if (0..=127).contains(&pitch) {
        Ok(())
    } else {
        Err(Error::Config(format!("pitch {} outside MIDI range 0..=127", pitch)))
    }
}

/// Everything one pillar process needs, merged and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct PillarSettings {
    pub id: String,
    pub initial: MusicalState,
    pub mapping: MappingConfig,
    pub mapper: MapperSettings,
    pub composer: ComposerSettings,
    pub relay_enabled: bool,
    pub tick_interval: Duration,
}

impl InstallationConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// A small installation with one pillar per mapping policy.
    pub fn example() -> Self {
        let roles = |codes: &[&str]| codes.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let pillar = |mapping| PillarConfig {
            channels: 4,
            bpm: None,
            volume: None,
            instruments: None,
            mapping,
        };

        let mut pillars = BTreeMap::new();
        pillars.insert(
            "pillar-1".to_string(),
            pillar(MappingConfig::EdgeRotation {
                roles: roles(&["i", "t+", "k+", "m"]),
                tempo_step: 10.0,
            }),
        );
        pillars.insert(
            "pillar-2".to_string(),
            pillar(MappingConfig::ContinuousRotation {
                roles: roles(&["t", "k-", "s", "b"]),
                tempo_step: 5.0,
            }),
        );
        pillars.insert(
            "pillar-3".to_string(),
            PillarConfig {
                instruments: Some(LayerMap::new(
                    "marimba".into(),
                    "strings".into(),
                    "cello".into(),
                )),
                ..pillar(MappingConfig::Fixed {
                    notes: vec![0, 2, 4, 7],
                    octave: 5,
                })
            },
        );
        pillars.insert(
            "pillar-4".to_string(),
            PillarConfig {
                bpm: Some(90.0),
                ..pillar(MappingConfig::StepSequencer {
                    source: StepSource::Color,
                    octave: 4,
                })
            },
        );
        pillars.insert(
            "pillar-5".to_string(),
            pillar(MappingConfig::LightDriven { octave: 5 }),
        );

        Self {
            pillars,
            ..Self::default()
        }
    }

    pub fn pillar_ids(&self) -> impl Iterator<Item = &str> {
        self.pillars.keys().map(String::as_str)
    }

    fn catalog(&self) -> Vec<String> {
        if self.instruments.is_empty() {
            default_catalog()
        } else {
            self.instruments.clone()
        }
    }

    /// Merge the defaults with the pillar's overrides and validate.
    pub fn resolve(&self, pillar_id: &str) -> Result<PillarSettings> {
        let pillar = self
            .pillars
            .get(pillar_id)
            .ok_or_else(|| Error::UnknownPillar(pillar_id.to_string()))?;
        let catalog = self.catalog();

        let tempo_range = TempoRange::new(self.tempo.min, self.tempo.max);
        if !(tempo_range.min > 0.0
            && tempo_range.min <= tempo_range.max
            && tempo_range.max.is_finite())
        {
            return Err(Error::Config(format!(
                "tempo range {}..{} is empty, not positive or not finite",
                tempo_range.min, tempo_range.max
            )));
        }

        let defaults = &self.defaults;
        let bpm = pillar.bpm.unwrap_or(defaults.bpm);
        if !(tempo_range.min..=tempo_range.max).contains(&bpm) {
            return Err(Error::Config(format!(
                "pillar '{}': bpm {} outside {}..{}",
                pillar_id, bpm, tempo_range.min, tempo_range.max
            )));
        }

        let volume = pillar.volume.clone().unwrap_or_else(|| defaults.volume.clone());
        for (layer, v) in volume.iter() {
            if !(0.0..=1.0).contains(v) {
                return Err(Error::Config(format!(
                    "pillar '{}': {} volume {} outside 0..=1",
                    pillar_id, layer, v
                )));
            }
        }

        let instruments = pillar
            .instruments
            .clone()
            .unwrap_or_else(|| defaults.instruments.clone());
        for (layer, id) in instruments.iter() {
            if id != UNSET_INSTRUMENT && !catalog.contains(id) {
                return Err(Error::Config(format!(
                    "pillar '{}': unknown instrument '{}' for {}",
                    pillar_id, id, layer
                )));
            }
        }

        if defaults.melody_pattern >= MELODIES.len() {
            return Err(Error::Config(format!(
                "melody_pattern {} out of range (0..{})",
                defaults.melody_pattern,
                MELODIES.len()
            )));
        }

        pillar
            .mapping
            .validate(pillar.channels)
            .map_err(|e| Error::Config(format!("pillar '{}': {}", pillar_id, strip_prefix(&e))))?;

        let tick_rate = self.control.tick_rate_hz;
        if !(tick_rate > 0.0 && tick_rate.is_finite()) {
            return Err(Error::Config(format!("tick_rate_hz {} must be positive", tick_rate)));
        }
        let tick_interval = Duration::try_from_secs_f64(1.0 / tick_rate)
            .map_err(|_| Error::Config(format!("tick_rate_hz {} is too small", tick_rate)))?;
        let chord_beats = self.composer.chord_beats;
        if !(chord_beats > 0.0 && chord_beats.is_finite()) {
            return Err(Error::Config(format!(
                "chord_beats {} must be positive and finite",
                chord_beats
            )));
        }
        let note_beats = self.reactions.duration_beats;
        if !(note_beats > 0.0 && note_beats.is_finite()) {
            return Err(Error::Config(format!(
                "reactions.duration_beats {} must be positive and finite",
                note_beats
            )));
        }
        if !self.reactions.velocity.is_finite() {
            return Err(Error::Config("reactions.velocity must be finite".into()));
        }
        if self.reactions.max_active == 0 {
            return Err(Error::Config("reactions.max_active must be at least 1".into()));
        }

        let initial = MusicalState {
            key: defaults.key,
            bpm,
            scale: defaults.scale,
            melody_pattern: defaults.melody_pattern,
            baseline_style: defaults.baseline_style,
            volume,
            instruments,
            ..MusicalState::default()
        };

        Ok(PillarSettings {
            id: pillar_id.to_string(),
            initial,
            mapping: pillar.mapping.clone(),
            mapper: MapperSettings {
                channels: pillar.channels,
                catalog: catalog.clone(),
                tempo_range,
                note_velocity: self.reactions.velocity.clamp(0.0, 1.0),
                note_beats: self.reactions.duration_beats,
            },
            composer: ComposerSettings {
                max_complexity: self.composer.max_complexity,
                chord_beats: self.composer.chord_beats,
                tempo_range,
                tempo_ramp: self.tempo.ramp,
                reactions: ReactionLimits {
                    lifetime: self.reactions.lifetime,
                    max_active: self.reactions.max_active,
                },
            },
            relay_enabled: self.relay.enabled,
            tick_interval,
        })
    }
}

fn strip_prefix(error: &Error) -> String {
    match error {
        Error::Config(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Serde adapter for human-readable durations ("200ms", "3s").
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

//! One control tick.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::backend::AudioBackend;
use crate::composer::Composer;
use crate::config::PillarSettings;
use crate::error::Result;
use crate::hardware::{LightSink, SensorSource};
use crate::mapping::Mapper;
use crate::relay::{Relay, RelayMessage};
use crate::state::{Parameter, SharedState};

/// Requests from outside the control thread.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    /// Apply a parameter as if a sensor had produced it.
    Apply(Parameter),
    Shutdown,
}

/// The pillar's collaborators.
pub struct PillarIo {
    pub backend: Arc<dyn AudioBackend>,
    pub sensors: Box<dyn SensorSource>,
    pub lights: Box<dyn LightSink>,
    /// Only used when the relay is enabled in configuration.
    pub relay: Option<Box<dyn Relay>>,
}

/// Sensors in, mutations and reactions to the composer, lights and relay
/// out. Owns everything it touches; the runtime moves it onto its own
/// thread.
pub struct ControlLoop {
    pillar_id: String,
    composer: Composer,
    mapper: Mapper,
    sensors: Box<dyn SensorSource>,
    lights: Box<dyn LightSink>,
    relay: Option<Box<dyn Relay>>,
    message_tx: Sender<ControlMessage>,
    message_rx: Receiver<ControlMessage>,
    ticks: u64,
}

impl ControlLoop {
    /// Build the mapper and composer for a resolved pillar. Configuration
    /// errors surface here, before anything runs.
    pub fn new(settings: &PillarSettings, io: PillarIo, seed: Option<u64>) -> Result<Self> {
        let mapper = Mapper::new(
            &settings.mapping,
            &settings.initial,
            settings.mapper.clone(),
            seed,
        )?;
        let composer = Composer::new(
            settings.initial.clone(),
            settings.mapper.catalog.clone(),
            io.backend,
            settings.composer.clone(),
        )?;
        let relay = match (settings.relay_enabled, io.relay) {
            (true, Some(relay)) => Some(relay),
            (true, None) => {
                log::warn!("[CONTROL] Relay enabled but no transport given; running alone");
                None
            }
            (false, _) => None,
        };
        let (message_tx, message_rx) = unbounded();
        log::info!("[CONTROL] Pillar '{}' ready", settings.id);
        Ok(Self {
            pillar_id: settings.id.clone(),
            composer,
            mapper,
            sensors: io.sensors,
            lights: io.lights,
            relay,
            message_tx,
            message_rx,
            ticks: 0,
        })
    }

    pub fn pillar_id(&self) -> &str {
        &self.pillar_id
    }

    pub fn sender(&self) -> Sender<ControlMessage> {
        self.message_tx.clone()
    }

    pub fn state(&self) -> &SharedState {
        self.composer.state()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one tick. Returns `false` once a shutdown was requested; the
    /// tick that sees the request does nothing else.
    ///
    /// Everything the mapper produced is applied before the composer's
    /// tick, so voices started this tick see all of it.
    pub fn step(&mut self, now: Instant) -> bool {
        while let Ok(message) = self.message_rx.try_recv() {
            match message {
                ControlMessage::Apply(parameter) => {
                    self.composer.apply(parameter);
                }
                ControlMessage::Shutdown => {
                    log::info!("[CONTROL] Shutdown requested");
                    return false;
                }
            }
        }

        if let Some(relay) = self.relay.as_mut() {
            while let Some(message) = relay.try_recv() {
                if message.reaction_notes.is_empty() {
                    continue;
                }
                log::debug!(
                    "[CONTROL] {} reaction notes from '{}'",
                    message.reaction_notes.len(),
                    message.pillar_id
                );
                self.composer
                    .apply(Parameter::ReactionNotes(message.reaction_notes));
            }
        }

        let reported = self.sensors.reported_lights();
        let output = match self.sensors.read() {
            Ok(raw) => self.mapper.update(raw, reported.as_ref(), now),
            Err(e) => {
                log::warn!("[CONTROL] Sensor read failed, holding last reading: {}", e);
                self.mapper.repeat(reported.as_ref(), now)
            }
        };

        for mutation in output.mutations {
            self.composer.apply(mutation);
        }

        if !output.notes.is_empty() {
            self.composer
                .apply(Parameter::ReactionNotes(output.notes.clone()));
        }

        if let Some(lights) = &output.lights {
            if let Err(e) = self.lights.write(lights) {
                log::error!("[CONTROL] Light write failed: {}", e);
            }
        }

        if !output.notes.is_empty() {
            if let Some(relay) = self.relay.as_mut() {
                let message = RelayMessage::new(self.pillar_id.clone(), output.notes);
                if let Err(e) = relay.publish(&message) {
                    log::warn!("[CONTROL] Relay publish failed: {}", e);
                }
            }
        }

        self.composer.tick_at(now);
        self.ticks += 1;
        true
    }

    /// Stop the composer: voices finish their current wait and are joined.
    pub fn stop(&mut self) {
        self.composer.stop();
    }
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("pillar_id", &self.pillar_id)
            .field("policy", &self.mapper.policy().name())
            .field("relay", &self.relay.is_some())
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::config::{InstallationConfig, MappingConfig, PillarConfig};
    use crate::hardware::{RecordingLightSink, ScriptedSensors};
    use crate::music::{Layer, NoteEvent};
    use crate::relay::LoopbackBus;
    use crate::theory::ScaleId;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn settings(mapping: MappingConfig, relay: bool) -> PillarSettings {
        let mut config = InstallationConfig::default();
        config.relay.enabled = relay;
        config.pillars.insert(
            "p1".into(),
            PillarConfig {
                channels: 4,
                bpm: None,
                volume: None,
                instruments: None,
                mapping,
            },
        );
        config.resolve("p1").unwrap()
    }

    // Far above anything the continuous voices play.
    const TOUCH_PITCH: i32 = 101;

    fn fixed() -> MappingConfig {
        MappingConfig::Fixed {
            notes: vec![TOUCH_PITCH, 103, 105, 107],
            octave: 0,
        }
    }

    fn io(
        backend: &Arc<RecordingBackend>,
        sensors: ScriptedSensors,
        lights: &RecordingLightSink,
        relay: Option<Box<dyn Relay>>,
    ) -> PillarIo {
        PillarIo {
            backend: backend.clone(),
            sensors: Box::new(sensors),
            lights: Box::new(lights.clone()),
            relay,
        }
    }

    #[test]
    fn test_touch_reaches_backend_and_relay() {
        init_logging();
        let backend = Arc::new(RecordingBackend::new());
        let lights = RecordingLightSink::new();
        let bus = LoopbackBus::new();
        let mut listener = bus.attach("p2");
        let sensors = ScriptedSensors::new([
            vec![false, false, false, false],
            vec![true, false, false, false],
            vec![true, false, false, false],
        ]);
        let mut control = ControlLoop::new(
            &settings(fixed(), true),
            io(&backend, sensors, &lights, Some(Box::new(bus.attach("p1")))),
            Some(1),
        )
        .unwrap();

        let now = Instant::now();
        for _ in 0..3 {
            assert!(control.step(now));
        }
        control.stop();

        let reactions: Vec<i32> = backend
            .notes()
            .iter()
            .map(|n| n.pitch)
            .filter(|&p| p == TOUCH_PITCH)
            .collect();
        assert_eq!(reactions, vec![TOUCH_PITCH]);

        // Initial colours, then the flash for the touch.
        assert_eq!(lights.writes().len(), 2);

        let published = listener.try_recv().unwrap();
        assert_eq!(published.pillar_id, "p1");
        assert_eq!(published.reaction_notes[0].pitch, TOUCH_PITCH);
        assert_eq!(listener.try_recv(), None);
        assert_eq!(control.ticks(), 3);
    }

    #[test]
    fn test_remote_batch_is_played() {
        let backend = Arc::new(RecordingBackend::new());
        let lights = RecordingLightSink::new();
        let bus = LoopbackBus::new();
        let mut remote = bus.attach("p2");
        let mut control = ControlLoop::new(
            &settings(fixed(), true),
            io(
                &backend,
                ScriptedSensors::new([vec![false; 4]]),
                &lights,
                Some(Box::new(bus.attach("p1"))),
            ),
            Some(1),
        )
        .unwrap();

        remote
            .publish(&RelayMessage::new("p2", vec![NoteEvent::new(99, 1.0, 0.1)]))
            .unwrap();
        control.step(Instant::now());
        control.stop();
        assert!(backend.notes().iter().any(|n| n.pitch == 99));
    }

    #[test]
    fn test_relay_disabled_ignores_transport() {
        let backend = Arc::new(RecordingBackend::new());
        let bus = LoopbackBus::new();
        let mut listener = bus.attach("p2");
        let mut control = ControlLoop::new(
            &settings(fixed(), false),
            io(
                &backend,
                ScriptedSensors::new([vec![true, false, false, false]]),
                &RecordingLightSink::new(),
                Some(Box::new(bus.attach("p1"))),
            ),
            Some(1),
        )
        .unwrap();
        control.step(Instant::now());
        control.stop();
        assert_eq!(listener.try_recv(), None);
    }

    #[test]
    fn test_sensor_failure_is_absorbed() {
        init_logging();
        let backend = Arc::new(RecordingBackend::new());
        let sensors = ScriptedSensors::with_failures([
            Some(vec![true, false, false, false]),
            None,
            Some(vec![true, false, false, false]),
        ]);
        let mut control = ControlLoop::new(
            &settings(fixed(), false),
            io(&backend, sensors, &RecordingLightSink::new(), None),
            Some(1),
        )
        .unwrap();
        let now = Instant::now();
        for _ in 0..3 {
            assert!(control.step(now));
        }
        control.stop();
        // One touch, held through the failed read.
        let count = backend
            .notes()
            .iter()
            .filter(|n| n.pitch == TOUCH_PITCH)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_messages_and_shutdown() {
        let backend = Arc::new(RecordingBackend::new());
        let mut control = ControlLoop::new(
            &settings(fixed(), false),
            io(&backend, ScriptedSensors::default(), &RecordingLightSink::new(), None),
            Some(1),
        )
        .unwrap();
        let tx = control.sender();
        tx.send(ControlMessage::Apply(Parameter::Scale(ScaleId::Blues)))
            .unwrap();
        assert!(control.step(Instant::now()));
        assert_eq!(control.state().scale(), ScaleId::Blues);

        tx.send(ControlMessage::Shutdown).unwrap();
        assert!(!control.step(Instant::now()));
        control.stop();
        assert_eq!(backend.live_resources(Layer::Melody), 0);
    }

    #[test]
    fn test_rotation_mutations_applied_before_tick() {
        let backend = Arc::new(RecordingBackend::new());
        let mapping = MappingConfig::EdgeRotation {
            roles: vec!["s".into(), "b".into()],
            tempo_step: 5.0,
        };
        let mut control = ControlLoop::new(
            &settings(mapping, false),
            io(
                &backend,
                ScriptedSensors::new([vec![true, true, false, false]]),
                &RecordingLightSink::new(),
                None,
            ),
            Some(1),
        )
        .unwrap();
        let before = control.state().snapshot().state;
        control.step(Instant::now());
        let after = control.state().snapshot();
        assert_eq!(after.state.scale, before.scale.next());
        assert_eq!(after.state.baseline_style, before.baseline_style.next());
        assert_eq!(after.harmonic_complexity, 2);
        control.stop();
    }
}

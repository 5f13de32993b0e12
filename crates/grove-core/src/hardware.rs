//! Sensor and light collaborators.
//!
//! The pillar's physical I/O sits behind two small traits so the control
//! loop can run against real hardware, a simulation, or a scripted test.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::mapping::LightSnapshot;

/// Source of per-tick touch readings.
pub trait SensorSource: Send {
    /// One boolean per channel. The length is not trusted; the mapper fits
    /// it to the pillar.
    fn read(&mut self) -> Result<Vec<bool>>;

    /// What the display reports it is showing, if it reports anything.
    fn reported_lights(&self) -> Option<LightSnapshot> {
        None
    }
}

/// Destination for light updates.
pub trait LightSink: Send {
    fn write(&mut self, lights: &LightSnapshot) -> Result<()>;
}

/// Random touches for running without hardware. A touched channel stays
/// held for a few ticks.
#[derive(Debug)]
pub struct SimulatedSensors {
    held: Vec<u32>,
    touch_probability: f64,
    max_hold_ticks: u32,
    rng: StdRng,
}

impl SimulatedSensors {
    pub fn new(channels: usize, seed: Option<u64>) -> Self {
        Self {
            held: vec![0; channels],
            touch_probability: 0.02,
            max_hold_ticks: 8,
            rng: seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64),
        }
    }

    /// Chance per tick that a released channel gets touched.
    pub fn with_touch_probability(mut self, probability: f64) -> Self {
        self.touch_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl SensorSource for SimulatedSensors {
    fn read(&mut self) -> Result<Vec<bool>> {
        let mut frame = Vec::with_capacity(self.held.len());
        for remaining in self.held.iter_mut() {
            if *remaining > 0 {
                *remaining -= 1;
            } else if self.rng.random_bool(self.touch_probability) {
                *remaining = self.rng.random_range(1..=self.max_hold_ticks);
            }
            frame.push(*remaining > 0);
        }
        Ok(frame)
    }
}

/// Replays a fixed list of frames, then reports everything released.
/// A `None` frame is a failed read.
#[derive(Debug, Default)]
pub struct ScriptedSensors {
    frames: VecDeque<Option<Vec<bool>>>,
    reported: Option<LightSnapshot>,
    last_len: usize,
}

impl ScriptedSensors {
    pub fn new(frames: impl IntoIterator<Item = Vec<bool>>) -> Self {
        Self {
            frames: frames.into_iter().map(Some).collect(),
            ..Self::default()
        }
    }

    /// Frames where `None` makes `read` fail.
    pub fn with_failures(frames: impl IntoIterator<Item = Option<Vec<bool>>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_reported_lights(mut self, lights: LightSnapshot) -> Self {
        self.reported = Some(lights);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl SensorSource for ScriptedSensors {
    fn read(&mut self) -> Result<Vec<bool>> {
        match self.frames.pop_front() {
            Some(Some(frame)) => {
                self.last_len = frame.len();
                Ok(frame)
            }
            Some(None) => Err(Error::Hardware("scripted read failure".into())),
            None => Ok(vec![false; self.last_len]),
        }
    }

    fn reported_lights(&self) -> Option<LightSnapshot> {
        self.reported.clone()
    }
}

/// Logs light writes.
#[derive(Debug, Default)]
pub struct LogLightSink;

impl LightSink for LogLightSink {
    fn write(&mut self, lights: &LightSnapshot) -> Result<()> {
        let hues: Vec<u8> = lights.cells.iter().map(|c| c.hue).collect();
        log::debug!("[LIGHTS] hues {:?}", hues);
        Ok(())
    }
}

/// Keeps every write; clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingLightSink {
    writes: Arc<Mutex<Vec<LightSnapshot>>>,
}

impl RecordingLightSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<LightSnapshot> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LightSink for RecordingLightSink {
    fn write(&mut self, lights: &LightSnapshot) -> Result<()> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(lights.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::LightCell;

    #[test]
    fn test_simulated_frames_have_channel_count() {
        let mut sensors = SimulatedSensors::new(6, Some(1)).with_touch_probability(0.5);
        let mut touched = false;
        for _ in 0..50 {
            let frame = sensors.read().unwrap();
            assert_eq!(frame.len(), 6);
            touched |= frame.iter().any(|&t| t);
        }
        assert!(touched);
    }

    #[test]
    fn test_simulated_touches_are_held() {
        let mut sensors = SimulatedSensors::new(1, Some(3)).with_touch_probability(1.0);
        // Released for at most one tick between holds.
        let frames: Vec<bool> = (0..20).map(|_| sensors.read().unwrap()[0]).collect();
        assert!(frames[0]);
        assert!(frames.iter().filter(|&&t| t).count() >= 10);
    }

    #[test]
    fn test_scripted_replays_then_releases() {
        let mut sensors = ScriptedSensors::new([vec![true, false], vec![false, true]]);
        assert_eq!(sensors.read().unwrap(), vec![true, false]);
        assert_eq!(sensors.read().unwrap(), vec![false, true]);
        assert_eq!(sensors.read().unwrap(), vec![false, false]);
        assert_eq!(sensors.remaining(), 0);
    }

    #[test]
    fn test_scripted_failure() {
        let mut sensors = ScriptedSensors::with_failures([None, Some(vec![true])]);
        assert!(matches!(sensors.read(), Err(Error::Hardware(_))));
        assert_eq!(sensors.read().unwrap(), vec![true]);
    }

    #[test]
    fn test_recording_sink_shares_writes() {
        let sink = RecordingLightSink::new();
        let mut writer = sink.clone();
        writer
            .write(&LightSnapshot::new(vec![LightCell::new(10, 255)]))
            .unwrap();
        assert_eq!(sink.writes().len(), 1);
        LogLightSink.write(&sink.writes()[0]).unwrap();
    }
}

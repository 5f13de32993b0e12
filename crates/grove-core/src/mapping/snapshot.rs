//! Sensor and light snapshots.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// One boolean per sensor channel, read once per control tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SensorSnapshot(Vec<bool>);

impl SensorSnapshot {
    /// All channels released.
    pub fn released(channels: usize) -> Self {
        Self(vec![false; channels])
    }

    /// Fit a raw reading to `channels` entries, padding with `false` or
    /// truncating.
    pub fn normalize(mut raw: Vec<bool>, channels: usize) -> Self {
        if raw.len() != channels {
            log::warn!(
                "[SENSORS] Expected {} channels, got {}; {}",
                channels,
                raw.len(),
                if raw.len() < channels { "padding" } else { "truncating" }
            );
            raw.resize(channels, false);
        }
        Self(raw)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_active(&self, channel: usize) -> bool {
        self.0.get(channel).copied().unwrap_or(false)
    }

    /// Channels held in this snapshot, in index order.
    pub fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().filter(|(_, on)| **on).map(|(i, _)| i)
    }

    /// Channels that went from released in `previous` to held in `self`, in
    /// index order.
    pub fn rising_since<'a>(&'a self, previous: &'a SensorSnapshot) -> impl Iterator<Item = usize> + 'a {
        self.active().filter(move |&i| !previous.is_active(i))
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

impl From<Vec<bool>> for SensorSnapshot {
    fn from(raw: Vec<bool>) -> Self {
        Self(raw)
    }
}

/// The previous snapshot, kept by the mapper to find edges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeState {
    pub previous: SensorSnapshot,
}

impl EdgeState {
    pub fn new(channels: usize) -> Self {
        Self {
            previous: SensorSnapshot::released(channels),
        }
    }
}

/// How a channel's light is animated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightEffect {
    #[default]
    Steady,
    /// Brief flash acknowledging a touch.
    Flash,
}

/// One channel's light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightCell {
    pub hue: u8,
    pub brightness: u8,
    #[serde(default)]
    pub effect: LightEffect,
}

impl LightCell {
    pub fn new(hue: u8, brightness: u8) -> Self {
        Self {
            hue,
            brightness,
            effect: LightEffect::Steady,
        }
    }

    pub fn with_effect(mut self, effect: LightEffect) -> Self {
        self.effect = effect;
        self
    }
}

/// One light per channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSnapshot {
    pub cells: Vec<LightCell>,
}

impl LightSnapshot {
    pub fn new(cells: Vec<LightCell>) -> Self {
        Self { cells }
    }

    /// Random hues at full brightness.
    pub fn random<R: Rng + ?Sized>(channels: usize, rng: &mut R) -> Self {
        Self::new(
            (0..channels)
                .map(|_| LightCell::new(rng.random(), 255))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn hue(&self, channel: usize) -> Option<u8> {
        self.cells.get(channel).map(|c| c.hue)
    }

    /// Overwrite one cell. Out-of-range channels are ignored.
    pub fn set(&mut self, channel: usize, cell: LightCell) {
        if let Some(slot) = self.cells.get_mut(channel) {
            *slot = cell;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_and_truncates() {
        assert_eq!(
            SensorSnapshot::normalize(vec![true], 3).as_slice(),
            &[true, false, false]
        );
        assert_eq!(
            SensorSnapshot::normalize(vec![true, false, true, true, true], 3).as_slice(),
            &[true, false, true]
        );
    }

    #[test]
    fn test_rising_edges_only() {
        let previous = SensorSnapshot::from(vec![false, true, true, false]);
        let current = SensorSnapshot::from(vec![true, true, false, true]);
        let rising: Vec<usize> = current.rising_since(&previous).collect();
        assert_eq!(rising, vec![0, 3]);
    }

    #[test]
    fn test_light_set_ignores_out_of_range() {
        let mut lights = LightSnapshot::new(vec![LightCell::new(0, 0); 2]);
        lights.set(5, LightCell::new(10, 10));
        lights.set(1, LightCell::new(10, 10));
        assert_eq!(lights.hue(1), Some(10));
        assert_eq!(lights.hue(5), None);
    }
}

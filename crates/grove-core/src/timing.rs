//! Tempo clock with ramped tempo changes.
//!
//! The [`TempoClock`] is the single authority for tempo. Voices ask it for
//! the current tempo to size their waits; a new target tempo is approached
//! linearly over a ramp window instead of jumping.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Allowed tempo range in BPM.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoRange {
    pub min: f64,
    pub max: f64,
}

impl TempoRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, bpm: f64) -> f64 {
        bpm.clamp(self.min, self.max)
    }
}

impl Default for TempoRange {
    fn default() -> Self {
        Self::new(30.0, 200.0)
    }
}

#[derive(Clone, Copy, Debug)]
struct Ramp {
    from: f64,
    to: f64,
    started: Instant,
    length: Duration,
}

impl Ramp {
    fn steady(bpm: f64, now: Instant) -> Self {
        Self {
            from: bpm,
            to: bpm,
            started: now,
            length: Duration::ZERO,
        }
    }

    fn tempo_at(&self, now: Instant) -> f64 {
        if self.length.is_zero() || now <= self.started {
            return if self.length.is_zero() { self.to } else { self.from };
        }
        let elapsed = now.duration_since(self.started);
        if elapsed >= self.length {
            return self.to;
        }
        let progress = elapsed.as_secs_f64() / self.length.as_secs_f64();
        self.from + (self.to - self.from) * progress
    }

    fn is_ramping(&self, now: Instant) -> bool {
        !self.length.is_zero() && now < self.started + self.length
    }
}

/// Shared tempo authority.
///
/// Interior mutability lets every voice hold an `Arc<TempoClock>` while the
/// composer retargets it.
#[derive(Debug)]
pub struct TempoClock {
    range: TempoRange,
    ramp: Mutex<Ramp>,
}

impl TempoClock {
    /// Create a clock steady at `bpm` (clamped into `range`).
    pub fn new(bpm: f64, range: TempoRange) -> Self {
        Self {
            range,
            ramp: Mutex::new(Ramp::steady(range.clamp(bpm), Instant::now())),
        }
    }

    pub fn range(&self) -> TempoRange {
        self.range
    }

    /// Current tempo in BPM.
    pub fn current_tempo(&self) -> f64 {
        self.current_tempo_at(Instant::now())
    }

    /// Tempo at a given instant. Mid-ramp this is a linear interpolation
    /// between the tempo at ramp start and the target.
    pub fn current_tempo_at(&self, now: Instant) -> f64 {
        self.lock().tempo_at(now)
    }

    /// The ramp destination while a ramp is in progress.
    pub fn target_at(&self, now: Instant) -> Option<f64> {
        let ramp = self.lock();
        ramp.is_ramping(now).then_some(ramp.to)
    }

    /// Move towards `bpm` over `ramp`. A zero ramp switches immediately.
    pub fn set_target(&self, bpm: f64, ramp: Duration) {
        self.set_target_at(bpm, ramp, Instant::now());
    }

    /// Move towards `bpm` over `ramp`, starting at `now`.
    ///
    /// The ramp starts from whatever tempo is current at `now`, so retargeting
    /// mid-ramp never produces a jump.
    pub fn set_target_at(&self, bpm: f64, ramp: Duration, now: Instant) {
        let target = self.range.clamp(bpm);
        let mut current = self.lock();
        let from = current.tempo_at(now);
        *current = Ramp {
            from,
            to: target,
            started: now,
            length: ramp,
        };
        log::debug!(
            "[CLOCK] Tempo ramp {:.1} -> {:.1} bpm over {:?}",
            from,
            target,
            ramp
        );
    }

    /// Wall-clock length of `beats` at the current tempo.
    pub fn beats_to_duration(&self, beats: f64) -> Duration {
        beats_to_duration(beats, self.current_tempo())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ramp> {
        self.ramp.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wall-clock length of `beats` at `bpm`. Zero for non-positive or NaN
/// input, saturating at [`Duration::MAX`].
pub fn beats_to_duration(beats: f64, bpm: f64) -> Duration {
    if !(beats > 0.0 && bpm > 0.0) {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(beats * 60.0 / bpm).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_clamped() {
        let clock = TempoClock::new(500.0, TempoRange::new(30.0, 200.0));
        assert!((clock.current_tempo() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_ramp_is_monotonic_and_never_overshoots() {
        let clock = TempoClock::new(100.0, TempoRange::default());
        let start = Instant::now();
        clock.set_target_at(120.0, Duration::from_secs(2), start);

        let mut previous = clock.current_tempo_at(start);
        assert!((previous - 100.0).abs() < 1e-9);
        for step in 1..=40 {
            let now = start + Duration::from_millis(step * 50);
            let tempo = clock.current_tempo_at(now);
            assert!(tempo > previous, "tempo must rise at step {step}");
            assert!(tempo <= 120.0);
            previous = tempo;
        }
        assert!((previous - 120.0).abs() < 1e-9);
        assert!((clock.current_tempo_at(start + Duration::from_secs(10)) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_ramp_midpoint() {
        let clock = TempoClock::new(100.0, TempoRange::default());
        let start = Instant::now();
        clock.set_target_at(120.0, Duration::from_secs(2), start);
        let mid = clock.current_tempo_at(start + Duration::from_secs(1));
        assert!((mid - 110.0).abs() < 1e-6);
        assert_eq!(clock.target_at(start + Duration::from_secs(1)), Some(120.0));
        assert_eq!(clock.target_at(start + Duration::from_secs(3)), None);
    }

    #[test]
    fn test_retarget_mid_ramp_starts_from_current() {
        let clock = TempoClock::new(100.0, TempoRange::default());
        let start = Instant::now();
        clock.set_target_at(120.0, Duration::from_secs(2), start);
        let mid = start + Duration::from_secs(1);
        clock.set_target_at(80.0, Duration::from_secs(1), mid);
        assert!((clock.current_tempo_at(mid) - 110.0).abs() < 1e-6);
        assert!((clock.current_tempo_at(mid + Duration::from_secs(1)) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_ramp_switches_immediately() {
        let clock = TempoClock::new(100.0, TempoRange::default());
        let now = Instant::now();
        clock.set_target_at(150.0, Duration::ZERO, now);
        assert!((clock.current_tempo_at(now) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_is_clamped() {
        let clock = TempoClock::new(100.0, TempoRange::new(30.0, 200.0));
        let now = Instant::now();
        clock.set_target_at(10.0, Duration::ZERO, now);
        assert!((clock.current_tempo_at(now) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_beats_to_duration() {
        assert_eq!(beats_to_duration(1.0, 60.0), Duration::from_secs(1));
        assert_eq!(beats_to_duration(2.0, 120.0), Duration::from_secs(1));
        assert_eq!(beats_to_duration(-1.0, 120.0), Duration::ZERO);
    }

    #[test]
    fn test_beats_to_duration_never_panics() {
        assert_eq!(beats_to_duration(f64::NAN, 120.0), Duration::ZERO);
        assert_eq!(beats_to_duration(1.0, f64::NAN), Duration::ZERO);
        assert_eq!(beats_to_duration(f64::NEG_INFINITY, 120.0), Duration::ZERO);
        assert_eq!(beats_to_duration(f64::INFINITY, 120.0), Duration::MAX);
        assert_eq!(beats_to_duration(1e300, 120.0), Duration::MAX);
    }
}

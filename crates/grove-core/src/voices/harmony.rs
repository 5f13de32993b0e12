//! Harmony voice.
//!
//! One chord per cycle. The key comes from a non-repeating shuffle over the
//! circle of fifths. Once the chord has sounded its key becomes the shared
//! key, so melody and background follow the chord just played. Each
//! unit of harmonic complexity adds one extension tone; one unit is consumed
//! per chord.

use rand::seq::SliceRandom;
use rand::Rng;

use super::VoiceContext;
use crate::music::{Chord, Envelope, Layer};
use crate::theory::ScaleId;

/// Chord tones for `key` in `scale` with `complexity` extensions.
///
/// The base triad uses scale degrees 0, 2 and 4; extension `i` uses degree
/// `6 + 2 * complexity * i`. Degrees past the end of the scale wrap into the
/// next octave. The voicing is shuffled and every tone ordered before the
/// tonic is raised an octave so the chord stacks above the root.
pub fn build_chord<R: Rng + ?Sized>(
    key: i32,
    scale: ScaleId,
    complexity: u32,
    rng: &mut R,
) -> Vec<i32> {
    let intervals = scale.intervals();
    let len = intervals.len();
    let complexity = complexity as usize;

    let offsets = [0, 2, 4]
        .into_iter()
        .chain((0..complexity).map(|i| 6 + 2 * complexity * i));
    let mut pitches: Vec<i32> = offsets
        .map(|offset| key + intervals[offset % len] + 12 * (offset / len) as i32)
        .collect();

    pitches.shuffle(rng);
    if let Some(root) = pitches.iter().position(|&p| p == key) {
        for pitch in &mut pitches[..root] {
            *pitch += 12;
        }
    }
    pitches
}

/// Play one chord and consume one unit of complexity.
pub fn run_cycle<R: Rng + ?Sized>(ctx: &VoiceContext, rng: &mut R) {
    let key = ctx.next_key(rng);

    let (scale, volume) = ctx
        .state
        .with_state_read(|s| (s.scale, s.volume[Layer::Harmony]));
    let complexity = ctx.state.harmonic_complexity();
    let chord = Chord {
        pitches: build_chord(key, scale, complexity, rng),
        envelope: Envelope::adsr(0.5, volume, 0.2, 0.15, 0.5),
        duration: ctx.chord_beats,
    };
    log::debug!(
        "[HARMONY] key={} complexity={} chord={:?}",
        key,
        complexity,
        chord.pitches
    );
    if volume > 0.0 {
        ctx.play_chord(Layer::Harmony, &chord);
    }
    ctx.wait_beats(ctx.chord_beats);
    ctx.state.consume_complexity();
    ctx.state.set_key(key);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fast_context;
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_complexity_two_major_has_five_tones() {
        let mut rng = StdRng::seed_from_u64(7);
        let chord = build_chord(60, ScaleId::Major, 2, &mut rng);
        assert_eq!(chord.len(), 5);

        // Before voicing: 60, 64, 67, 71 and degree 10 -> 65 + 12.
        let mut classes: Vec<i32> = chord.iter().map(|p| p.rem_euclid(12)).collect();
        classes.sort();
        assert_eq!(classes, vec![0, 4, 5, 7, 11]);
        for pitch in &chord {
            assert!((60..=60 + 24 + 11).contains(pitch), "{pitch} out of range");
        }
    }

    #[test]
    fn test_tones_before_tonic_are_raised() {
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let chord = build_chord(60, ScaleId::Major, 3, &mut rng);
            let root = chord.iter().position(|&p| p == 60).unwrap();
            for pitch in &chord[..root] {
                assert!(*pitch > 60);
            }
        }
    }

    #[test]
    fn test_zero_complexity_is_triad() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut chord = build_chord(48, ScaleId::NaturalMinor, 0, &mut rng);
        chord.sort();
        let classes: Vec<i32> = chord.iter().map(|p| p.rem_euclid(12)).collect();
        assert_eq!(chord.len(), 3);
        assert!(classes.contains(&0) && classes.contains(&3) && classes.contains(&7));
    }

    #[test]
    fn test_cycle_publishes_key_and_consumes_complexity() {
        let (ctx, backend, _tx) = fast_context();
        ctx.state.excite(4);
        ctx.state.excite(4);
        let mut rng = StdRng::seed_from_u64(3);
        run_cycle(&ctx, &mut rng);

        assert_eq!(ctx.state.harmonic_complexity(), 1);
        let chords = backend.chords();
        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].pitches.len(), 5);
        let key = ctx.state.key();
        assert!((48..60).contains(&key));
        assert!(chords[0].pitches.contains(&key));
    }

    #[test]
    fn test_key_is_published_after_the_chord() {
        let (ctx, backend, tx) = fast_context();
        // Four beats at 240 bpm: the chord holds for a second.
        ctx.state.clock().set_target(240.0, Duration::ZERO);
        let voice_ctx = Arc::clone(&ctx);
        let voice = thread::spawn(move || {
            run_cycle(&voice_ctx, &mut StdRng::seed_from_u64(5));
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while backend.chords().is_empty() {
            assert!(Instant::now() < deadline, "chord never played");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ctx.state.key(), 60);

        drop(tx);
        voice.join().unwrap();
        let key = ctx.state.key();
        assert!((48..60).contains(&key));
        assert!(backend.chords()[0].pitches.contains(&key));
    }
}

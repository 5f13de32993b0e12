//! Melody voice: one pass through the active pattern per cycle.

use super::VoiceContext;
use crate::music::{Layer, NoteEvent};
use crate::theory::melody;

/// The pattern is fixed when the cycle starts; key, scale and volume are
/// re-read before every step.
pub fn run_cycle(ctx: &VoiceContext) {
    let pattern_index = ctx.state.melody_pattern();
    let pattern = melody(pattern_index);
    log::debug!("[MELODY] Pattern {} ({} steps)", pattern_index, pattern.len());

    for &(degree, beats) in pattern {
        if let Some(degree) = degree {
            let (key, scale, volume) = ctx
                .state
                .with_state_read(|s| (s.key, s.scale, s.volume[Layer::Melody]));
            if volume > 0.0 {
                let pitch = scale.degree_to_pitch(key, degree);
                ctx.play_note(Layer::Melody, &NoteEvent::new(pitch, volume, beats));
            }
        }
        if !ctx.wait_beats(beats) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fast_context;
    use super::*;
    use crate::theory::MELODIES;

    #[test]
    fn test_cycle_plays_every_non_rest_step() {
        let (ctx, backend, _tx) = fast_context();
        let index = 3;
        ctx.state.with_state_write(|s| s.melody_pattern = index);
        run_cycle(&ctx);

        let expected: Vec<i32> = MELODIES[index]
            .iter()
            .filter_map(|(degree, _)| *degree)
            .map(|d| ctx.state.scale().degree_to_pitch(ctx.state.key(), d))
            .collect();
        let played: Vec<i32> = backend.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(played, expected);
    }

    #[test]
    fn test_muted_melody_plays_nothing() {
        let (ctx, backend, _tx) = fast_context();
        ctx.state.with_state_write(|s| s.volume[Layer::Melody] = 0.0);
        run_cycle(&ctx);
        assert!(backend.notes().is_empty());
    }

    #[test]
    fn test_cycle_stops_on_shutdown() {
        let (ctx, backend, tx) = fast_context();
        drop(tx);
        run_cycle(&ctx);
        assert!(backend.notes().len() <= 1);
    }
}

//! Background voice: a drone two octaves below the key.

use super::VoiceContext;
use crate::music::{Articulation, Layer, NoteEvent};
use crate::theory::BaselineStyle;

/// Beats covered by one background cycle.
pub const CYCLE_BEATS: f64 = 16.0;

const BEAT_PULSES: usize = 4;
const BEAT_NOTE_BEATS: f64 = 0.5;

pub fn run_cycle(ctx: &VoiceContext) {
    let (key, style, volume) = ctx
        .state
        .with_state_read(|s| (s.key, s.baseline_style, s.volume[Layer::Background]));
    let pitch = key - 24;
    log::debug!("[BACKGROUND] {:?} on {}", style, pitch);

    let play = |note: NoteEvent| {
        if volume > 0.0 {
            ctx.play_note(Layer::Background, &note);
        }
    };

    match style {
        BaselineStyle::Long => {
            play(NoteEvent::new(pitch, volume, CYCLE_BEATS));
            ctx.wait_beats(CYCLE_BEATS);
        }
        BaselineStyle::Pulsing => {
            play(NoteEvent::new(pitch, volume, CYCLE_BEATS).with_articulation(Articulation::Tremolo));
            ctx.wait_beats(CYCLE_BEATS);
        }
        BaselineStyle::Beat => {
            for _ in 0..BEAT_PULSES {
                play(
                    NoteEvent::new(pitch, volume, BEAT_NOTE_BEATS)
                        .with_articulation(Articulation::Staccato),
                );
                if !ctx.wait_beats(BEAT_NOTE_BEATS * 2.0) {
                    return;
                }
            }
        }
    }
}

//! Reaction notes.
//!
//! Every dispatched reaction note gets its own short-lived thread that plays
//! the note at once, independent of the beat grid, and then holds for the
//! note's length. A reaction ends when it finishes, when its lifetime has
//! passed, or when it is evicted to make room; at most `max_active`
//! reaction threads are alive at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use super::VoiceContext;
use crate::music::{Layer, NoteEvent};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReactionLimits {
    /// Hard upper bound on how long a reaction is tracked.
    pub lifetime: Duration,
    pub max_active: usize,
}

impl Default for ReactionLimits {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(3),
            max_active: 32,
        }
    }
}

struct ActiveReaction {
    pitch: i32,
    started: Instant,
    /// Dropping it ends the reaction's hold.
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

impl ActiveReaction {
    /// Cut the hold short and wait for the thread to exit.
    fn end(self) {
        drop(self.cancel);
        if self.handle.join().is_err() {
            log::error!("[REACTION] Note {} panicked", self.pitch);
        }
    }
}

/// Tracks in-flight reaction threads.
pub struct ReactionPool {
    limits: ReactionLimits,
    active: VecDeque<ActiveReaction>,
}

impl ReactionPool {
    pub fn new(limits: ReactionLimits) -> Self {
        Self {
            limits,
            active: VecDeque::new(),
        }
    }

    /// Start a reaction thread for `note`.
    pub fn dispatch(&mut self, ctx: &Arc<VoiceContext>, note: NoteEvent, now: Instant) {
        self.prune(now);
        while self.active.len() >= self.limits.max_active.max(1) {
            if let Some(oldest) = self.active.pop_front() {
                log::debug!("[REACTION] Pool full, ending note {}", oldest.pitch);
                oldest.end();
            }
        }

        let pitch = note.pitch;
        let lifetime = self.limits.lifetime;
        let thread_ctx = Arc::clone(ctx);
        let (cancel, cancelled) = bounded(0);
        let spawned = thread::Builder::new()
            .name(format!("grove-reaction-{}", pitch))
            .spawn(move || play_reaction(&thread_ctx, &note, lifetime, &cancelled));
        match spawned {
            Ok(handle) => self.active.push_back(ActiveReaction {
                pitch,
                started: now,
                cancel,
                handle,
            }),
            Err(e) => log::error!("[REACTION] Could not start note {}: {}", pitch, e),
        }
    }

    /// Reap finished reactions and end expired ones.
    pub fn prune(&mut self, now: Instant) {
        let lifetime = self.limits.lifetime;
        let mut kept = VecDeque::with_capacity(self.active.len());
        for reaction in self.active.drain(..) {
            if reaction.handle.is_finished() {
                reaction.end();
            } else if now.saturating_duration_since(reaction.started) >= lifetime {
                log::debug!("[REACTION] Note {} outlived its lifetime", reaction.pitch);
                reaction.end();
            } else {
                kept.push_back(reaction);
            }
        }
        self.active = kept;
    }

    /// Number of reactions still running.
    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Wait for every reaction to finish its hold.
    pub fn join_all(&mut self) {
        for reaction in self.active.drain(..) {
            if reaction.handle.join().is_err() {
                log::error!("[REACTION] Note {} panicked", reaction.pitch);
            }
        }
    }
}

impl std::fmt::Debug for ReactionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionPool")
            .field("limits", &self.limits)
            .field("active", &self.active.len())
            .finish()
    }
}

/// Body of a reaction thread. The hold ends early on shutdown or when the
/// pool drops `cancelled`'s sender.
fn play_reaction(
    ctx: &VoiceContext,
    note: &NoteEvent,
    lifetime: Duration,
    cancelled: &Receiver<()>,
) {
    let volume = ctx.state.volume(Layer::Melody);
    if volume > 0.0 {
        let scaled = note.clone().with_velocity(note.velocity * volume);
        ctx.play_note(Layer::Melody, &scaled);
    }
    let hold = ctx.state.clock().beats_to_duration(note.duration).min(lifetime);
    select! {
        recv(ctx.shutdown_signal()) -> _ => {}
        recv(cancelled) -> _ => {}
        default(hold) => {}
    }
}

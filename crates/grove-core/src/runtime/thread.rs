//! Control thread for a pillar.
//!
//! The control thread:
//! - Owns the control loop (and through it the composer and mapper)
//! - Runs one step per control tick
//! - Processes control messages
//! - Stops the composer on the way out

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use super::control::{ControlLoop, ControlMessage};
use crate::error::{Error, Result};
use crate::state::{SharedState, StateSnapshot};

/// Handle to a running pillar.
///
/// Cloneable; every clone talks to the same control thread.
#[derive(Clone, Debug)]
pub struct RuntimeHandle {
    /// Sender for control messages.
    message_tx: Sender<ControlMessage>,
    /// Shared state for read access.
    state: SharedState,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Send a message to the control thread.
    pub fn send(&self, msg: ControlMessage) -> Result<()> {
        self.message_tx.send(msg).map_err(|_| Error::Stopped)
    }

    /// A copy of the current musical state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Signal the control thread to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.message_tx.send(ControlMessage::Shutdown);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// A pillar running on its own thread.
#[derive(Debug)]
pub struct Runtime {
    handle: RuntimeHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Move `control` onto a new thread and step it every `tick_interval`.
    pub fn start(control: ControlLoop, tick_interval: Duration) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = RuntimeHandle {
            message_tx: control.sender(),
            state: control.state().clone(),
            shutdown: shutdown.clone(),
        };

        log::info!(
            "[RUNTIME] Starting pillar '{}' at {:.1} ticks/s",
            control.pillar_id(),
            1.0 / tick_interval.as_secs_f64()
        );
        let thread_handle = thread::Builder::new()
            .name("grove-control".into())
            .spawn(move || run(control, tick_interval, shutdown))?;

        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Whether the control thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Shut down the runtime gracefully.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[RUNTIME] Control thread panicked");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut control: ControlLoop, interval: Duration, shutdown: Arc<AtomicBool>) {
    let mut next_tick = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        if !control.step(Instant::now()) {
            break;
        }
        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            log::debug!("[RUNTIME] Tick overran by {:?}", now - next_tick);
            next_tick = now;
        }
    }
    control.stop();
    log::info!(
        "[RUNTIME] Pillar '{}' stopped after {} ticks",
        control.pillar_id(),
        control.ticks()
    );
}

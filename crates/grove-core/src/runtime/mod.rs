//! Pillar runtime - Drives one pillar at its control tick rate.
//!
//! The runtime manages:
//! - The control loop (sensors, mapper, composer, lights, relay)
//! - The thread it runs on
//! - Message passing from the outside (parameter changes, shutdown)

pub mod control;
pub mod thread;

pub use control::{ControlLoop, ControlMessage, PillarIo};
pub use thread::{Runtime, RuntimeHandle};

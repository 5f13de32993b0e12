//! Musical state shared between the composer and its voices.
//!
//! - [`MusicalState`] - The parameters voices read
//! - [`Parameter`] - All mutations that can be requested from outside
//! - [`SharedState`] - Thread-safe access plus the atomic complexity counter

mod manager;
mod messages;
mod model;

pub use manager::SharedState;
pub use messages::Parameter;
pub use model::{MusicalState, StateSnapshot, UNSET_INSTRUMENT};

//! Guest detection backends
//!
//! - `ScriptedGuestObserver` - plays a timed script of observations

mod simulation;

pub use simulation::{GuestScript, ScriptedGuestObserver};

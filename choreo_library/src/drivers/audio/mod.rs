//! Audio backends
//!
//! - `SimulationAudioPlayer` - clock-driven stand-in for the real decoder

mod simulation;

pub use simulation::SimulationAudioPlayer;

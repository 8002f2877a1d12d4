//! Backend implementations of the core adapter contracts
//!
//! Simulation backends are always available; hardware backends sit behind
//! feature flags so message-level users never pull in device crates.

pub mod audio;
pub mod guest;
pub mod light;
pub mod servo;

pub use audio::SimulationAudioPlayer;
pub use guest::{GuestScript, ScriptedGuestObserver};
pub use light::SimulationLightBus;
pub use servo::SimulationServoBus;

#[cfg(feature = "i2c-hardware")]
pub use servo::{Pca9685Config, Pca9685ServoBus};

//! Servo bus backends
//!
//! - `SimulationServoBus` - always available, synthesizes telemetry
//! - `Pca9685ServoBus` - PCA9685 PWM controller (requires `i2c-hardware`)

mod simulation;

#[cfg(feature = "i2c-hardware")]
mod pca9685;

pub use simulation::SimulationServoBus;

#[cfg(feature = "i2c-hardware")]
pub use pca9685::{Pca9685Config, Pca9685ServoBus};

//! # CHOREO Standard Library
//!
//! Backends and authored content for the CHOREO choreography kernel.
//!
//! ## Structure
//!
//! ```text
//! choreo_library/
//! ── drivers/    # Adapter backends (simulation + feature-gated hardware)
//! ── presets/    # The standard rig and house repertoire
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use choreo_core::runtime::{Backends, Runtime};
//! use choreo_core::core::MonotonicClock;
//! use choreo_library::drivers::{
//!     ScriptedGuestObserver, SimulationAudioPlayer, SimulationLightBus, SimulationServoBus,
//! };
//! use choreo_library::presets;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(MonotonicClock);
//! let backends = Backends {
//!     servo_bus: Box::new(SimulationServoBus::new()),
//!     audio: Box::new(SimulationAudioPlayer::new(clock.clone())),
//!     lights: Box::new(SimulationLightBus::new()),
//!     observer: Box::new(ScriptedGuestObserver::new(clock)),
//! };
//! let mut runtime = Runtime::new(presets::demo_config(), backends).unwrap();
//! runtime.start();
//! ```

pub mod drivers;
pub mod presets;

pub use drivers::{
    GuestScript, ScriptedGuestObserver, SimulationAudioPlayer, SimulationLightBus,
    SimulationServoBus,
};

#[cfg(feature = "i2c-hardware")]
pub use drivers::{Pca9685Config, Pca9685ServoBus};

//! # CHOREO - Character Choreography & Safety Framework
//!
//! CHOREO animates a physical character by orchestrating servo motion,
//! audio and lighting in tight temporal synchrony, reacting to sensed
//! guests and enforcing hard safety limits for long-duration public
//! operation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use choreo::prelude::*;
//! use choreo::library::presets;
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
//! runtime.controller().trigger_experience("greeting_show", Default::default()).ok();
//! ```

// Re-export core components
pub use choreo_core::{self, *};

// Re-export the standard library with an alias
pub use choreo_library as library;

// Re-export serde at crate root for downstream config types
pub use serde;

/// The CHOREO prelude - everything you need to get started
pub mod prelude {
    pub use choreo_core::adapters::{
        AudioPlayer, GuestObserver, LightBus, LightPattern, PlayHandle, ServoBus,
    };
    pub use choreo_core::behavior::{Intensity, PersonalityMode};
    pub use choreo_core::config::ShowConfig;
    pub use choreo_core::control::{Controller, ExperienceHandle, TriggerOverrides};
    pub use choreo_core::core::{Clock, MonotonicClock, VirtualClock};
    pub use choreo_core::curves::Easing;
    pub use choreo_core::error::{ChoreoError, ChoreoResult};
    pub use choreo_core::motion::{ChannelTimeline, Keyframe};
    pub use choreo_core::runtime::{Backends, Runtime};
    pub use choreo_core::safety::Severity;
    pub use choreo_core::sequence::{CoordinationType, PersonalityParams, Sequence};
    pub use choreo_core::timeline::{Experience, SyncTolerance, TimelineElement};
    pub use choreo_library::drivers::{
        ScriptedGuestObserver, SimulationAudioPlayer, SimulationLightBus, SimulationServoBus,
    };
}

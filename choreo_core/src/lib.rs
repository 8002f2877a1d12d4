//! # CHOREO Core
//!
//! The real-time choreography and safety kernel for animatronic
//! characters. CHOREO drives many servo channels through eased,
//! bio-mechanically layered keyframes, keeps motion, audio and lighting
//! on one timeline, reacts to sensed guests, and enforces hard safety
//! limits with graded, preemptive directives.
//!
//! Building blocks:
//!
//! - **Curves**: pure Disney-style easing functions
//! - **Motion**: keyframes and the 50 Hz scheduler
//! - **Sequence**: coordination strategies and the personality-aware compiler
//! - **Timeline**: experiences with bounded sync tolerances
//! - **Behavior**: the personality engine and selection rules
//! - **Safety**: the independent supervisor, incident log and watchdog
//! - **Adapters**: thin contracts for servo, audio, light and vision backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use choreo_core::config::ShowConfig;
//! use choreo_core::runtime::{Backends, Runtime};
//!
//! # fn backends() -> Backends { unimplemented!() }
//! let config = ShowConfig::find_and_load().expect("config");
//! let mut runtime = Runtime::new(config, backends()).expect("assemble");
//! runtime.start();
//! let controller = runtime.controller();
//! controller.trigger_experience("greeting", Default::default()).ok();
//! ```

pub mod adapters;
pub mod behavior;
pub mod bus;
pub mod config;
pub mod control;
pub mod core;
pub mod curves;
pub mod error;
pub mod motion;
pub mod runtime;
pub mod safety;
pub mod sequence;
pub mod telemetry;
pub mod timeline;

// Re-export commonly used types for easy access
pub use adapters::{AudioPlayer, GuestObserver, LightBus, LightPattern, PlayHandle, ServoBus};
pub use behavior::{BehaviorSelector, Intensity, PersonalityMode, PersonalityState};
pub use config::ShowConfig;
pub use control::{Controller, ExperienceHandle, StatusReport, TriggerOverrides};
pub use core::{
    Clock, GuestObservation, JointConfig, JointId, JointState, JointTable, MonotonicClock,
    ProximityZone, VirtualClock,
};
pub use curves::Easing;
pub use error::{ChoreoError, ChoreoResult};
pub use motion::{ChannelTimeline, Keyframe, MotionScheduler};
pub use runtime::{Backends, Runtime};
pub use safety::{SafetyDirective, SafetyLimits, SafetySupervisor, Severity};
pub use sequence::{CoordinationType, PersonalityParams, Sequence, SequenceCompiler};
pub use timeline::{Experience, SyncTolerance, TimelineCoordinator, TimelineElement};

//! Core data model: joints, guests, the injected clock

pub mod clock;
pub mod guest;
pub mod joint;

pub use clock::{Clock, MonotonicClock, VirtualClock};
pub use guest::{AgeGroup, Emotion, Gesture, GuestObservation, ProximityZone};
pub use joint::{FaultKind, JointConfig, JointId, JointState, JointTable};

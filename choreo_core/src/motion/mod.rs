//! Motion: keyframes and the per-tick scheduler

pub mod keyframe;
pub mod scheduler;

pub use keyframe::{validate_keyframes, ChannelTimeline, Keyframe};
pub use scheduler::{MotionMetrics, MotionScheduler, FLOOR_TICK_HZ, TARGET_TICK_HZ};

//! Keyframes and per-joint timelines
//!
//! A `Keyframe` is one timed target for one joint, with easing and the
//! bio-mechanical modifiers layered on during evaluation. A
//! `ChannelTimeline` is the ordered, non-empty list of keyframes the
//! scheduler walks for one joint.

use serde::{Deserialize, Serialize};

use crate::core::{JointConfig, JointId};
use crate::curves::Easing;
use crate::error::{ChoreoError, ChoreoResult};

/// Staging priority range, 1..=10, higher stages first
pub const STAGING_PRIORITY_MIN: u8 = 1;
pub const STAGING_PRIORITY_MAX: u8 = 10;

/// One timed target position with easing and bio-mechanical modifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Target angle in degrees
    pub target_deg: f64,
    /// Segment duration in seconds, must be > 0
    pub duration_s: f64,
    #[serde(default)]
    pub easing: Easing,
    /// Anticipation lead time before the main motion, seconds
    #[serde(default)]
    pub anticipation_lead_s: f64,
    /// Follow-through settling time after the main motion, seconds
    #[serde(default)]
    pub follow_through_s: f64,
    /// Secondary oscillation amplitude, degrees
    #[serde(default)]
    pub secondary_amp_deg: f64,
    /// Secondary oscillation frequency, Hz; required > 0 when amp > 0
    #[serde(default)]
    pub secondary_freq_hz: f64,
    /// Arc modifier strength, 0..1; scaled by the per-joint arc constant
    #[serde(default)]
    pub arc_amount: f64,
    /// Visual staging importance, 1..=10
    #[serde(default = "default_staging_priority")]
    pub staging_priority: u8,
}

fn default_staging_priority() -> u8 {
    5
}

impl Keyframe {
    /// Plain keyframe with no modifiers
    pub fn new(target_deg: f64, duration_s: f64, easing: Easing) -> Self {
        Self {
            target_deg,
            duration_s,
            easing,
            anticipation_lead_s: 0.0,
            follow_through_s: 0.0,
            secondary_amp_deg: 0.0,
            secondary_freq_hz: 0.0,
            arc_amount: 0.0,
            staging_priority: default_staging_priority(),
        }
    }

    pub fn with_staging(mut self, priority: u8) -> Self {
        self.staging_priority = priority;
        self
    }

    pub fn with_secondary(mut self, amp_deg: f64, freq_hz: f64) -> Self {
        self.secondary_amp_deg = amp_deg;
        self.secondary_freq_hz = freq_hz;
        self
    }

    pub fn with_arc(mut self, amount: f64) -> Self {
        self.arc_amount = amount;
        self
    }

    /// Validate this keyframe against a joint's configuration
    ///
    /// `from_deg` is the position the motion starts from (previous keyframe
    /// target, or current position for the first keyframe).
    pub fn validate(&self, config: &JointConfig, from_deg: f64) -> ChoreoResult<()> {
        self.easing.validate()?;

        if !(self.duration_s > 0.0) || !self.duration_s.is_finite() {
            return Err(ChoreoError::InvalidKeyframe(format!(
                "duration {} must be positive and finite",
                self.duration_s
            )));
        }
        if !self.target_deg.is_finite() {
            return Err(ChoreoError::InvalidKeyframe("non-finite target".into()));
        }
        if !config.contains(self.target_deg) {
            return Err(ChoreoError::OutOfRange {
                joint: config.name.clone(),
                angle_deg: self.target_deg,
                min_deg: config.min_deg,
                max_deg: config.max_deg,
            });
        }
        if !(STAGING_PRIORITY_MIN..=STAGING_PRIORITY_MAX).contains(&self.staging_priority) {
            return Err(ChoreoError::InvalidKeyframe(format!(
                "staging priority {} not in 1..=10",
                self.staging_priority
            )));
        }
        if self.secondary_amp_deg > 0.0 && !(self.secondary_freq_hz > 0.0) {
            return Err(ChoreoError::InvalidKeyframe(
                "secondary amplitude set without a positive frequency".into(),
            ));
        }
        if self.secondary_amp_deg < 0.0 || self.arc_amount < 0.0 {
            return Err(ChoreoError::InvalidKeyframe(
                "negative modifier amplitude".into(),
            ));
        }

        // Kinematic bound: the eased peak velocity of a monotone segment is
        // bounded by ~2x the mean (cubic in/out peaks at 1.5x, quart at 2x).
        let displacement = (self.target_deg - from_deg).abs();
        let mean_velocity = displacement / self.duration_s;
        if mean_velocity > config.max_velocity {
            return Err(ChoreoError::KinematicInfeasible {
                joint: config.name.clone(),
                detail: format!(
                    "{}° in {}s implies {:.0}°/s > limit {:.0}°/s",
                    displacement, self.duration_s, mean_velocity, config.max_velocity
                ),
            });
        }
        // Acceleration bound from a triangular velocity profile: the segment
        // needs at least v_peak/a seconds to reach its mean velocity.
        let implied_accel = 4.0 * displacement / (self.duration_s * self.duration_s);
        if implied_accel > config.max_acceleration {
            return Err(ChoreoError::KinematicInfeasible {
                joint: config.name.clone(),
                detail: format!(
                    "{}° in {}s implies {:.0}°/s² > limit {:.0}°/s²",
                    displacement, self.duration_s, implied_accel, config.max_acceleration
                ),
            });
        }
        Ok(())
    }
}

/// Validate a keyframe chain against a joint config, threading the `from`
/// position through so velocity bounds see the real segment displacements
pub fn validate_keyframes(
    config: &JointConfig,
    start_deg: f64,
    keyframes: &[Keyframe],
) -> ChoreoResult<()> {
    if keyframes.is_empty() {
        return Err(ChoreoError::InvalidKeyframe(format!(
            "empty timeline for joint '{}'",
            config.name
        )));
    }
    let mut from = start_deg;
    for keyframe in keyframes {
        keyframe.validate(config, from)?;
        from = keyframe.target_deg;
    }
    Ok(())
}

/// Ordered, non-empty keyframe list for one joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTimeline {
    pub joint: JointId,
    pub keyframes: Vec<Keyframe>,
}

impl ChannelTimeline {
    pub fn new(joint: JointId, keyframes: Vec<Keyframe>) -> Self {
        Self { joint, keyframes }
    }

    /// Total playing time: the sum of keyframe durations
    pub fn duration_s(&self) -> f64 {
        self.keyframes.iter().map(|k| k.duration_s).sum()
    }

    /// Highest staging priority across this channel's keyframes
    pub fn max_staging_priority(&self) -> u8 {
        self.keyframes
            .iter()
            .map(|k| k.staging_priority)
            .max()
            .unwrap_or(STAGING_PRIORITY_MIN)
    }

    /// Validate the whole chain against the joint config
    pub fn validate(&self, config: &JointConfig, start_deg: f64) -> ChoreoResult<()> {
        validate_keyframes(config, start_deg, &self.keyframes)
    }

    /// Negate all targets about the joint's rest position (Mirror coordination)
    pub fn mirrored_about(&self, rest_deg: f64) -> Self {
        let mut mirrored = self.clone();
        for keyframe in &mut mirrored.keyframes {
            keyframe.target_deg = rest_deg - (keyframe.target_deg - rest_deg);
        }
        mirrored
    }
}

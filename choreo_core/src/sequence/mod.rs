//! Sequences: named multi-channel motions with a coordination strategy
//!
//! A `Sequence` is authored content (config file or presets); the
//! [`compiler::SequenceCompiler`] turns it into flat per-channel timelines
//! with concrete start offsets for the motion scheduler.

pub mod compiler;

pub use compiler::{CompiledChannel, CompiledSequence, SequenceCompiler};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::JointId;
use crate::motion::ChannelTimeline;

/// How a sequence's channels are aligned in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationType {
    /// All channels begin together
    #[default]
    Synchronized,
    /// One channel after another, staging order, with a 100 ms gap
    Sequential,
    /// Primary channel leads; secondaries stagger in behind it
    Layered,
    /// Each channel starts when the previous reaches 30% of its first segment
    ChainReaction,
    /// Paired channels play negated with a 50 ms delay
    Mirror,
    /// Uniform per-channel delay steps
    Offset,
}

/// Gap between Sequential channels, seconds
pub const SEQUENTIAL_GAP_S: f64 = 0.1;
/// Base stagger for Layered secondaries, seconds
pub const LAYERED_BASE_S: f64 = 0.2;
/// Per-rank stagger increment for Layered secondaries, seconds
pub const LAYERED_STEP_S: f64 = 0.1;
/// Fraction of the previous channel's first segment that triggers the next
pub const CHAIN_TRIGGER_FRACTION: f64 = 0.3;
/// Delay of the mirrored partner, seconds
pub const MIRROR_DELAY_S: f64 = 0.05;

/// Personality parameter bundle consumed by the compiler
///
/// The behavior selector prepares these from the active mode; the compiler
/// only applies them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityParams {
    /// Multiplies all durations
    pub temporal_scale: f64,
    /// Multiplies target displacements relative to each joint's rest
    pub physical_scale: f64,
    /// Scales exaggeration, squash depth and secondary amplitude
    pub emotional_intensity: f64,
    /// Scales arc amounts
    pub bio_mechanical_realism: f64,
    /// Base exaggeration about rest
    pub exaggeration: f64,
}

impl Default for PersonalityParams {
    fn default() -> Self {
        Self {
            temporal_scale: 1.0,
            physical_scale: 1.0,
            emotional_intensity: 1.0,
            bio_mechanical_realism: 1.0,
            exaggeration: 1.0,
        }
    }
}

impl PersonalityParams {
    /// Compose two bundles: authored per-sequence flavor times the
    /// runtime personality
    pub fn combined_with(&self, other: &PersonalityParams) -> PersonalityParams {
        PersonalityParams {
            temporal_scale: self.temporal_scale * other.temporal_scale,
            physical_scale: self.physical_scale * other.physical_scale,
            emotional_intensity: self.emotional_intensity * other.emotional_intensity,
            bio_mechanical_realism: self.bio_mechanical_realism * other.bio_mechanical_realism,
            exaggeration: self.exaggeration * other.exaggeration,
        }
    }
}

/// A named, reusable set of channel timelines with a coordination strategy
///
/// Built by the config loader (joint names already interned to ids) or by
/// preset constructors. `BTreeMap` keeps iteration deterministic so the
/// same sequence always compiles to the same output.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    pub coordination: CoordinationType,
    pub timelines: BTreeMap<JointId, ChannelTimeline>,
    pub total_duration_s: f64,
    /// Relative appeal, used when substituting magic-moment variants
    pub appeal_weight: f64,
    /// Authored flavor baked into the sequence, composed with the
    /// runtime personality at compile time
    pub personality_params: PersonalityParams,
    /// Mirror coordination pairs: (primary, mirrored follower)
    pub mirror_pairs: Vec<(JointId, JointId)>,
    /// Per-rank delay for Offset coordination, seconds
    pub offset_step_s: f64,
}

impl Sequence {
    pub fn new(id: &str, coordination: CoordinationType) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            coordination,
            timelines: BTreeMap::new(),
            total_duration_s: 0.0,
            appeal_weight: 1.0,
            personality_params: PersonalityParams::default(),
            mirror_pairs: Vec::new(),
            offset_step_s: 0.0,
        }
    }

    /// Add a channel and grow the nominal total duration to cover it
    pub fn with_channel(mut self, timeline: ChannelTimeline) -> Self {
        let duration = timeline.duration_s();
        if duration > self.total_duration_s {
            self.total_duration_s = duration;
        }
        self.timelines.insert(timeline.joint, timeline);
        self
    }

    pub fn with_appeal(mut self, appeal_weight: f64) -> Self {
        self.appeal_weight = appeal_weight;
        self
    }

    pub fn with_personality(mut self, params: PersonalityParams) -> Self {
        self.personality_params = params;
        self
    }

    pub fn with_mirror_pair(mut self, primary: JointId, follower: JointId) -> Self {
        self.mirror_pairs.push((primary, follower));
        self
    }

    pub fn with_offset_step(mut self, step_s: f64) -> Self {
        self.offset_step_s = step_s;
        self
    }

    /// Longest single channel, seconds
    pub fn longest_channel_s(&self) -> f64 {
        self.timelines
            .values()
            .map(|t| t.duration_s())
            .fold(0.0, f64::max)
    }
}

//! Sequence compiler
//!
//! Turns a `Sequence` plus a `PersonalityParams` bundle and the current
//! joint state into flat, per-channel keyframe lists with concrete start
//! offsets. Compilation is deterministic: the same inputs always produce
//! the same output, and it either fully validates or fully rejects —
//! nothing is ever enqueued partially.

use std::sync::Arc;

use crate::core::{JointId, JointState, JointTable};
use crate::error::{ChoreoError, ChoreoResult};
use crate::motion::keyframe::{validate_keyframes, Keyframe};
use crate::sequence::{
    CoordinationType, PersonalityParams, Sequence, CHAIN_TRIGGER_FRACTION, LAYERED_BASE_S,
    LAYERED_STEP_S, MIRROR_DELAY_S, SEQUENTIAL_GAP_S,
};

/// Amplitude scale applied while squashing at nominal intensity
const BASE_SQUASH_FACTOR: f64 = 0.95;

/// One joint's compiled timeline with its concrete start offset
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledChannel {
    pub joint: JointId,
    /// Seconds after sequence start that this channel begins
    pub start_offset_s: f64,
    pub keyframes: Vec<Keyframe>,
}

impl CompiledChannel {
    pub fn duration_s(&self) -> f64 {
        self.keyframes.iter().map(|k| k.duration_s).sum()
    }

    pub fn end_offset_s(&self) -> f64 {
        self.start_offset_s + self.duration_s()
    }
}

/// Fully resolved sequence, ready for the motion scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSequence {
    pub sequence_id: String,
    pub channels: Vec<CompiledChannel>,
    /// Exaggeration about rest applied at evaluation time
    pub exaggeration: f64,
    /// Amplitude scale applied while the motion is fast
    pub squash_factor: f64,
    pub total_duration_s: f64,
}

/// Compiles sequences against the immutable joint table
pub struct SequenceCompiler {
    table: Arc<JointTable>,
}

impl SequenceCompiler {
    pub fn new(table: Arc<JointTable>) -> Self {
        Self { table }
    }

    /// Compile a sequence with personality applied
    ///
    /// `joint_states` is the scheduler's latest snapshot, used for
    /// start-from-current validation.
    pub fn compile(
        &self,
        sequence: &Sequence,
        params: &PersonalityParams,
        joint_states: &[JointState],
    ) -> ChoreoResult<CompiledSequence> {
        if sequence.timelines.is_empty() {
            return Err(ChoreoError::InvalidKeyframe(format!(
                "sequence '{}' has no channels",
                sequence.id
            )));
        }

        // Authored flavor composes with the runtime bundle, then the
        // personality transform runs first so coordination offsets see
        // the scaled durations.
        let params = sequence.personality_params.combined_with(params);
        let params = &params;
        let mut transformed: Vec<(JointId, Vec<Keyframe>)> = Vec::new();
        for (&joint, timeline) in &sequence.timelines {
            let config = self.table.config(joint)?;
            let keyframes = timeline
                .keyframes
                .iter()
                .map(|k| transform_keyframe(k, config.rest_deg, params))
                .collect();
            transformed.push((joint, keyframes));
        }

        if sequence.coordination == CoordinationType::Synchronized {
            let scaled_total = sequence.total_duration_s * params.temporal_scale;
            for (joint, keyframes) in &transformed {
                let duration: f64 = keyframes.iter().map(|k| k.duration_s).sum();
                if duration > scaled_total + 1e-9 {
                    return Err(ChoreoError::InvalidKeyframe(format!(
                        "synchronized sequence '{}': channel {} is longer than the sequence",
                        sequence.id, joint
                    )));
                }
            }
        }

        let channels = self.coordinate(sequence, transformed)?;

        // Whole-or-nothing validation against the joint table
        for channel in &channels {
            let config = self.table.config(channel.joint)?;
            let start_deg = joint_states
                .get(channel.joint.index())
                .map(|s| s.current_deg)
                .unwrap_or(config.rest_deg);
            validate_keyframes(config, start_deg, &channel.keyframes)?;
        }

        let total_duration_s = channels
            .iter()
            .map(CompiledChannel::end_offset_s)
            .fold(0.0, f64::max);

        Ok(CompiledSequence {
            sequence_id: sequence.id.clone(),
            channels,
            exaggeration: params.exaggeration * params.emotional_intensity,
            squash_factor: 1.0 - (1.0 - BASE_SQUASH_FACTOR) * params.emotional_intensity,
            total_duration_s,
        })
    }

    /// Assign start offsets per the coordination type
    fn coordinate(
        &self,
        sequence: &Sequence,
        transformed: Vec<(JointId, Vec<Keyframe>)>,
    ) -> ChoreoResult<Vec<CompiledChannel>> {
        // Staging order: highest priority first; ties break on joint id so
        // compilation stays deterministic.
        let mut staged = transformed;
        staged.sort_by(|(a_joint, a_kf), (b_joint, b_kf)| {
            let a_priority = max_staging(a_kf);
            let b_priority = max_staging(b_kf);
            b_priority.cmp(&a_priority).then(a_joint.cmp(b_joint))
        });

        let channels = match sequence.coordination {
            CoordinationType::Synchronized => staged
                .into_iter()
                .map(|(joint, keyframes)| CompiledChannel {
                    joint,
                    start_offset_s: 0.0,
                    keyframes,
                })
                .collect(),

            CoordinationType::Sequential => {
                let mut cursor = 0.0;
                let mut channels = Vec::new();
                for (joint, keyframes) in staged {
                    let duration: f64 = keyframes.iter().map(|k| k.duration_s).sum();
                    channels.push(CompiledChannel {
                        joint,
                        start_offset_s: cursor,
                        keyframes,
                    });
                    cursor += duration + SEQUENTIAL_GAP_S;
                }
                channels
            }

            CoordinationType::Layered => staged
                .into_iter()
                .enumerate()
                .map(|(rank, (joint, keyframes))| CompiledChannel {
                    joint,
                    start_offset_s: if rank == 0 {
                        0.0
                    } else {
                        LAYERED_BASE_S + LAYERED_STEP_S * rank as f64
                    },
                    keyframes,
                })
                .collect(),

            CoordinationType::ChainReaction => {
                // Each channel starts when the previous reaches 30% of its
                // first segment.
                let mut cursor = 0.0;
                let mut channels = Vec::new();
                for (joint, keyframes) in staged {
                    let first_segment_s = keyframes.first().map(|k| k.duration_s).unwrap_or(0.0);
                    channels.push(CompiledChannel {
                        joint,
                        start_offset_s: cursor,
                        keyframes,
                    });
                    cursor += first_segment_s * CHAIN_TRIGGER_FRACTION;
                }
                channels
            }

            CoordinationType::Mirror => {
                let mut channels: Vec<CompiledChannel> = staged
                    .into_iter()
                    .map(|(joint, keyframes)| CompiledChannel {
                        joint,
                        start_offset_s: 0.0,
                        keyframes,
                    })
                    .collect();
                for &(primary, follower) in &sequence.mirror_pairs {
                    if !channels.iter().any(|c| c.joint == primary) {
                        return Err(ChoreoError::UnknownJoint(primary.to_string()));
                    }
                    let rest = self.table.config(follower)?.rest_deg;
                    let channel = channels
                        .iter_mut()
                        .find(|c| c.joint == follower)
                        .ok_or_else(|| ChoreoError::UnknownJoint(follower.to_string()))?;
                    for keyframe in &mut channel.keyframes {
                        keyframe.target_deg = rest - (keyframe.target_deg - rest);
                    }
                    channel.start_offset_s = MIRROR_DELAY_S;
                }
                channels
            }

            CoordinationType::Offset => staged
                .into_iter()
                .enumerate()
                .map(|(rank, (joint, keyframes))| CompiledChannel {
                    joint,
                    start_offset_s: sequence.offset_step_s * rank as f64,
                    keyframes,
                })
                .collect(),
        };
        Ok(channels)
    }
}

fn max_staging(keyframes: &[Keyframe]) -> u8 {
    keyframes.iter().map(|k| k.staging_priority).max().unwrap_or(1)
}

fn transform_keyframe(keyframe: &Keyframe, rest_deg: f64, params: &PersonalityParams) -> Keyframe {
    let mut out = keyframe.clone();
    out.duration_s = keyframe.duration_s * params.temporal_scale;
    out.target_deg = rest_deg + (keyframe.target_deg - rest_deg) * params.physical_scale;
    out.secondary_amp_deg = keyframe.secondary_amp_deg * params.emotional_intensity;
    out.arc_amount = keyframe.arc_amount * params.bio_mechanical_realism;
    out.anticipation_lead_s = keyframe.anticipation_lead_s * params.temporal_scale;
    out.follow_through_s = keyframe.follow_through_s * params.temporal_scale;
    out
}

//! Authored content: joints, sequences and experiences
//!
//! A complete droid rig with the house repertoire, usable as a demo show
//! out of the box and as fixtures in the scenario tests. Everything here
//! compiles against [`standard_joint_table`] from rest.

use std::collections::HashMap;
use std::sync::Arc;

use choreo_core::adapters::LightPattern;
use choreo_core::config::ShowConfig;
use choreo_core::core::{JointConfig, JointTable};
use choreo_core::curves::Easing;
use choreo_core::error::ChoreoResult;
use choreo_core::motion::{ChannelTimeline, Keyframe};
use choreo_core::safety::SafetyLimits;
use choreo_core::sequence::{CoordinationType, PersonalityParams, Sequence};
use choreo_core::timeline::{Experience, SyncTolerance, TimelineElement};

fn joint(
    name: &str,
    bus_channel: u8,
    range: (f64, f64),
    max_velocity: f64,
    max_acceleration: f64,
) -> JointConfig {
    JointConfig {
        name: name.into(),
        bus_channel,
        min_deg: range.0,
        max_deg: range.1,
        rest_deg: 0.0,
        max_velocity,
        max_acceleration,
        pwm_min_us: 500,
        pwm_max_us: 2500,
        invert: false,
        trim_deg: 0.0,
    }
}

/// The standard six-joint droid rig
pub fn standard_joint_table() -> JointTable {
    JointTable::new(vec![
        joint("head_pitch", 0, (-45.0, 30.0), 120.0, 720.0),
        joint("head_yaw", 1, (-90.0, 90.0), 90.0, 540.0),
        joint("dome_rotation", 2, (-360.0, 360.0), 60.0, 360.0),
        joint("periscope_lift", 3, (0.0, 40.0), 80.0, 480.0),
        joint("arm_left", 4, (-30.0, 90.0), 100.0, 600.0),
        joint("arm_right", 5, (-30.0, 90.0), 100.0, 600.0),
    ])
    .expect("standard rig is valid")
}

/// Enthusiastic greeting: anticipation dip, bounce up, settle home
pub fn enthusiastic_greeting(table: &JointTable) -> ChoreoResult<Sequence> {
    let head_pitch = table.id_by_name("head_pitch")?;
    let dome = table.id_by_name("dome_rotation")?;
    Ok(Sequence::new("enthusiastic_greeting", CoordinationType::Synchronized)
        .with_appeal(1.4)
        .with_channel(ChannelTimeline::new(
            head_pitch,
            vec![
                Keyframe::new(-5.0, 0.3, Easing::EaseOutBack).with_staging(9),
                Keyframe::new(15.0, 0.6, Easing::EaseOutBounce).with_staging(9),
                Keyframe::new(-3.0, 0.4, Easing::EaseInQuad).with_staging(8),
                Keyframe::new(10.0, 0.5, Easing::EaseOutCubic).with_staging(8),
                Keyframe::new(0.0, 0.8, Easing::EaseInOutCubic).with_staging(7),
            ],
        ))
        .with_channel(ChannelTimeline::new(
            dome,
            vec![
                Keyframe::new(25.0, 1.2, Easing::EaseInOutCubic)
                    .with_staging(5)
                    .with_arc(0.3),
                Keyframe::new(0.0, 1.4, Easing::Settle { power: 1.0 }).with_staging(4),
            ],
        )))
}

/// Sequential scan: head sweep first, dome follows after the gap
pub fn sequential_scan(table: &JointTable) -> ChoreoResult<Sequence> {
    let head_yaw = table.id_by_name("head_yaw")?;
    let dome = table.id_by_name("dome_rotation")?;
    Ok(Sequence::new("sequential_scan", CoordinationType::Sequential)
        .with_channel(ChannelTimeline::new(
            head_yaw,
            vec![
                Keyframe::new(0.0, 0.5, Easing::EaseInOutQuad).with_staging(8),
                Keyframe::new(-45.0, 1.5, Easing::EaseInOutCubic).with_staging(8),
                Keyframe::new(45.0, 2.5, Easing::EaseInOutCubic).with_staging(8),
                Keyframe::new(0.0, 1.5, Easing::EaseInOutQuad).with_staging(8),
            ],
        ))
        .with_channel(ChannelTimeline::new(
            dome,
            vec![
                Keyframe::new(180.0, 3.0, Easing::EaseInOutCubic).with_staging(4),
                Keyframe::new(-180.0, 6.0, Easing::EaseInOutCubic).with_staging(4),
                Keyframe::new(0.0, 3.0, Easing::EaseInOutQuad).with_staging(4),
            ],
        )))
}

/// Alert posture: snap up, hold stiff, periscope out
pub fn alert_posture(table: &JointTable) -> ChoreoResult<Sequence> {
    let head_pitch = table.id_by_name("head_pitch")?;
    let periscope = table.id_by_name("periscope_lift")?;
    Ok(Sequence::new("alert_posture", CoordinationType::ChainReaction)
        .with_channel(ChannelTimeline::new(
            head_pitch,
            vec![
                Keyframe::new(-12.0, 0.3, Easing::EaseOutQuart).with_staging(10),
                Keyframe::new(-10.0, 1.0, Easing::Settle { power: 2.0 }).with_staging(6),
            ],
        ))
        .with_channel(ChannelTimeline::new(
            periscope,
            vec![Keyframe::new(35.0, 0.6, Easing::EaseOutBack).with_staging(7)],
        )))
}

/// Curious tilt: slow lean with secondary wobble, dome trailing
pub fn curious_tilt(table: &JointTable) -> ChoreoResult<Sequence> {
    let head_pitch = table.id_by_name("head_pitch")?;
    let dome = table.id_by_name("dome_rotation")?;
    Ok(Sequence::new("curious_tilt", CoordinationType::Layered)
        .with_channel(ChannelTimeline::new(
            head_pitch,
            vec![
                Keyframe::new(
                    8.0,
                    1.2,
                    Easing::Anticipation {
                        lead: 0.2,
                        overshoot: 0.1,
                    },
                )
                .with_staging(9)
                .with_secondary(1.5, 0.8),
                Keyframe::new(0.0, 1.0, Easing::Settle { power: 1.0 }).with_staging(5),
            ],
        ))
        .with_channel(ChannelTimeline::new(
            dome,
            vec![Keyframe::new(-30.0, 1.8, Easing::EaseInOutCubic)
                .with_staging(3)
                .with_arc(0.4)],
        )))
}

/// Celebration wiggle: mirrored arm waves with squash
pub fn celebration_wiggle(table: &JointTable) -> ChoreoResult<Sequence> {
    let arm_left = table.id_by_name("arm_left")?;
    let arm_right = table.id_by_name("arm_right")?;
    Ok(Sequence::new("celebration_wiggle", CoordinationType::Mirror)
        .with_appeal(1.8)
        .with_mirror_pair(arm_left, arm_right)
        .with_channel(ChannelTimeline::new(
            arm_left,
            vec![
                Keyframe::new(25.0, 0.4, Easing::Squash { amount: 0.3 }).with_staging(8),
                Keyframe::new(-15.0, 0.5, Easing::EaseInOutQuad).with_staging(8),
                Keyframe::new(20.0, 0.4, Easing::Squash { amount: 0.3 }).with_staging(7),
                Keyframe::new(0.0, 0.6, Easing::Settle { power: 1.5 }).with_staging(6),
            ],
        ))
        .with_channel(ChannelTimeline::new(
            arm_right,
            vec![
                Keyframe::new(25.0, 0.4, Easing::Squash { amount: 0.3 }).with_staging(8),
                Keyframe::new(-15.0, 0.5, Easing::EaseInOutQuad).with_staging(8),
                Keyframe::new(20.0, 0.4, Easing::Squash { amount: 0.3 }).with_staging(7),
                Keyframe::new(0.0, 0.6, Easing::Settle { power: 1.5 }).with_staging(6),
            ],
        )))
}

/// Idle scan matching the curious default mode
pub fn idle_curious_scan(table: &JointTable) -> ChoreoResult<Sequence> {
    let head_yaw = table.id_by_name("head_yaw")?;
    Ok(Sequence::new("idle_curious_scan", CoordinationType::Synchronized)
        .with_channel(ChannelTimeline::new(
            head_yaw,
            vec![
                Keyframe::new(20.0, 2.0, Easing::EaseInOutCubic)
                    .with_staging(3)
                    .with_secondary(1.0, 0.4),
                Keyframe::new(-20.0, 3.0, Easing::EaseInOutCubic).with_staging(3),
                Keyframe::new(0.0, 2.0, Easing::Settle { power: 0.8 }).with_staging(3),
            ],
        )))
}

/// The house personality bundles
pub fn standard_personalities() -> HashMap<String, PersonalityParams> {
    let mut bundles = HashMap::new();
    bundles.insert(
        "playful".to_string(),
        PersonalityParams {
            temporal_scale: 0.8,
            physical_scale: 1.2,
            emotional_intensity: 1.3,
            bio_mechanical_realism: 0.9,
            exaggeration: 1.2,
        },
    );
    bundles.insert(
        "gentle".to_string(),
        PersonalityParams {
            temporal_scale: 1.4,
            physical_scale: 0.7,
            emotional_intensity: 0.6,
            bio_mechanical_realism: 1.2,
            exaggeration: 0.7,
        },
    );
    bundles.insert(
        "protective".to_string(),
        PersonalityParams {
            temporal_scale: 1.2,
            physical_scale: 0.6,
            emotional_intensity: 0.5,
            bio_mechanical_realism: 1.0,
            exaggeration: 0.7,
        },
    );
    bundles
}

/// Experience catalog built over the preset sequences
pub fn standard_experiences() -> HashMap<String, Experience> {
    let mut catalog = HashMap::new();

    let greeting = Experience::new("greeting_show")
        .with_element(
            TimelineElement::motion("wave", "enthusiastic_greeting", 0.0, 2.6)
                .with_sync(SyncTolerance::Tight)
                .with_priority(6),
        )
        .with_element(
            TimelineElement::audio("chirp", "greeting_chirp", 0.3, 1.8)
                .with_sync(SyncTolerance::Tight)
                .depends("wave"),
        )
        .with_element(
            TimelineElement::light("glow", "dome", LightPattern::Pulse, 0.0, 2.6)
                .with_sync(SyncTolerance::Loose),
        );
    catalog.insert(greeting.id.clone(), greeting);

    // Selector-facing variants of the greeting
    for (id, appeal_audio) in [
        ("greeting_warm_recognition", "warm_warble"),
        ("greeting_magic_moment", "magic_fanfare"),
    ] {
        let variant = Experience::new(id)
            .with_element(
                TimelineElement::motion("wave", "enthusiastic_greeting", 0.0, 2.6)
                    .with_priority(7),
            )
            .with_element(
                TimelineElement::audio("sting", appeal_audio, 0.2, 2.0).depends("wave"),
            );
        catalog.insert(variant.id.clone(), variant);
    }

    let scan = Experience::new("area_scan").with_element(
        TimelineElement::motion("sweep", "sequential_scan", 0.0, 18.1)
            .with_sync(SyncTolerance::Natural)
            .with_priority(3),
    );
    catalog.insert(scan.id.clone(), scan);

    let alert = Experience::new("alert_display")
        .with_element(
            TimelineElement::motion("posture", "alert_posture", 0.0, 1.3).with_priority(9),
        )
        .with_element(
            TimelineElement::light("strobe", "all", LightPattern::Alert, 0.0, 2.0)
                .with_priority(9),
        )
        .with_element(
            TimelineElement::audio("warning", "alert_tone", 0.0, 1.5)
                .with_priority(9)
                .with_sync(SyncTolerance::Narrative),
        );
    catalog.insert(alert.id.clone(), alert);

    let idle = Experience::new("idle_curious_scan").with_element(
        TimelineElement::motion("scan", "idle_curious_scan", 0.0, 7.0)
            .with_sync(SyncTolerance::Natural)
            .with_priority(1),
    );
    catalog.insert(idle.id.clone(), idle);

    let celebration = Experience::new("celebration")
        .with_element(
            TimelineElement::motion("wiggle", "celebration_wiggle", 0.0, 1.95).with_priority(6),
        )
        .with_element(
            TimelineElement::audio("whoop", "celebration_whistle", 0.1, 1.8).depends("wiggle"),
        );
    catalog.insert(celebration.id.clone(), celebration);

    catalog
}

/// A complete ready-to-run show configuration
pub fn demo_config() -> ShowConfig {
    let table = Arc::new(standard_joint_table());
    let mut sequences = HashMap::new();
    for sequence in [
        enthusiastic_greeting(&table).expect("preset"),
        sequential_scan(&table).expect("preset"),
        alert_posture(&table).expect("preset"),
        curious_tilt(&table).expect("preset"),
        celebration_wiggle(&table).expect("preset"),
        idle_curious_scan(&table).expect("preset"),
    ] {
        sequences.insert(sequence.id.clone(), sequence);
    }
    ShowConfig {
        table,
        safety: SafetyLimits::default(),
        sequences,
        personalities: standard_personalities(),
        experiences: standard_experiences(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::core::JointState;
    use choreo_core::sequence::SequenceCompiler;
    use approx::assert_relative_eq;

    #[test]
    fn test_every_preset_compiles_from_rest() {
        let config = demo_config();
        let compiler = SequenceCompiler::new(config.table.clone());
        let now = std::time::Instant::now();
        let states: Vec<JointState> = config
            .table
            .iter()
            .map(|(_, c)| JointState::at_rest(c, now))
            .collect();
        for (id, sequence) in &config.sequences {
            let compiled = compiler
                .compile(sequence, &PersonalityParams::default(), &states)
                .unwrap_or_else(|e| panic!("preset '{}' failed to compile: {}", id, e));
            assert!(!compiled.channels.is_empty());
        }
    }

    #[test]
    fn test_greeting_head_channel_runs_2_6_seconds() {
        let table = standard_joint_table();
        let greeting = enthusiastic_greeting(&table).unwrap();
        let head = table.id_by_name("head_pitch").unwrap();
        assert_relative_eq!(greeting.timelines[&head].duration_s(), 2.6);
    }

    #[test]
    fn test_scan_head_channel_runs_6_seconds() {
        let table = standard_joint_table();
        let scan = sequential_scan(&table).unwrap();
        let head_yaw = table.id_by_name("head_yaw").unwrap();
        assert_relative_eq!(scan.timelines[&head_yaw].duration_s(), 6.0);
    }

    #[test]
    fn test_experiences_reference_known_sequences() {
        let config = demo_config();
        for (id, experience) in &config.experiences {
            experience
                .validate()
                .unwrap_or_else(|e| panic!("experience '{}': {}", id, e));
            for element in &experience.elements {
                if let choreo_core::timeline::ElementKind::Motion { sequence_id } = &element.kind
                {
                    assert!(
                        config.sequences.contains_key(sequence_id),
                        "experience '{}' references unknown sequence '{}'",
                        id,
                        sequence_id
                    );
                }
            }
        }
    }
}

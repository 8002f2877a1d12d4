//! Show configuration
//!
//! One text file (TOML or YAML, picked by extension) declares the joint
//! table, safety-limit overrides, the sequence library, personality
//! bundles and the experience catalog. Loading interns joint names to
//! dense ids and validates everything up front; a config that loads is a
//! config that runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::LightPattern;
use crate::core::{JointState, JointTable};
use crate::error::{ChoreoError, ChoreoResult};
use crate::motion::{ChannelTimeline, Keyframe};
use crate::safety::SafetyLimits;
use crate::sequence::{CoordinationType, PersonalityParams, Sequence, SequenceCompiler};
use crate::timeline::{
    Experience, ImmersionLevel, Precondition, SyncTolerance, TimelineElement,
};

/// Raw config file shape (joint names as strings)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShowConfigFile {
    #[serde(default)]
    pub joints: Vec<crate::core::JointConfig>,
    #[serde(default)]
    pub safety: SafetyLimits,
    #[serde(default)]
    pub sequences: Vec<SequenceSpec>,
    #[serde(default)]
    pub personalities: HashMap<String, PersonalityParams>,
    #[serde(default)]
    pub experiences: Vec<ExperienceSpec>,
}

/// One sequence as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub coordination: CoordinationType,
    pub channels: Vec<ChannelSpec>,
    /// Defaults to the longest channel when omitted
    #[serde(default)]
    pub total_duration_s: Option<f64>,
    #[serde(default = "default_appeal")]
    pub appeal_weight: f64,
    /// Authored flavor baked into the sequence
    #[serde(default)]
    pub personality: PersonalityParams,
    /// (primary, mirrored follower) joint-name pairs
    #[serde(default)]
    pub mirror_pairs: Vec<(String, String)>,
    #[serde(default)]
    pub offset_step_s: f64,
}

fn default_appeal() -> f64 {
    1.0
}

/// One joint's keyframes within a sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub joint: String,
    pub keyframes: Vec<Keyframe>,
}

/// One experience as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceSpec {
    pub id: String,
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub immersion: ImmersionLevel,
    #[serde(default)]
    pub preconditions: Vec<PreconditionSpec>,
}

/// One timeline element as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: ElementKindSpec,
    #[serde(default)]
    pub start_offset_s: f64,
    pub duration_s: f64,
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    #[serde(default)]
    pub sync: SyncTolerance,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_intensity() -> f64 {
    1.0
}

fn default_priority() -> u8 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementKindSpec {
    Motion { sequence: String },
    Audio { clip: String },
    Light { zone: String, pattern: LightPattern },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "require", rename_all = "snake_case")]
pub enum PreconditionSpec {
    MotionIdle,
    MinEnergy { value: f64 },
}

/// Fully resolved, validated configuration
#[derive(Clone, Debug)]
pub struct ShowConfig {
    pub table: Arc<JointTable>,
    pub safety: SafetyLimits,
    pub sequences: HashMap<String, Sequence>,
    pub personalities: HashMap<String, PersonalityParams>,
    pub experiences: HashMap<String, Experience>,
}

impl ShowConfig {
    /// Load from a file, picking the format from the extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> ChoreoResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChoreoError::config(format!("failed to read {}: {}", path.display(), e)))?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            _ => Self::from_yaml(&contents).or_else(|_| Self::from_toml(&contents)),
        }
    }

    pub fn from_toml(contents: &str) -> ChoreoResult<Self> {
        let raw: ShowConfigFile = toml::from_str(contents)?;
        Self::resolve(raw)
    }

    pub fn from_yaml(contents: &str) -> ChoreoResult<Self> {
        let raw: ShowConfigFile = serde_yaml::from_str(contents)?;
        Self::resolve(raw)
    }

    /// Search standard locations: ./choreo.{toml,yaml,yml}, then
    /// $CHOREO_HOME or ~/.choreo/config.{toml,yaml}
    pub fn find_and_load() -> ChoreoResult<Self> {
        let mut paths = vec![
            std::path::PathBuf::from("choreo.toml"),
            std::path::PathBuf::from("choreo.yaml"),
            std::path::PathBuf::from("choreo.yml"),
        ];
        let home = std::env::var_os("CHOREO_HOME")
            .map(std::path::PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| Path::new(&h).join(".choreo")));
        if let Some(dir) = home {
            paths.push(dir.join("config.toml"));
            paths.push(dir.join("config.yaml"));
        }
        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Err(ChoreoError::config(
            "no config file found in standard locations",
        ))
    }

    /// Serialize back to the raw file shape
    pub fn to_raw(&self) -> ShowConfigFile {
        let mut sequences: Vec<SequenceSpec> = self
            .sequences
            .values()
            .map(|sequence| SequenceSpec {
                id: sequence.id.clone(),
                name: Some(sequence.name.clone()),
                coordination: sequence.coordination,
                channels: sequence
                    .timelines
                    .values()
                    .map(|timeline| ChannelSpec {
                        joint: self.table.name(timeline.joint),
                        keyframes: timeline.keyframes.clone(),
                    })
                    .collect(),
                total_duration_s: Some(sequence.total_duration_s),
                appeal_weight: sequence.appeal_weight,
                personality: sequence.personality_params,
                mirror_pairs: sequence
                    .mirror_pairs
                    .iter()
                    .map(|(a, b)| (self.table.name(*a), self.table.name(*b)))
                    .collect(),
                offset_step_s: sequence.offset_step_s,
            })
            .collect();
        sequences.sort_by(|a, b| a.id.cmp(&b.id));

        let mut experiences: Vec<ExperienceSpec> = self
            .experiences
            .values()
            .map(|experience| ExperienceSpec {
                id: experience.id.clone(),
                elements: experience
                    .elements
                    .iter()
                    .map(|element| ElementSpec {
                        id: element.id.clone(),
                        kind: match &element.kind {
                            crate::timeline::ElementKind::Motion { sequence_id } => {
                                ElementKindSpec::Motion {
                                    sequence: sequence_id.clone(),
                                }
                            }
                            crate::timeline::ElementKind::Audio { clip_id } => {
                                ElementKindSpec::Audio {
                                    clip: clip_id.clone(),
                                }
                            }
                            crate::timeline::ElementKind::Light { zone, pattern } => {
                                ElementKindSpec::Light {
                                    zone: zone.clone(),
                                    pattern: *pattern,
                                }
                            }
                        },
                        start_offset_s: element.start_offset_s,
                        duration_s: element.duration_s,
                        intensity: element.intensity,
                        sync: element.sync,
                        priority: element.priority,
                        depends_on: element.depends_on.clone(),
                    })
                    .collect(),
                immersion: experience.immersion,
                preconditions: experience
                    .preconditions
                    .iter()
                    .map(|p| match p {
                        Precondition::MotionIdle => PreconditionSpec::MotionIdle,
                        Precondition::MinEnergy(value) => {
                            PreconditionSpec::MinEnergy { value: *value }
                        }
                    })
                    .collect(),
            })
            .collect();
        experiences.sort_by(|a, b| a.id.cmp(&b.id));

        ShowConfigFile {
            joints: self.table.iter().map(|(_, c)| c.clone()).collect(),
            safety: self.safety.clone(),
            sequences,
            personalities: self.personalities.clone(),
            experiences,
        }
    }

    pub fn to_toml_string(&self) -> ChoreoResult<String> {
        Ok(toml::to_string_pretty(&self.to_raw())?)
    }

    pub fn to_yaml_string(&self) -> ChoreoResult<String> {
        Ok(serde_yaml::to_string(&self.to_raw())?)
    }

    /// Save to a file, picking the format from the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ChoreoResult<()> {
        let path = path.as_ref();
        let contents = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => self.to_toml_string()?,
            _ => self.to_yaml_string()?,
        };
        std::fs::write(path, contents)
            .map_err(|e| ChoreoError::config(format!("failed to write config: {}", e)))
    }

    /// Intern names, build the joint table, validate everything
    fn resolve(raw: ShowConfigFile) -> ChoreoResult<Self> {
        let table = Arc::new(JointTable::new(raw.joints)?);

        let mut sequences = HashMap::new();
        for spec in raw.sequences {
            let mut sequence = Sequence::new(&spec.id, spec.coordination)
                .with_appeal(spec.appeal_weight)
                .with_personality(spec.personality)
                .with_offset_step(spec.offset_step_s);
            if let Some(name) = spec.name {
                sequence.name = name;
            }
            for channel in spec.channels {
                let joint = table.id_by_name(&channel.joint)?;
                sequence = sequence.with_channel(ChannelTimeline::new(joint, channel.keyframes));
            }
            if let Some(total) = spec.total_duration_s {
                sequence.total_duration_s = total;
            }
            for (primary, follower) in spec.mirror_pairs {
                sequence = sequence
                    .with_mirror_pair(table.id_by_name(&primary)?, table.id_by_name(&follower)?);
            }
            if sequences.insert(spec.id.clone(), sequence).is_some() {
                return Err(ChoreoError::config(format!(
                    "duplicate sequence id '{}'",
                    spec.id
                )));
            }
        }

        // A sequence that compiles from rest with neutral personality is
        // well-formed; reject the config otherwise.
        let compiler = SequenceCompiler::new(table.clone());
        let rest_states: Vec<JointState> = {
            let now = std::time::Instant::now();
            table.iter().map(|(_, c)| JointState::at_rest(c, now)).collect()
        };
        for sequence in sequences.values() {
            compiler.compile(sequence, &PersonalityParams::default(), &rest_states)?;
        }

        let mut experiences = HashMap::new();
        for spec in raw.experiences {
            let mut experience = Experience::new(&spec.id).with_immersion(spec.immersion);
            for precondition in &spec.preconditions {
                experience = experience.with_precondition(match precondition {
                    PreconditionSpec::MotionIdle => Precondition::MotionIdle,
                    PreconditionSpec::MinEnergy { value } => Precondition::MinEnergy(*value),
                });
            }
            for element in spec.elements {
                let kind = match element.kind {
                    ElementKindSpec::Motion { sequence } => {
                        if !sequences.contains_key(&sequence) {
                            return Err(ChoreoError::UnknownSequence(sequence));
                        }
                        crate::timeline::ElementKind::Motion {
                            sequence_id: sequence,
                        }
                    }
                    ElementKindSpec::Audio { clip } => {
                        crate::timeline::ElementKind::Audio { clip_id: clip }
                    }
                    ElementKindSpec::Light { zone, pattern } => {
                        crate::timeline::ElementKind::Light { zone, pattern }
                    }
                };
                experience = experience.with_element(TimelineElement {
                    id: element.id,
                    kind,
                    start_offset_s: element.start_offset_s,
                    duration_s: element.duration_s,
                    intensity: element.intensity.clamp(0.0, 1.0),
                    sync: element.sync,
                    priority: element.priority,
                    depends_on: element.depends_on,
                });
            }
            experience
                .validate()
                .map_err(|e| ChoreoError::config(format!("experience '{}': {}", spec.id, e)))?;
            if experiences.insert(spec.id.clone(), experience).is_some() {
                return Err(ChoreoError::config(format!(
                    "duplicate experience id '{}'",
                    spec.id
                )));
            }
        }

        Ok(Self {
            table,
            safety: raw.safety,
            sequences,
            personalities: raw.personalities,
            experiences,
        })
    }
}

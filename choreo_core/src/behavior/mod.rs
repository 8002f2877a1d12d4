//! Personality model and behavior selection

pub mod selector;

pub use selector::{BehaviorDecision, BehaviorSelector, SelectorConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::sequence::PersonalityParams;

/// The character's personality repertoire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityMode {
    /// Default investigative personality
    #[default]
    CuriousExplorer,
    LoyalCompanion,
    /// Safety-focused posture; selected under threat
    ProtectiveGuardian,
    PlayfulEntertainer,
    WiseMentor,
    MischievousTrickster,
    HeroicAdventurer,
    /// Nurturing mode used around small children
    GentleCaretaker,
    AnalyticalInvestigator,
    /// Meeting an enthusiastic returning fan
    ExcitedFanEncounter,
}

impl PersonalityMode {
    /// Fixed motion parameter bundle for this mode at nominal intensity
    pub fn params(self) -> PersonalityParams {
        match self {
            PersonalityMode::CuriousExplorer => PersonalityParams {
                temporal_scale: 1.0,
                physical_scale: 1.0,
                emotional_intensity: 1.0,
                bio_mechanical_realism: 1.0,
                exaggeration: 1.0,
            },
            PersonalityMode::LoyalCompanion => PersonalityParams {
                temporal_scale: 1.0,
                physical_scale: 0.9,
                emotional_intensity: 0.9,
                bio_mechanical_realism: 1.1,
                exaggeration: 0.9,
            },
            PersonalityMode::ProtectiveGuardian => PersonalityParams {
                temporal_scale: 1.2,
                physical_scale: 0.6,
                emotional_intensity: 0.5,
                bio_mechanical_realism: 1.0,
                exaggeration: 0.7,
            },
            PersonalityMode::PlayfulEntertainer => PersonalityParams {
                temporal_scale: 0.8,
                physical_scale: 1.2,
                emotional_intensity: 1.3,
                bio_mechanical_realism: 0.9,
                exaggeration: 1.2,
            },
            PersonalityMode::WiseMentor => PersonalityParams {
                temporal_scale: 1.3,
                physical_scale: 0.8,
                emotional_intensity: 0.7,
                bio_mechanical_realism: 1.2,
                exaggeration: 0.8,
            },
            PersonalityMode::MischievousTrickster => PersonalityParams {
                temporal_scale: 0.7,
                physical_scale: 1.1,
                emotional_intensity: 1.2,
                bio_mechanical_realism: 0.8,
                exaggeration: 1.3,
            },
            PersonalityMode::HeroicAdventurer => PersonalityParams {
                temporal_scale: 0.9,
                physical_scale: 1.3,
                emotional_intensity: 1.2,
                bio_mechanical_realism: 1.0,
                exaggeration: 1.2,
            },
            PersonalityMode::GentleCaretaker => PersonalityParams {
                temporal_scale: 1.4,
                physical_scale: 0.7,
                emotional_intensity: 0.6,
                bio_mechanical_realism: 1.2,
                exaggeration: 0.7,
            },
            PersonalityMode::AnalyticalInvestigator => PersonalityParams {
                temporal_scale: 1.1,
                physical_scale: 0.9,
                emotional_intensity: 0.8,
                bio_mechanical_realism: 1.1,
                exaggeration: 0.9,
            },
            PersonalityMode::ExcitedFanEncounter => PersonalityParams {
                temporal_scale: 0.75,
                physical_scale: 1.25,
                emotional_intensity: 1.4,
                bio_mechanical_realism: 0.9,
                exaggeration: 1.3,
            },
        }
    }

    /// Idle animation for this mode, by sequence library id
    pub fn idle_sequence(self) -> &'static str {
        match self {
            PersonalityMode::CuriousExplorer => "idle_curious_scan",
            PersonalityMode::LoyalCompanion => "idle_attentive_sway",
            PersonalityMode::ProtectiveGuardian => "idle_guard_sweep",
            PersonalityMode::PlayfulEntertainer => "idle_playful_wiggle",
            PersonalityMode::WiseMentor => "idle_slow_nod",
            PersonalityMode::MischievousTrickster => "idle_sneaky_peek",
            PersonalityMode::HeroicAdventurer => "idle_proud_posture",
            PersonalityMode::GentleCaretaker => "idle_soft_tilt",
            PersonalityMode::AnalyticalInvestigator => "idle_methodical_scan",
            PersonalityMode::ExcitedFanEncounter => "idle_eager_bounce",
        }
    }
}

/// Expression intensity ladder
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Subtle,
    #[default]
    Moderate,
    Pronounced,
    Dramatic,
}

impl Intensity {
    pub fn value(self) -> f64 {
        match self {
            Intensity::Subtle => 0.3,
            Intensity::Moderate => 0.6,
            Intensity::Pronounced => 0.8,
            Intensity::Dramatic => 1.0,
        }
    }

    pub fn step_up(self) -> Self {
        match self {
            Intensity::Subtle => Intensity::Moderate,
            Intensity::Moderate => Intensity::Pronounced,
            _ => Intensity::Dramatic,
        }
    }

    /// Cap used around small children
    pub fn capped_at_moderate(self) -> Self {
        self.min(Intensity::Moderate)
    }
}

/// The character's own emotional state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CharacterEmotion {
    #[default]
    Content,
    Curious,
    Excited,
    Concerned,
    Focused,
    Playful,
    Alert,
    Affectionate,
}

/// Mutable personality state, owned by the selector
///
/// Readers take snapshots through the selector's shared handle.
#[derive(Debug, Clone)]
pub struct PersonalityState {
    pub mode: PersonalityMode,
    pub intensity: Intensity,
    pub emotion: CharacterEmotion,
    /// Remaining show stamina, 0..1; decays ~5% per hour
    pub energy: f64,
    /// Tolerance for crowds, 0..1; decays with crowd size
    pub social_battery: f64,
    /// Rises with safety severity, 0..1
    pub stress: f64,
    pub last_change: Instant,
}

impl PersonalityState {
    pub fn new(now: Instant) -> Self {
        Self {
            mode: PersonalityMode::default(),
            intensity: Intensity::default(),
            emotion: CharacterEmotion::default(),
            energy: 1.0,
            social_battery: 1.0,
            stress: 0.0,
            last_change: now,
        }
    }

    /// Parameter bundle for the current mode scaled by intensity
    pub fn params(&self) -> PersonalityParams {
        let mut params = self.mode.params();
        let scale = self.intensity.value() / Intensity::Moderate.value();
        params.emotional_intensity *= scale;
        params.exaggeration *= scale.sqrt();
        params
    }
}

/// Per-guest relationship record, keyed by recognition id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestRelationship {
    pub recognition_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub interaction_count: u32,
    pub preferred_mode: PersonalityMode,
}

/// Persist relationship records as JSON (optional across-run memory)
pub fn save_relationships<P: AsRef<std::path::Path>>(
    path: P,
    records: &[GuestRelationship],
) -> crate::error::ChoreoResult<()> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load relationship records saved by a previous run
pub fn load_relationships<P: AsRef<std::path::Path>>(
    path: P,
) -> crate::error::ChoreoResult<Vec<GuestRelationship>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

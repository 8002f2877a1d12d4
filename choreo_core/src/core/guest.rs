//! Guest observation model
//!
//! The vision/proximity stack (out of scope here) publishes
//! `GuestObservation`s at ≥ 10 Hz. The behavior selector and the safety
//! supervisor are the two consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proximity zone around the character, nearest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityZone {
    /// Inside the emergency-stop radius
    Critical,
    /// Too close for any motion toward the guest
    Danger,
    /// Close contact, gentle interactions only
    Caution,
    /// Normal one-on-one interaction distance
    Interaction,
    /// Group interaction distance
    Social,
    /// Crowd awareness only
    Awareness,
}

impl ProximityZone {
    /// Zone band edges in meters, nearest first
    pub const BANDS: [(ProximityZone, f64); 6] = [
        (ProximityZone::Critical, 0.25),
        (ProximityZone::Danger, 0.5),
        (ProximityZone::Caution, 1.2),
        (ProximityZone::Interaction, 2.5),
        (ProximityZone::Social, 4.0),
        (ProximityZone::Awareness, 8.0),
    ];

    /// Classify a distance into a zone; beyond the outermost band is Awareness
    pub fn from_distance(distance_m: f64) -> Self {
        for (zone, edge) in Self::BANDS {
            if distance_m <= edge {
                return zone;
            }
        }
        ProximityZone::Awareness
    }

    /// Classify with a distance multiplier (< 1 tightens: the guest reads
    /// as closer than they are, so protective zones reach farther out).
    /// Used for children.
    pub fn from_distance_scaled(distance_m: f64, scale: f64) -> Self {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        Self::from_distance(distance_m * scale)
    }

    /// True for zones that demand a safety response regardless of behavior rules
    pub fn is_unsafe(self) -> bool {
        matches!(self, ProximityZone::Critical | ProximityZone::Danger)
    }
}

/// Estimated guest age bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Toddler,
    Child,
    Teenager,
    Adult,
    Senior,
}

impl AgeGroup {
    /// Toddlers and children get tightened zones and capped intensity
    pub fn is_minor(self) -> bool {
        matches!(self, AgeGroup::Toddler | AgeGroup::Child)
    }
}

/// Dominant facial expression reported by the vision stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Happy,
    Excited,
    Surprised,
    Curious,
    Confused,
    Concerned,
    Disappointed,
}

/// Recognized guest gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Wave,
    Point,
    ThumbsUp,
    PeaceSign,
    HighFive,
    Clap,
    Beckoning,
    Salute,
}

/// One observation of one guest at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestObservation {
    pub observation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Stable recognition id across observations, when the vision stack has one
    pub recognition_id: Option<String>,
    /// Position relative to the character, meters
    pub position_m: [f64; 3],
    pub distance_m: f64,
    pub zone: ProximityZone,
    pub age_group: AgeGroup,
    pub emotion: Emotion,
    pub gesture: Option<Gesture>,
    /// Detection confidence, 0..1
    pub confidence: f64,
    /// Closing speed toward the character, m/s (positive = approaching)
    pub velocity_mps: f64,
    /// Engagement score from the vision stack, 0..1
    pub engagement: f64,
}

impl GuestObservation {
    /// Observation with zone derived from distance and neutral defaults
    pub fn at_distance(distance_m: f64) -> Self {
        Self {
            observation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            recognition_id: None,
            position_m: [distance_m, 0.0, 0.0],
            distance_m,
            zone: ProximityZone::from_distance(distance_m),
            age_group: AgeGroup::Adult,
            emotion: Emotion::Neutral,
            gesture: None,
            confidence: 1.0,
            velocity_mps: 0.0,
            engagement: 0.0,
        }
    }

    /// Effective zone with child tightening applied
    pub fn effective_zone(&self, child_zone_scale: f64) -> ProximityZone {
        if self.age_group.is_minor() {
            ProximityZone::from_distance_scaled(self.distance_m, child_zone_scale)
        } else {
            self.zone
        }
    }
}

//! Experiences: timed compositions of motion, audio and lighting
//!
//! A `TimelineElement` is one scheduled item on the master clock; an
//! `Experience` is a set of elements with dependencies forming a DAG.
//! The [`coordinator::TimelineCoordinator`] launches them with bounded
//! start-time skew.

pub mod coordinator;

pub use coordinator::{ExperienceStatus, TimelineCoordinator};

use serde::{Deserialize, Serialize};

use crate::adapters::LightPattern;

/// Maximum acceptable start-time skew between dependent elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncTolerance {
    /// ≤ 1 ms: beat-accurate accents
    Perfect,
    /// ≤ 5 ms: musical cues
    Tight,
    /// ≤ 20 ms: general show elements
    #[default]
    Loose,
    /// ≤ 100 ms: narrative beats
    Narrative,
    /// ≤ 200 ms: ambient behavior
    Natural,
}

impl SyncTolerance {
    pub fn tolerance_ms(self) -> f64 {
        match self {
            SyncTolerance::Perfect => 1.0,
            SyncTolerance::Tight => 5.0,
            SyncTolerance::Loose => 20.0,
            SyncTolerance::Narrative => 100.0,
            SyncTolerance::Natural => 200.0,
        }
    }

    /// Strict tiers get single-shot resynchronization on violation
    pub fn is_strict(self) -> bool {
        matches!(self, SyncTolerance::Perfect | SyncTolerance::Tight)
    }
}

/// Which backend an element drives
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Motion { sequence_id: String },
    Audio { clip_id: String },
    Light { zone: String, pattern: LightPattern },
}

impl ElementKind {
    /// Backend slot used for Perfect-sync claim accounting
    pub fn backend(&self) -> Backend {
        match self {
            ElementKind::Motion { .. } => Backend::Motion,
            ElementKind::Audio { .. } => Backend::Audio,
            ElementKind::Light { .. } => Backend::Light,
        }
    }
}

/// Backend slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Motion,
    Audio,
    Light,
}

/// One scheduled item on the master clock
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineElement {
    pub id: String,
    pub kind: ElementKind,
    /// Seconds after experience start
    pub start_offset_s: f64,
    pub duration_s: f64,
    /// Backend intensity/volume, 0..1
    pub intensity: f64,
    pub sync: SyncTolerance,
    /// Higher wins conflicts
    pub priority: u8,
    /// Element ids that must have started before this one
    pub depends_on: Vec<String>,
}

impl TimelineElement {
    pub fn motion(id: &str, sequence_id: &str, start_offset_s: f64, duration_s: f64) -> Self {
        Self {
            id: id.to_string(),
            kind: ElementKind::Motion {
                sequence_id: sequence_id.to_string(),
            },
            start_offset_s,
            duration_s,
            intensity: 1.0,
            sync: SyncTolerance::default(),
            priority: 5,
            depends_on: Vec::new(),
        }
    }

    pub fn audio(id: &str, clip_id: &str, start_offset_s: f64, duration_s: f64) -> Self {
        Self {
            id: id.to_string(),
            kind: ElementKind::Audio {
                clip_id: clip_id.to_string(),
            },
            start_offset_s,
            duration_s,
            intensity: 1.0,
            sync: SyncTolerance::default(),
            priority: 5,
            depends_on: Vec::new(),
        }
    }

    pub fn light(
        id: &str,
        zone: &str,
        pattern: LightPattern,
        start_offset_s: f64,
        duration_s: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind: ElementKind::Light {
                zone: zone.to_string(),
                pattern,
            },
            start_offset_s,
            duration_s,
            intensity: 1.0,
            sync: SyncTolerance::default(),
            priority: 5,
            depends_on: Vec::new(),
        }
    }

    pub fn with_sync(mut self, sync: SyncTolerance) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends(mut self, element_id: &str) -> Self {
        self.depends_on.push(element_id.to_string());
        self
    }
}

/// How deep the experience pulls the guest in; informs selection only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImmersionLevel {
    Ambient,
    #[default]
    Engaging,
    Immersive,
    Magical,
}

/// Conditions checked at trigger time
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// No motion channels may be active
    MotionIdle,
    /// Personality energy must be at least this
    MinEnergy(f64),
}

/// An instantiated timed composition of motion + audio + lighting
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub id: String,
    pub elements: Vec<TimelineElement>,
    pub total_duration_s: f64,
    pub immersion: ImmersionLevel,
    pub preconditions: Vec<Precondition>,
}

impl Experience {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            elements: Vec::new(),
            total_duration_s: 0.0,
            immersion: ImmersionLevel::default(),
            preconditions: Vec::new(),
        }
    }

    /// Add an element and grow the total duration to cover it
    pub fn with_element(mut self, element: TimelineElement) -> Self {
        let end = element.start_offset_s + element.duration_s;
        if end > self.total_duration_s {
            self.total_duration_s = end;
        }
        self.elements.push(element);
        self
    }

    pub fn with_immersion(mut self, immersion: ImmersionLevel) -> Self {
        self.immersion = immersion;
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Highest element priority; used for cross-experience conflicts
    pub fn priority(&self) -> u8 {
        self.elements.iter().map(|e| e.priority).max().unwrap_or(0)
    }

    /// Validate the dependency DAG: ids unique, deps known, no cycles
    pub fn validate(&self) -> Result<(), String> {
        let mut ids = std::collections::HashSet::new();
        for element in &self.elements {
            if !ids.insert(element.id.as_str()) {
                return Err(format!("duplicate element id '{}'", element.id));
            }
        }
        for element in &self.elements {
            for dep in &element.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(format!(
                        "element '{}' depends on unknown '{}'",
                        element.id, dep
                    ));
                }
            }
        }
        // Cycle check: repeatedly peel elements whose deps are all peeled
        let mut peeled: std::collections::HashSet<&str> = std::collections::HashSet::new();
        loop {
            let before = peeled.len();
            for element in &self.elements {
                if peeled.contains(element.id.as_str()) {
                    continue;
                }
                if element
                    .depends_on
                    .iter()
                    .all(|d| peeled.contains(d.as_str()))
                {
                    peeled.insert(element.id.as_str());
                }
            }
            if peeled.len() == self.elements.len() {
                return Ok(());
            }
            if peeled.len() == before {
                return Err("dependency cycle".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_tiers() {
        assert_eq!(SyncTolerance::Perfect.tolerance_ms(), 1.0);
        assert_eq!(SyncTolerance::Tight.tolerance_ms(), 5.0);
        assert_eq!(SyncTolerance::Loose.tolerance_ms(), 20.0);
        assert_eq!(SyncTolerance::Narrative.tolerance_ms(), 100.0);
        assert_eq!(SyncTolerance::Natural.tolerance_ms(), 200.0);
        assert!(SyncTolerance::Perfect.is_strict());
        assert!(SyncTolerance::Tight.is_strict());
        assert!(!SyncTolerance::Loose.is_strict());
    }

    #[test]
    fn test_experience_duration_grows_with_elements() {
        let experience = Experience::new("greeting")
            .with_element(TimelineElement::motion("m", "wave", 0.0, 2.6))
            .with_element(TimelineElement::audio("a", "hello", 1.0, 3.0));
        assert_eq!(experience.total_duration_s, 4.0);
        assert_eq!(experience.elements.len(), 2);
    }

    #[test]
    fn test_dag_validation_catches_unknown_dep() {
        let experience = Experience::new("bad")
            .with_element(TimelineElement::motion("m", "wave", 0.0, 1.0).depends("ghost"));
        assert!(experience.validate().is_err());
    }

    #[test]
    fn test_dag_validation_catches_cycle() {
        let experience = Experience::new("cyclic")
            .with_element(TimelineElement::motion("a", "x", 0.0, 1.0).depends("b"))
            .with_element(TimelineElement::audio("b", "y", 0.0, 1.0).depends("a"));
        assert!(experience.validate().is_err());
    }

    #[test]
    fn test_dag_validation_accepts_chain() {
        let experience = Experience::new("ok")
            .with_element(TimelineElement::motion("a", "x", 0.0, 1.0))
            .with_element(TimelineElement::audio("b", "y", 0.5, 1.0).depends("a"))
            .with_element(
                TimelineElement::light("c", "dome", LightPattern::Pulse, 0.5, 1.0)
                    .depends("a")
                    .depends("b"),
            );
        assert!(experience.validate().is_ok());
    }

    #[test]
    fn test_duplicate_element_ids_rejected() {
        let experience = Experience::new("dup")
            .with_element(TimelineElement::motion("same", "x", 0.0, 1.0))
            .with_element(TimelineElement::audio("same", "y", 0.0, 1.0));
        assert!(experience.validate().is_err());
    }
}

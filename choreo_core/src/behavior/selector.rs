//! Behavior selector
//!
//! Converts guest observations, external triggers, idle timers and safety
//! state into experience triggers and personality changes. Selection rules
//! run in strict priority order; mode transitions are debounced and
//! per-guest-per-zone cooldowns suppress repeat triggers.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::behavior::{
    CharacterEmotion, GuestRelationship, Intensity, PersonalityMode, PersonalityState,
};
use crate::bus::{ExternalTrigger, SafetyChannel};
use crate::core::{Clock, Emotion, GuestObservation, ProximityZone};
use crate::safety::Severity;
use crate::sequence::PersonalityParams;

/// Tunables for the selector
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Seconds without observations before an idle animation plays
    pub idle_timeout_s: f64,
    /// Probability of substituting a higher-appeal variant per eligible encounter
    pub magic_moment_probability: f64,
    /// Minimum seconds between mode transitions
    pub mode_debounce_s: f64,
    /// Minimum seconds between intensity changes
    pub intensity_debounce_s: f64,
    /// Per-zone trigger cooldowns, seconds
    pub zone_cooldowns_s: HashMap<ProximityZone, f64>,
    /// Zone-radius multiplier applied to children (< 1 tightens)
    pub child_zone_scale: f64,
    /// Group size in the Social zone that flips to entertainer mode
    pub entertainer_group_size: usize,
    /// Engagement floor for magic-moment eligibility
    pub magic_engagement_floor: f64,
    /// Interaction-count ceiling for magic-moment eligibility
    pub magic_interaction_ceiling: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let mut zone_cooldowns_s = HashMap::new();
        zone_cooldowns_s.insert(ProximityZone::Caution, 20.0);
        zone_cooldowns_s.insert(ProximityZone::Interaction, 30.0);
        zone_cooldowns_s.insert(ProximityZone::Social, 45.0);
        zone_cooldowns_s.insert(ProximityZone::Awareness, 60.0);
        Self {
            idle_timeout_s: 15.0,
            magic_moment_probability: 0.15,
            mode_debounce_s: 2.0,
            intensity_debounce_s: 0.5,
            zone_cooldowns_s,
            child_zone_scale: 0.8,
            entertainer_group_size: 4,
            magic_engagement_floor: 0.5,
            magic_interaction_ceiling: 3,
        }
    }
}

/// A decision the runtime acts on
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorDecision {
    /// Launch an experience with this parameter bundle
    TriggerExperience {
        experience: String,
        params: PersonalityParams,
        /// Substituted by the magic-moment rule
        magic_moment: bool,
    },
    /// Personality changed; interested parties may re-bias
    SetPersonality {
        mode: PersonalityMode,
        intensity: Intensity,
    },
}

/// Per-guest encounter bookkeeping
struct Encounter {
    last_seen: Instant,
    /// Magic-moment dice already rolled for this encounter
    magic_rolled: bool,
}

/// Maps events to experience triggers and maintains `PersonalityState`
pub struct BehaviorSelector {
    clock: Arc<dyn Clock>,
    config: SelectorConfig,
    state: PersonalityState,
    shared: Arc<Mutex<PersonalityState>>,
    safety: SafetyChannel,
    relationships: HashMap<String, GuestRelationship>,
    encounters: HashMap<String, Encounter>,
    /// (recognition id or anonymous key, zone) → last trigger
    cooldowns: HashMap<(String, ProximityZone), Instant>,
    last_observation: Option<Instant>,
    last_idle_trigger: Option<Instant>,
    last_mode_change: Instant,
    last_intensity_change: Instant,
    last_update: Instant,
    current_severity: Severity,
    rng: StdRng,
}

impl BehaviorSelector {
    pub fn new(clock: Arc<dyn Clock>, config: SelectorConfig, safety: SafetyChannel) -> Self {
        let now = clock.now();
        let state = PersonalityState::new(now);
        Self {
            shared: Arc::new(Mutex::new(state.clone())),
            clock,
            config,
            state,
            safety,
            relationships: HashMap::new(),
            encounters: HashMap::new(),
            cooldowns: HashMap::new(),
            last_observation: None,
            last_idle_trigger: None,
            last_mode_change: now - Duration::from_secs(60),
            last_intensity_change: now - Duration::from_secs(60),
            last_update: now,
            current_severity: Severity::None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic RNG for tests
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Shared read handle for other tasks
    pub fn state_handle(&self) -> Arc<Mutex<PersonalityState>> {
        self.shared.clone()
    }

    pub fn state(&self) -> &PersonalityState {
        &self.state
    }

    pub fn relationships(&self) -> impl Iterator<Item = &GuestRelationship> {
        self.relationships.values()
    }

    /// Load persisted relationship records at startup
    pub fn seed_relationships(&mut self, records: Vec<GuestRelationship>) {
        for record in records {
            self.relationships
                .insert(record.recognition_id.clone(), record);
        }
    }

    /// Explicit personality override from the control surface
    pub fn set_personality(&mut self, mode: PersonalityMode, intensity: Option<Intensity>) {
        let now = self.clock.now();
        self.state.mode = mode;
        if let Some(intensity) = intensity {
            self.state.intensity = intensity;
        }
        self.state.last_change = now;
        self.last_mode_change = now;
        self.publish();
    }

    /// One selector pass over this iteration's inputs
    pub fn process(
        &mut self,
        observations: &[GuestObservation],
        triggers: &[ExternalTrigger],
    ) -> Vec<BehaviorDecision> {
        let now = self.clock.now();
        let mut decisions = Vec::new();

        // Safety channel first; severity biases stress and forces posture
        if let Some(directive) = self.safety.poll() {
            self.current_severity = directive.severity;
        }

        self.decay(now);

        if !observations.is_empty() {
            self.last_observation = Some(now);
            self.track_encounters(observations, now);
        }

        // External triggers pass straight through with the current bundle
        for trigger in triggers {
            let mut params = self.state.params();
            if let Some(intensity) = trigger.intensity {
                params.emotional_intensity *= intensity.clamp(0.0, 1.0) / 0.6;
            }
            decisions.push(BehaviorDecision::TriggerExperience {
                experience: trigger.experience.clone(),
                params,
                magic_moment: false,
            });
        }

        // Rule pipeline, highest priority first
        if let Some(decision) = self.rule_safety_posture(now) {
            decisions.push(decision);
        } else if let Some(decision) = self.rule_threat(observations, now) {
            decisions.push(decision);
        } else if let Some(decision) = self.rule_children(observations, now) {
            decisions.push(decision);
        } else if let Some(decision) = self.rule_crowd(observations, now) {
            decisions.push(decision);
        } else if let Some(decision) = self.rule_returning_guest(observations, now, &mut decisions)
        {
            decisions.push(decision);
        } else if let Some(decision) = self.rule_emotion(observations, now) {
            decisions.push(decision);
        }

        if let Some(decision) = self.rule_idle(now) {
            decisions.push(decision);
        }

        self.publish();
        decisions
    }

    fn publish(&self) {
        *self.shared.lock() = self.state.clone();
    }

    /// Energy/battery/stress dynamics
    fn decay(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        // ~5% per hour
        self.state.energy = (self.state.energy - 0.05 * dt / 3600.0).max(0.0);
        if self.current_severity >= Severity::Moderate {
            self.state.stress = (self.state.stress + 0.05 * dt).min(1.0);
        } else {
            self.state.stress = (self.state.stress - 0.02 * dt).max(0.0);
        }
    }

    fn track_encounters(&mut self, observations: &[GuestObservation], now: Instant) {
        // Social battery drains with crowd size
        let crowd = observations.len() as f64;
        self.state.social_battery = (self.state.social_battery - 0.001 * crowd).max(0.0);

        for observation in observations {
            let Some(recognition_id) = &observation.recognition_id else {
                continue;
            };
            let entry = self
                .encounters
                .entry(recognition_id.clone())
                .or_insert(Encounter {
                    last_seen: now,
                    magic_rolled: false,
                });
            // A long absence starts a fresh encounter
            if now.saturating_duration_since(entry.last_seen) > Duration::from_secs(60) {
                entry.magic_rolled = false;
            }
            entry.last_seen = now;

            let timestamp = Utc::now();
            self.relationships
                .entry(recognition_id.clone())
                .and_modify(|r| r.last_seen = timestamp)
                .or_insert_with(|| GuestRelationship {
                    recognition_id: recognition_id.clone(),
                    first_seen: timestamp,
                    last_seen: timestamp,
                    interaction_count: 0,
                    preferred_mode: self.state.mode,
                });
        }
    }

    /// Elevated safety severity biases posture toward the guardian until
    /// the supervisor announces all-clear
    fn rule_safety_posture(&mut self, now: Instant) -> Option<BehaviorDecision> {
        if self.current_severity < Severity::Moderate {
            return None;
        }
        let bypass = self.current_severity >= Severity::High;
        self.transition(PersonalityMode::ProtectiveGuardian, None, now, bypass)
    }

    /// Rule 1: anyone in Critical/Danger forces protective mode
    fn rule_threat(
        &mut self,
        observations: &[GuestObservation],
        now: Instant,
    ) -> Option<BehaviorDecision> {
        let threatened = observations
            .iter()
            .any(|o| o.effective_zone(self.config.child_zone_scale).is_unsafe());
        if !threatened {
            return None;
        }
        // Threat bypasses the debounce
        self.transition(PersonalityMode::ProtectiveGuardian, None, now, true)
    }

    /// Rule 2: children present prefer the caretaker at capped intensity
    fn rule_children(
        &mut self,
        observations: &[GuestObservation],
        now: Instant,
    ) -> Option<BehaviorDecision> {
        let minor_present = observations
            .iter()
            .any(|o| o.age_group.is_minor() && o.zone <= ProximityZone::Social);
        if !minor_present {
            return None;
        }
        let capped = self.state.intensity.capped_at_moderate();
        self.transition(PersonalityMode::GentleCaretaker, Some(capped), now, false)
    }

    /// Rule 3: big groups in the Social zone get the entertainer
    fn rule_crowd(
        &mut self,
        observations: &[GuestObservation],
        now: Instant,
    ) -> Option<BehaviorDecision> {
        let group = observations
            .iter()
            .filter(|o| o.zone <= ProximityZone::Social)
            .count();
        if group <= self.config.entertainer_group_size {
            return None;
        }
        self.transition(PersonalityMode::PlayfulEntertainer, None, now, false)
    }

    /// Rule 4: recognized returning guest — warm greeting, one step up
    fn rule_returning_guest(
        &mut self,
        observations: &[GuestObservation],
        now: Instant,
        decisions: &mut Vec<BehaviorDecision>,
    ) -> Option<BehaviorDecision> {
        let returning = observations.iter().find(|o| {
            o.recognition_id
                .as_deref()
                .and_then(|id| self.relationships.get(id))
                .map(|r| r.interaction_count > 0)
                .unwrap_or(false)
        })?;
        let recognition_id = returning.recognition_id.clone()?;
        let zone = returning.zone;

        if self.cooldown_active(&recognition_id, zone, now) {
            return None;
        }
        self.arm_cooldown(&recognition_id, zone, now);

        let magic = self.roll_magic_moment(&recognition_id, returning.engagement);
        if let Some(relationship) = self.relationships.get_mut(&recognition_id) {
            relationship.interaction_count += 1;
        }
        decisions.push(BehaviorDecision::TriggerExperience {
            experience: if magic {
                "greeting_magic_moment".to_string()
            } else {
                "greeting_warm_recognition".to_string()
            },
            params: self.state.params(),
            magic_moment: magic,
        });

        let raised = self.state.intensity.step_up();
        self.transition(self.state.mode, Some(raised), now, false)
    }

    /// Rule 5: map the dominant emotion to a mode
    fn rule_emotion(
        &mut self,
        observations: &[GuestObservation],
        now: Instant,
    ) -> Option<BehaviorDecision> {
        // Dominant = most common emotion among close-enough guests
        let mut counts: HashMap<Emotion, usize> = HashMap::new();
        for observation in observations
            .iter()
            .filter(|o| o.zone <= ProximityZone::Social)
        {
            *counts.entry(observation.emotion).or_insert(0) += 1;
        }
        let (&dominant, _) = counts.iter().max_by_key(|(_, &count)| count)?;

        let mode = match dominant {
            Emotion::Happy => PersonalityMode::PlayfulEntertainer,
            Emotion::Excited => PersonalityMode::ExcitedFanEncounter,
            Emotion::Curious => PersonalityMode::CuriousExplorer,
            Emotion::Surprised => PersonalityMode::MischievousTrickster,
            Emotion::Confused => PersonalityMode::WiseMentor,
            Emotion::Concerned => PersonalityMode::GentleCaretaker,
            Emotion::Disappointed => PersonalityMode::LoyalCompanion,
            Emotion::Neutral => PersonalityMode::AnalyticalInvestigator,
        };
        self.transition(mode, None, now, false)
    }

    /// Rule 6: idle animation after a quiet spell
    fn rule_idle(&mut self, now: Instant) -> Option<BehaviorDecision> {
        let idle_for = match self.last_observation {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => self.config.idle_timeout_s + 1.0,
        };
        if idle_for < self.config.idle_timeout_s {
            return None;
        }
        // One idle trigger per timeout window
        if let Some(last) = self.last_idle_trigger {
            if now.saturating_duration_since(last).as_secs_f64() < self.config.idle_timeout_s {
                return None;
            }
        }
        self.last_idle_trigger = Some(now);
        Some(BehaviorDecision::TriggerExperience {
            experience: self.state.mode.idle_sequence().to_string(),
            params: self.state.params(),
            magic_moment: false,
        })
    }

    /// Debounced mode/intensity transition; emits a decision when changed
    fn transition(
        &mut self,
        mode: PersonalityMode,
        intensity: Option<Intensity>,
        now: Instant,
        bypass_debounce: bool,
    ) -> Option<BehaviorDecision> {
        let mut changed = false;

        if mode != self.state.mode {
            let since = now
                .saturating_duration_since(self.last_mode_change)
                .as_secs_f64();
            if bypass_debounce || since >= self.config.mode_debounce_s {
                self.state.mode = mode;
                self.state.emotion = match mode {
                    PersonalityMode::ProtectiveGuardian => CharacterEmotion::Alert,
                    PersonalityMode::PlayfulEntertainer
                    | PersonalityMode::MischievousTrickster => CharacterEmotion::Playful,
                    PersonalityMode::ExcitedFanEncounter => CharacterEmotion::Excited,
                    PersonalityMode::GentleCaretaker => CharacterEmotion::Affectionate,
                    PersonalityMode::AnalyticalInvestigator | PersonalityMode::WiseMentor => {
                        CharacterEmotion::Focused
                    }
                    _ => CharacterEmotion::Curious,
                };
                self.last_mode_change = now;
                self.state.last_change = now;
                changed = true;
            }
        }

        if let Some(intensity) = intensity {
            if intensity != self.state.intensity {
                let since = now
                    .saturating_duration_since(self.last_intensity_change)
                    .as_secs_f64();
                if bypass_debounce || since >= self.config.intensity_debounce_s {
                    self.state.intensity = intensity;
                    self.last_intensity_change = now;
                    self.state.last_change = now;
                    changed = true;
                }
            }
        }

        changed.then(|| BehaviorDecision::SetPersonality {
            mode: self.state.mode,
            intensity: self.state.intensity,
        })
    }

    fn cooldown_active(&self, recognition_id: &str, zone: ProximityZone, now: Instant) -> bool {
        let Some(cooldown_s) = self.config.zone_cooldowns_s.get(&zone) else {
            return false;
        };
        self.cooldowns
            .get(&(recognition_id.to_string(), zone))
            .map(|last| now.saturating_duration_since(*last).as_secs_f64() < *cooldown_s)
            .unwrap_or(false)
    }

    fn arm_cooldown(&mut self, recognition_id: &str, zone: ProximityZone, now: Instant) {
        self.cooldowns.insert((recognition_id.to_string(), zone), now);
    }

    /// One dice roll per eligible encounter, never per tick
    fn roll_magic_moment(&mut self, recognition_id: &str, engagement: f64) -> bool {
        let interaction_count = self
            .relationships
            .get(recognition_id)
            .map(|r| r.interaction_count)
            .unwrap_or(0);
        if engagement < self.config.magic_engagement_floor
            || interaction_count >= self.config.magic_interaction_ceiling
        {
            return false;
        }
        let Some(encounter) = self.encounters.get_mut(recognition_id) else {
            return false;
        };
        if encounter.magic_rolled {
            return false;
        }
        encounter.magic_rolled = true;
        self.rng.gen::<f64>() < self.config.magic_moment_probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgeGroup, VirtualClock};

    fn rig() -> (BehaviorSelector, VirtualClock, SafetyChannel) {
        let clock = VirtualClock::new();
        let safety = SafetyChannel::new();
        let selector = BehaviorSelector::new(
            Arc::new(clock.clone()),
            SelectorConfig::default(),
            safety.clone(),
        )
        .with_rng_seed(7);
        (selector, clock, safety)
    }

    fn observed(distance: f64) -> GuestObservation {
        GuestObservation::at_distance(distance)
    }

    fn recognized(distance: f64, id: &str) -> GuestObservation {
        let mut obs = observed(distance);
        obs.recognition_id = Some(id.to_string());
        obs.engagement = 0.8;
        obs
    }

    #[test]
    fn test_danger_zone_forces_protective() {
        let (mut selector, _clock, _safety) = rig();
        let decisions = selector.process(&[observed(0.4)], &[]);
        assert!(decisions.contains(&BehaviorDecision::SetPersonality {
            mode: PersonalityMode::ProtectiveGuardian,
            intensity: Intensity::Moderate,
        }));
        assert_eq!(selector.state().mode, PersonalityMode::ProtectiveGuardian);
    }

    #[test]
    fn test_child_near_danger_edge_forces_protective() {
        // 0.7 m reads as 0.56 m effective for a child: still Caution, the
        // caretaker rule wins. 0.6 m reads as 0.48 m: Danger, protective
        // mode wins even though an adult at 0.6 m would be fine.
        let (mut selector, _clock, _safety) = rig();
        let mut child = observed(0.7);
        child.age_group = AgeGroup::Child;
        selector.process(&[child], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::GentleCaretaker);

        let (mut selector, _clock, _safety) = rig();
        let mut child = observed(0.6);
        child.age_group = AgeGroup::Toddler;
        selector.process(&[child], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::ProtectiveGuardian);
    }

    #[test]
    fn test_child_prefers_caretaker_with_capped_intensity() {
        let (mut selector, _clock, _safety) = rig();
        selector.state.intensity = Intensity::Dramatic;
        let mut child = observed(2.0);
        child.age_group = AgeGroup::Child;
        selector.process(&[child], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::GentleCaretaker);
        assert_eq!(selector.state().intensity, Intensity::Moderate);
    }

    #[test]
    fn test_large_group_selects_entertainer() {
        let (mut selector, _clock, _safety) = rig();
        let group: Vec<GuestObservation> = (0..5).map(|_| observed(3.0)).collect();
        selector.process(&group, &[]);
        assert_eq!(selector.state().mode, PersonalityMode::PlayfulEntertainer);

        let (mut selector, _clock, _safety) = rig();
        let group: Vec<GuestObservation> = (0..4).map(|_| observed(3.0)).collect();
        selector.process(&group, &[]);
        assert_ne!(selector.state().mode, PersonalityMode::PlayfulEntertainer);
    }

    #[test]
    fn test_returning_guest_gets_warm_greeting_and_step_up() {
        let (mut selector, clock, _safety) = rig();
        selector.seed_relationships(vec![GuestRelationship {
            recognition_id: "fan-42".into(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            interaction_count: 2,
            preferred_mode: PersonalityMode::CuriousExplorer,
        }]);

        clock.advance(Duration::from_secs(5));
        let decisions = selector.process(&[recognized(2.0, "fan-42")], &[]);
        let trigger = decisions.iter().find_map(|d| match d {
            BehaviorDecision::TriggerExperience { experience, .. } => Some(experience.clone()),
            _ => None,
        });
        assert!(trigger.is_some());
        assert!(trigger.unwrap().starts_with("greeting_"));
        assert_eq!(selector.state().intensity, Intensity::Pronounced);
    }

    #[test]
    fn test_zone_cooldown_suppresses_repeat_triggers() {
        let (mut selector, clock, _safety) = rig();
        selector.seed_relationships(vec![GuestRelationship {
            recognition_id: "fan-42".into(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            interaction_count: 1,
            preferred_mode: PersonalityMode::CuriousExplorer,
        }]);

        let first = selector.process(&[recognized(2.0, "fan-42")], &[]);
        assert!(first
            .iter()
            .any(|d| matches!(d, BehaviorDecision::TriggerExperience { .. })));

        // Ten seconds later, same zone: inside the 30 s Interaction cooldown
        clock.advance(Duration::from_secs(10));
        let second = selector.process(&[recognized(2.0, "fan-42")], &[]);
        assert!(!second
            .iter()
            .any(|d| matches!(d, BehaviorDecision::TriggerExperience { .. })));

        // Past the cooldown the trigger fires again
        clock.advance(Duration::from_secs(31));
        let third = selector.process(&[recognized(2.0, "fan-42")], &[]);
        assert!(third
            .iter()
            .any(|d| matches!(d, BehaviorDecision::TriggerExperience { .. })));
    }

    #[test]
    fn test_emotion_table_maps_to_mode() {
        let (mut selector, clock, _safety) = rig();
        let mut obs = observed(2.0);
        obs.emotion = Emotion::Confused;
        clock.advance(Duration::from_secs(3));
        selector.process(&[obs], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::WiseMentor);
    }

    #[test]
    fn test_mode_debounce_blocks_rapid_flips() {
        let (mut selector, clock, _safety) = rig();
        let mut happy = observed(2.0);
        happy.emotion = Emotion::Happy;
        clock.advance(Duration::from_secs(3));
        selector.process(&[happy.clone()], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::PlayfulEntertainer);

        // Half a second later the dominant emotion flips; debounce holds
        let mut confused = observed(2.0);
        confused.emotion = Emotion::Confused;
        clock.advance(Duration::from_millis(500));
        selector.process(&[confused.clone()], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::PlayfulEntertainer);

        clock.advance(Duration::from_secs(3));
        selector.process(&[confused], &[]);
        assert_eq!(selector.state().mode, PersonalityMode::WiseMentor);
    }

    #[test]
    fn test_idle_animation_after_timeout() {
        let (mut selector, clock, _safety) = rig();
        selector.process(&[observed(2.0)], &[]);
        clock.advance(Duration::from_secs(16));
        let decisions = selector.process(&[], &[]);
        let idle = decisions.iter().find_map(|d| match d {
            BehaviorDecision::TriggerExperience { experience, .. } => Some(experience.clone()),
            _ => None,
        });
        assert!(idle.is_some());
        assert!(idle.unwrap().starts_with("idle_"));

        // No double idle inside the next window
        clock.advance(Duration::from_secs(5));
        let again = selector.process(&[], &[]);
        assert!(again.is_empty());
    }

    #[test]
    fn test_external_trigger_passes_through() {
        let (mut selector, _clock, _safety) = rig();
        let decisions = selector.process(
            &[],
            &[ExternalTrigger {
                experience: "celebration".into(),
                intensity: None,
            }],
        );
        assert!(decisions.iter().any(|d| matches!(
            d,
            BehaviorDecision::TriggerExperience { experience, .. } if experience == "celebration"
        )));
    }

    #[test]
    fn test_magic_moment_rolls_once_per_encounter() {
        let (mut selector, clock, _safety) = rig();
        selector.seed_relationships(vec![GuestRelationship {
            recognition_id: "kid-7".into(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            interaction_count: 1,
            preferred_mode: PersonalityMode::CuriousExplorer,
        }]);

        // First contact rolls the dice (outcome depends on the seed);
        // the flag is set either way.
        selector.process(&[recognized(2.0, "kid-7")], &[]);
        assert!(selector.encounters.get("kid-7").unwrap().magic_rolled);

        // Later contact in the same encounter must not roll again
        clock.advance(Duration::from_secs(31));
        selector.process(&[recognized(2.0, "kid-7")], &[]);
        let rolled = selector.encounters.get("kid-7").unwrap().magic_rolled;
        assert!(rolled, "flag persists for the whole encounter");
    }

    #[test]
    fn test_energy_decays_over_hours() {
        let (mut selector, clock, _safety) = rig();
        clock.advance(Duration::from_secs(3600));
        selector.process(&[], &[]);
        let energy = selector.state().energy;
        assert!(energy < 1.0 && energy > 0.94, "energy {}", energy);
    }

    #[test]
    fn test_stress_rises_under_safety_pressure() {
        let (mut selector, clock, safety) = rig();
        safety.publish(crate::safety::SafetyDirective::new(
            Severity::High,
            crate::safety::SafetyReason::CrowdPressure { count: 10 },
            vec![],
        ));
        selector.process(&[], &[]);
        clock.advance(Duration::from_secs(10));
        selector.process(&[], &[]);
        assert!(selector.state().stress > 0.0);
    }
}

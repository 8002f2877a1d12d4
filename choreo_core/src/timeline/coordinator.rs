//! Timeline coordinator
//!
//! Runs experiences against the master monotonic clock. Single-threaded
//! cooperative: each tick it launches elements that are due, tracks
//! start-time skew against each element's sync tolerance, phase-shifts
//! dependents of late strict elements (single shot), and enforces the
//! per-experience wall-clock deadline.
//!
//! Motion is dispatched by enqueueing precompiled sequences into the
//! shared scheduler with an absolute start instant; audio and lighting
//! are commanded directly.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::{AudioPlayer, LightBus, LightPattern, PlayHandle};
use crate::bus::SafetyChannel;
use crate::core::Clock;
use crate::error::{ChoreoError, ChoreoResult};
use crate::motion::MotionScheduler;
use crate::sequence::CompiledSequence;
use crate::telemetry::{telemetry, TelemetryEvent};
use crate::timeline::{Backend, ElementKind, Experience, Precondition};

/// Grace added to an experience's deadline beyond its total duration
const DEADLINE_GRACE: Duration = Duration::from_secs(2);
/// Audio fade applied on preemption, milliseconds
const PREEMPT_FADE_MS: u64 = 50;
/// Gentle warning cue played on Moderate/High directives
const WARNING_CUE_CLIP: &str = "safety_warning_cue";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementRun {
    Pending,
    Started {
        at: Instant,
        audio: Option<PlayHandle>,
        /// Mid-element playback drift has been checked once
        drift_checked: bool,
    },
    Completed,
    Skipped,
}

struct ActiveExperience {
    experience: Experience,
    start: Instant,
    deadline: Instant,
    runs: Vec<ElementRun>,
    /// Phase compensation inherited from late strict prerequisites, seconds
    shifts: Vec<f64>,
    compiled_motions: HashMap<String, CompiledSequence>,
}

impl ActiveExperience {
    fn element_index(&self, id: &str) -> Option<usize> {
        self.experience.elements.iter().position(|e| e.id == id)
    }

    fn is_complete(&self) -> bool {
        self.runs
            .iter()
            .all(|r| matches!(r, ElementRun::Completed | ElementRun::Skipped))
    }
}

/// Status row for the control surface
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExperienceStatus {
    pub id: String,
    pub elapsed_s: f64,
    pub elements_total: usize,
    pub elements_started: usize,
    pub elements_completed: usize,
}

/// Launches motion+audio+light elements along the shared timeline
pub struct TimelineCoordinator {
    clock: Arc<dyn Clock>,
    scheduler: Arc<Mutex<MotionScheduler>>,
    audio: Box<dyn AudioPlayer>,
    lights: Box<dyn LightBus>,
    safety: SafetyChannel,
    active: Vec<ActiveExperience>,
    /// Backend → experience id currently holding the Perfect-sync claim
    perfect_claims: HashMap<Backend, String>,
    /// Refuse new experiences while a lockdown is in force
    lockdown: bool,
}

impl TimelineCoordinator {
    pub fn new(
        clock: Arc<dyn Clock>,
        scheduler: Arc<Mutex<MotionScheduler>>,
        audio: Box<dyn AudioPlayer>,
        lights: Box<dyn LightBus>,
        safety: SafetyChannel,
    ) -> Self {
        Self {
            clock,
            scheduler,
            audio,
            lights,
            safety,
            active: Vec::new(),
            perfect_claims: HashMap::new(),
            lockdown: false,
        }
    }

    pub fn is_lockdown(&self) -> bool {
        self.lockdown
    }

    /// Clear lockdown after an Emergency has been formally cleared
    pub fn clear_lockdown(&mut self) {
        self.lockdown = false;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn statuses(&self) -> Vec<ExperienceStatus> {
        let now = self.clock.now();
        self.active
            .iter()
            .map(|active| ExperienceStatus {
                id: active.experience.id.clone(),
                elapsed_s: now.saturating_duration_since(active.start).as_secs_f64(),
                elements_total: active.runs.len(),
                elements_started: active
                    .runs
                    .iter()
                    .filter(|r| !matches!(r, ElementRun::Pending))
                    .count(),
                elements_completed: active
                    .runs
                    .iter()
                    .filter(|r| matches!(r, ElementRun::Completed))
                    .count(),
            })
            .collect()
    }

    /// Launch an experience now
    ///
    /// `compiled_motions` maps motion element ids to sequences already
    /// compiled and validated at trigger time. Checks preconditions, the
    /// dependency DAG and Perfect-sync claims; a higher-priority
    /// experience preempts a lower one that holds a conflicting claim.
    pub fn launch(
        &mut self,
        experience: Experience,
        compiled_motions: HashMap<String, CompiledSequence>,
    ) -> ChoreoResult<()> {
        if self.lockdown {
            return Err(ChoreoError::rejected("lockdown in force"));
        }
        experience
            .validate()
            .map_err(|e| ChoreoError::rejected(format!("invalid experience: {}", e)))?;

        for precondition in &experience.preconditions {
            match precondition {
                Precondition::MotionIdle => {
                    if !self.scheduler.lock().is_idle() {
                        return Err(ChoreoError::rejected("motion not idle"));
                    }
                }
                // Energy is checked by the selector before it triggers
                Precondition::MinEnergy(_) => {}
            }
        }

        // At most one Perfect claim per backend; priority resolves conflicts
        let wanted: Vec<Backend> = experience
            .elements
            .iter()
            .filter(|e| e.sync == crate::timeline::SyncTolerance::Perfect)
            .map(|e| e.kind.backend())
            .collect();
        for backend in &wanted {
            if let Some(holder_id) = self.perfect_claims.get(backend).cloned() {
                let holder_priority = self
                    .active
                    .iter()
                    .find(|a| a.experience.id == holder_id)
                    .map(|a| a.experience.priority())
                    .unwrap_or(0);
                if experience.priority() > holder_priority {
                    log::info!(
                        "experience '{}' preempts '{}' for {:?} sync claim",
                        experience.id,
                        holder_id,
                        backend
                    );
                    self.preempt_experience(&holder_id);
                } else {
                    return Err(ChoreoError::rejected(format!(
                        "perfect-sync claim on {:?} held by '{}'",
                        backend, holder_id
                    )));
                }
            }
        }
        for backend in wanted {
            self.perfect_claims.insert(backend, experience.id.clone());
        }

        let start = self.clock.now();
        let deadline =
            start + Duration::from_secs_f64(experience.total_duration_s) + DEADLINE_GRACE;
        let runs = vec![ElementRun::Pending; experience.elements.len()];
        let shifts = vec![0.0; experience.elements.len()];
        log::info!(
            "launching experience '{}' ({} elements, {:.1}s)",
            experience.id,
            experience.elements.len(),
            experience.total_duration_s
        );
        self.active.push(ActiveExperience {
            experience,
            start,
            deadline,
            runs,
            shifts,
            compiled_motions,
        });
        Ok(())
    }

    /// Cancel one experience by id (cooperative cleanup)
    pub fn cancel(&mut self, experience_id: &str) {
        self.preempt_experience(experience_id);
    }

    /// One cooperative tick: poll safety, enforce deadlines, launch due
    /// elements, mark completions
    pub fn tick(&mut self) {
        if let Some(directive) = self.safety.poll() {
            if directive.is_halt() {
                self.preempt_all();
            }
            if directive.is_lockdown() {
                self.lockdown = true;
                if let Err(err) = self.audio.stop_all() {
                    log::warn!("audio stop_all failed during lockdown: {}", err);
                }
                let _ = self.lights.set("all", LightPattern::Alert, 1.0);
            } else if matches!(
                directive.severity,
                crate::safety::Severity::Moderate | crate::safety::Severity::High
            ) {
                // Gentle warning / crowd-dispersal cue; directives only
                // arrive on transitions, so this does not repeat.
                if let Err(err) = self.audio.play(WARNING_CUE_CLIP, 0.6) {
                    log::debug!("warning cue failed: {}", err);
                }
            }
        }

        let now = self.clock.now();

        // Deadlines first: an experience past total_duration + grace is
        // forcibly cleaned up.
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|a| now > a.deadline)
            .map(|a| a.experience.id.clone())
            .collect();
        for id in expired {
            log::warn!("experience '{}' exceeded its deadline, cleaning up", id);
            self.preempt_experience(&id);
        }

        for index in 0..self.active.len() {
            self.advance_experience(index, now);
        }

        // Retire completed experiences and release their claims
        let mut finished = Vec::new();
        self.active.retain(|active| {
            if active.is_complete() {
                finished.push(active.experience.id.clone());
                false
            } else {
                true
            }
        });
        for id in finished {
            log::info!("experience '{}' complete", id);
            self.perfect_claims.retain(|_, holder| holder != &id);
        }
    }

    fn advance_experience(&mut self, index: usize, now: Instant) {
        // Launch order follows start_offset ordering: scan elements by
        // ascending due time.
        let mut order: Vec<usize> = (0..self.active[index].experience.elements.len()).collect();
        order.sort_by(|&a, &b| {
            let ea = &self.active[index].experience.elements[a];
            let eb = &self.active[index].experience.elements[b];
            ea.start_offset_s
                .partial_cmp(&eb.start_offset_s)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for element_index in order {
            let (due, state) = {
                let active = &self.active[index];
                let element = &active.experience.elements[element_index];
                let due = active.start
                    + Duration::from_secs_f64(
                        (element.start_offset_s + active.shifts[element_index]).max(0.0),
                    );
                (due, active.runs[element_index])
            };

            match state {
                ElementRun::Pending => {
                    let tolerance = {
                        let element = &self.active[index].experience.elements[element_index];
                        Duration::from_secs_f64(element.sync.tolerance_ms() / 2000.0)
                    };
                    if now + tolerance < due {
                        continue;
                    }
                    if !self.dependencies_started(index, element_index) {
                        continue;
                    }
                    self.launch_element(index, element_index, due, now);
                }
                ElementRun::Started {
                    at,
                    audio,
                    drift_checked,
                } => {
                    let element = &self.active[index].experience.elements[element_index];
                    let duration = element.duration_s;
                    let elapsed = now.saturating_duration_since(at).as_secs_f64();

                    // One mid-clip drift check for strict audio elements
                    if let (Some(handle), false, true) =
                        (audio, drift_checked, element.sync.is_strict())
                    {
                        if elapsed >= duration / 2.0 {
                            let element_id = element.id.clone();
                            let tolerance_ms = element.sync.tolerance_ms();
                            if let Ok(position) = self.audio.position_ms(handle) {
                                let drift_ms = position as f64 - elapsed * 1000.0;
                                if drift_ms.abs() > tolerance_ms {
                                    telemetry().record(TelemetryEvent::SyncViolation {
                                        element: element_id,
                                        skew_ms: drift_ms,
                                        tolerance_ms,
                                        compensated: false,
                                    });
                                }
                            }
                            self.active[index].runs[element_index] = ElementRun::Started {
                                at,
                                audio,
                                drift_checked: true,
                            };
                        }
                    }

                    // Audio clips end on their own; lights return to neutral
                    if elapsed >= duration {
                        if let ElementKind::Light { zone, .. } =
                            &self.active[index].experience.elements[element_index].kind
                        {
                            let zone = zone.clone();
                            let _ = self.lights.set(&zone, LightPattern::Neutral, 0.0);
                        }
                        self.active[index].runs[element_index] = ElementRun::Completed;
                    }
                }
                ElementRun::Completed | ElementRun::Skipped => {}
            }
        }
    }

    fn dependencies_started(&self, index: usize, element_index: usize) -> bool {
        let active = &self.active[index];
        active.experience.elements[element_index]
            .depends_on
            .iter()
            .all(|dep| {
                active
                    .element_index(dep)
                    .map(|i| !matches!(active.runs[i], ElementRun::Pending))
                    .unwrap_or(false)
            })
    }

    fn launch_element(&mut self, index: usize, element_index: usize, due: Instant, now: Instant) {
        let element = self.active[index].experience.elements[element_index].clone();
        let actual_start;
        let mut audio_handle = None;

        match &element.kind {
            ElementKind::Motion { sequence_id } => {
                let compiled = self.active[index].compiled_motions.get(&element.id).cloned();
                match compiled {
                    Some(compiled) => {
                        // Enqueue with the absolute start; the scheduler's
                        // clock alignment does the precise timing.
                        let start = due.max(now);
                        actual_start = start;
                        if let Err(err) = self.scheduler.lock().enqueue(&compiled, start) {
                            log::warn!(
                                "motion element '{}' ({}) rejected at launch: {}",
                                element.id,
                                sequence_id,
                                err
                            );
                            self.active[index].runs[element_index] = ElementRun::Skipped;
                            return;
                        }
                    }
                    None => {
                        log::error!(
                            "motion element '{}' has no compiled sequence, skipping",
                            element.id
                        );
                        self.active[index].runs[element_index] = ElementRun::Skipped;
                        return;
                    }
                }
            }
            ElementKind::Audio { clip_id } => {
                actual_start = now;
                match self.audio.play(clip_id, element.intensity) {
                    Ok(handle) => audio_handle = Some(handle),
                    Err(err) => {
                        log::warn!("audio element '{}' failed to start: {}", element.id, err);
                        self.active[index].runs[element_index] = ElementRun::Skipped;
                        return;
                    }
                }
            }
            ElementKind::Light { zone, pattern } => {
                actual_start = now;
                if let Err(err) = self.lights.set(zone, *pattern, element.intensity) {
                    log::warn!("light element '{}' failed: {}", element.id, err);
                    self.active[index].runs[element_index] = ElementRun::Skipped;
                    return;
                }
            }
        }

        self.active[index].runs[element_index] = ElementRun::Started {
            at: actual_start,
            audio: audio_handle,
            drift_checked: false,
        };

        // Skew accounting against the (already compensated) target
        let skew_s = if actual_start >= due {
            actual_start.duration_since(due).as_secs_f64()
        } else {
            -(due.duration_since(actual_start).as_secs_f64())
        };
        let skew_ms = skew_s * 1000.0;
        let tolerance_ms = element.sync.tolerance_ms();
        if skew_ms.abs() > tolerance_ms {
            telemetry().record(TelemetryEvent::SyncViolation {
                element: element.id.clone(),
                skew_ms,
                tolerance_ms,
                compensated: element.sync.is_strict(),
            });
            log::warn!(
                "element '{}' skew {:.2}ms exceeds {:.0}ms tolerance",
                element.id,
                skew_ms,
                tolerance_ms
            );
        }

        // Single-shot resynchronization: pending dependents of a late
        // element inherit its skew as a phase shift so the remainder of
        // the chain stays aligned with what actually happened.
        if skew_s > 0.0 {
            let active = &mut self.active[index];
            for i in 0..active.experience.elements.len() {
                if active.experience.elements[i]
                    .depends_on
                    .iter()
                    .any(|d| d == &element.id)
                    && matches!(active.runs[i], ElementRun::Pending)
                {
                    active.shifts[i] = active.shifts[i].max(skew_s);
                }
            }
        }
    }

    /// Preempt every active experience (safety path)
    fn preempt_all(&mut self) {
        let ids: Vec<String> = self
            .active
            .iter()
            .map(|a| a.experience.id.clone())
            .collect();
        for id in ids {
            self.preempt_experience(&id);
        }
    }

    /// Fade audio, neutralize lighting, drop the experience.
    /// Motion halt/retract is the scheduler's job via its own safety channel.
    fn preempt_experience(&mut self, experience_id: &str) {
        let Some(position) = self
            .active
            .iter()
            .position(|a| a.experience.id == experience_id)
        else {
            return;
        };
        let active = self.active.remove(position);
        for (element, run) in active.experience.elements.iter().zip(&active.runs) {
            if let ElementRun::Started { audio, .. } = run {
                if let Some(handle) = audio {
                    if let Err(err) = self.audio.fade(*handle, PREEMPT_FADE_MS) {
                        log::warn!("audio fade failed during preemption: {}", err);
                    }
                }
                if let ElementKind::Light { zone, .. } = &element.kind {
                    let _ = self.lights.set(zone, LightPattern::Neutral, 0.0);
                }
            }
        }
        self.perfect_claims
            .retain(|_, holder| holder != experience_id);
        log::info!("experience '{}' preempted", experience_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ServoBus;
    use crate::bus::SafetyChannel;
    use crate::core::{JointConfig, JointTable, VirtualClock};
    use crate::safety::{SafetyDirective, SafetyReason};
    use crate::timeline::{SyncTolerance, TimelineElement};

    #[derive(Default)]
    struct NullBus;

    impl ServoBus for NullBus {
        fn write(&mut self, _channel: u8, _pwm_us: u16) -> ChoreoResult<()> {
            Ok(())
        }
        fn telemetry(&mut self) -> ChoreoResult<crate::adapters::BusTelemetry> {
            Ok(crate::adapters::BusTelemetry::default())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum AudioCall {
        Play(String, f64),
        Fade(u64),
        StopAll,
    }

    struct ScriptedAudio {
        calls: Arc<Mutex<Vec<AudioCall>>>,
        next_handle: u64,
    }

    impl AudioPlayer for ScriptedAudio {
        fn play(&mut self, clip_id: &str, volume: f64) -> ChoreoResult<PlayHandle> {
            self.calls
                .lock()
                .push(AudioCall::Play(clip_id.to_string(), volume));
            self.next_handle += 1;
            Ok(PlayHandle(self.next_handle))
        }
        fn fade(&mut self, _handle: PlayHandle, ms: u64) -> ChoreoResult<()> {
            self.calls.lock().push(AudioCall::Fade(ms));
            Ok(())
        }
        fn stop_all(&mut self) -> ChoreoResult<()> {
            self.calls.lock().push(AudioCall::StopAll);
            Ok(())
        }
        fn position_ms(&mut self, _handle: PlayHandle) -> ChoreoResult<u64> {
            Ok(0)
        }
    }

    struct ScriptedLights {
        calls: Arc<Mutex<Vec<(String, LightPattern)>>>,
    }

    impl LightBus for ScriptedLights {
        fn set(&mut self, zone: &str, pattern: LightPattern, _intensity: f64) -> ChoreoResult<()> {
            self.calls.lock().push((zone.to_string(), pattern));
            Ok(())
        }
    }

    #[allow(clippy::type_complexity)]
    fn rig() -> (
        TimelineCoordinator,
        VirtualClock,
        SafetyChannel,
        Arc<Mutex<Vec<AudioCall>>>,
        Arc<Mutex<Vec<(String, LightPattern)>>>,
    ) {
        let clock = VirtualClock::new();
        let table = Arc::new(
            JointTable::new(vec![JointConfig {
                name: "head_pitch".into(),
                bus_channel: 0,
                min_deg: -45.0,
                max_deg: 30.0,
                rest_deg: 0.0,
                max_velocity: 120.0,
                max_acceleration: 2400.0,
                pwm_min_us: 500,
                pwm_max_us: 2500,
                invert: false,
                trim_deg: 0.0,
            }])
            .unwrap(),
        );
        let scheduler = Arc::new(Mutex::new(MotionScheduler::new(
            table,
            Arc::new(Mutex::new(Box::new(NullBus) as Box<dyn ServoBus>)),
            Arc::new(clock.clone()),
            SafetyChannel::new(),
        )));
        let audio_calls = Arc::new(Mutex::new(Vec::new()));
        let light_calls = Arc::new(Mutex::new(Vec::new()));
        let safety = SafetyChannel::new();
        let coordinator = TimelineCoordinator::new(
            Arc::new(clock.clone()),
            scheduler,
            Box::new(ScriptedAudio {
                calls: audio_calls.clone(),
                next_handle: 0,
            }),
            Box::new(ScriptedLights {
                calls: light_calls.clone(),
            }),
            safety.clone(),
        );
        (coordinator, clock, safety, audio_calls, light_calls)
    }

    fn step(coordinator: &mut TimelineCoordinator, clock: &VirtualClock, ms: u64) {
        clock.advance(Duration::from_millis(ms));
        coordinator.tick();
    }

    #[test]
    fn test_elements_launch_in_offset_order() {
        let (mut coordinator, clock, _safety, audio, lights) = rig();
        let experience = Experience::new("show")
            .with_element(TimelineElement::audio("first", "beep", 0.0, 0.5))
            .with_element(
                TimelineElement::light("second", "dome", LightPattern::Pulse, 0.2, 0.5),
            );
        coordinator.launch(experience, HashMap::new()).unwrap();

        coordinator.tick();
        assert_eq!(audio.lock().len(), 1);
        assert!(lights.lock().is_empty());

        step(&mut coordinator, &clock, 250);
        assert_eq!(lights.lock().len(), 1);
        assert_eq!(lights.lock()[0].1, LightPattern::Pulse);
    }

    #[test]
    fn test_dependent_waits_for_prerequisite() {
        let (mut coordinator, clock, _safety, audio, _lights) = rig();
        // Audio due at 0.1 s but depends on a light due at 0.3 s
        let experience = Experience::new("dag")
            .with_element(TimelineElement::light(
                "cue",
                "dome",
                LightPattern::Steady,
                0.3,
                0.2,
            ))
            .with_element(TimelineElement::audio("voice", "hello", 0.1, 0.5).depends("cue"));
        coordinator.launch(experience, HashMap::new()).unwrap();

        step(&mut coordinator, &clock, 150);
        assert!(audio.lock().is_empty(), "dependent must wait");
        step(&mut coordinator, &clock, 200); // 0.35 s: cue started
        assert_eq!(audio.lock().len(), 1);
    }

    #[test]
    fn test_strict_dependent_phase_shifted_by_late_prerequisite() {
        let (mut coordinator, clock, _safety, audio, _lights) = rig();
        // Prerequisite due at 0.1 s with Tight sync; coordinator ticks at
        // 0.11 s, so it starts 10 ms late. Dependent audio at 0.2 s must
        // inherit the 10 ms shift and start at 0.21 s without a violation.
        let experience = Experience::new("s5")
            .with_element(
                TimelineElement::light("accent", "dome", LightPattern::Pulse, 0.1, 1.0)
                    .with_sync(SyncTolerance::Tight),
            )
            .with_element(
                TimelineElement::audio("sting", "brass", 0.2, 1.0)
                    .with_sync(SyncTolerance::Tight)
                    .depends("accent"),
            );
        coordinator.launch(experience, HashMap::new()).unwrap();

        step(&mut coordinator, &clock, 110); // accent starts 10 ms late
        step(&mut coordinator, &clock, 95); // 0.205 s: audio NOT yet due (0.21 shift)
        assert!(audio.lock().is_empty());
        step(&mut coordinator, &clock, 10); // 0.215 s: inside tolerance window
        assert_eq!(audio.lock().len(), 1);

        // The 10 ms-late prerequisite violated its 5 ms tolerance; the
        // compensated dependent did not.
        let events = telemetry().snapshot();
        let violated: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                crate::telemetry::TelemetryEvent::SyncViolation { element, .. } => {
                    Some(element.as_str())
                }
                _ => None,
            })
            .collect();
        assert!(violated.contains(&"accent"));
        assert!(!violated.contains(&"sting"));
    }

    #[test]
    fn test_deadline_forces_cleanup() {
        let (mut coordinator, clock, _safety, audio, _lights) = rig();
        let experience =
            Experience::new("stuck").with_element(TimelineElement::audio("a", "loop", 0.0, 1.0));
        coordinator.launch(experience, HashMap::new()).unwrap();
        coordinator.tick();
        assert_eq!(coordinator.active_count(), 1);

        // total 1.0 s + 2 s grace; jump past it
        step(&mut coordinator, &clock, 3100);
        assert_eq!(coordinator.active_count(), 0);
        assert!(audio.lock().contains(&AudioCall::Fade(50)));
    }

    #[test]
    fn test_halt_directive_preempts_with_fade_and_neutral_lights() {
        let (mut coordinator, clock, safety, audio, lights) = rig();
        let experience = Experience::new("show")
            .with_element(TimelineElement::audio("a", "fanfare", 0.0, 5.0))
            .with_element(TimelineElement::light(
                "l",
                "body",
                LightPattern::Chase,
                0.0,
                5.0,
            ));
        coordinator.launch(experience, HashMap::new()).unwrap();
        coordinator.tick();

        safety.publish(SafetyDirective::critical(SafetyReason::GuestProximity {
            distance_m: 0.2,
        }));
        step(&mut coordinator, &clock, 20);
        assert_eq!(coordinator.active_count(), 0);
        assert!(audio.lock().contains(&AudioCall::Fade(50)));
        assert!(lights
            .lock()
            .iter()
            .any(|(zone, pattern)| zone == "body" && *pattern == LightPattern::Neutral));
    }

    #[test]
    fn test_lockdown_stops_audio_and_refuses_new_experiences() {
        let (mut coordinator, clock, safety, audio, lights) = rig();
        safety.publish(SafetyDirective::emergency(SafetyReason::OperatorStop));
        step(&mut coordinator, &clock, 10);

        assert!(audio.lock().contains(&AudioCall::StopAll));
        assert!(lights
            .lock()
            .iter()
            .any(|(_, pattern)| *pattern == LightPattern::Alert));

        let err = coordinator
            .launch(Experience::new("nope"), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ChoreoError::Rejected(_)));

        coordinator.clear_lockdown();
        assert!(coordinator
            .launch(
                Experience::new("ok").with_element(TimelineElement::audio("a", "x", 0.0, 0.1)),
                HashMap::new()
            )
            .is_ok());
    }

    #[test]
    fn test_perfect_claim_conflict_resolved_by_priority() {
        let (mut coordinator, _clock, _safety, _audio, _lights) = rig();
        let low = Experience::new("low").with_element(
            TimelineElement::audio("a", "x", 0.0, 10.0)
                .with_sync(SyncTolerance::Perfect)
                .with_priority(3),
        );
        let equal = Experience::new("equal").with_element(
            TimelineElement::audio("b", "y", 0.0, 10.0)
                .with_sync(SyncTolerance::Perfect)
                .with_priority(3),
        );
        let high = Experience::new("high").with_element(
            TimelineElement::audio("c", "z", 0.0, 10.0)
                .with_sync(SyncTolerance::Perfect)
                .with_priority(8),
        );

        coordinator.launch(low, HashMap::new()).unwrap();
        // Equal priority cannot steal the claim
        assert!(coordinator.launch(equal, HashMap::new()).is_err());
        // Higher priority preempts
        coordinator.launch(high, HashMap::new()).unwrap();
        assert_eq!(coordinator.active_count(), 1);
        assert_eq!(coordinator.statuses()[0].id, "high");
    }

    #[test]
    fn test_experience_completes_and_releases_claim() {
        let (mut coordinator, clock, _safety, _audio, _lights) = rig();
        let experience = Experience::new("short").with_element(
            TimelineElement::audio("a", "blip", 0.0, 0.2).with_sync(SyncTolerance::Perfect),
        );
        coordinator.launch(experience, HashMap::new()).unwrap();
        coordinator.tick();
        step(&mut coordinator, &clock, 250);
        assert_eq!(coordinator.active_count(), 0);

        // Claim released: a new Perfect holder launches cleanly
        let next = Experience::new("next").with_element(
            TimelineElement::audio("b", "blip", 0.0, 0.2).with_sync(SyncTolerance::Perfect),
        );
        assert!(coordinator.launch(next, HashMap::new()).is_ok());
    }
}

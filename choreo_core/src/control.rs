//! Control surface
//!
//! The transport-agnostic command set: trigger experiences, set
//! personality, emergency stop/clear, query status. A `Controller` is
//! cheap to clone and safe to call from any thread; every mutation goes
//! through the owning component's lock.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::behavior::{BehaviorSelector, Intensity, PersonalityMode};
use crate::config::ShowConfig;
use crate::error::{ChoreoError, ChoreoResult};
use crate::motion::{MotionMetrics, MotionScheduler};
use crate::safety::{SafetySupervisor, Severity};
use crate::sequence::{CompiledSequence, PersonalityParams, SequenceCompiler};
use crate::telemetry::{telemetry, TelemetryCounters, TelemetryEvent};
use crate::timeline::{ElementKind, ExperienceStatus, TimelineCoordinator};

/// Handle returned by a successful trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperienceHandle(pub String);

/// Optional overrides for one trigger
#[derive(Debug, Clone, Default)]
pub struct TriggerOverrides {
    /// Use a named personality bundle from the config
    pub personality: Option<String>,
    /// Or override the parameters outright (wins over `personality`)
    pub params: Option<PersonalityParams>,
}

/// Serializable joint row for status queries
#[derive(Debug, Clone, Serialize)]
pub struct JointStatus {
    pub name: String,
    pub current_deg: f64,
    pub target_deg: f64,
    pub velocity_dps: f64,
    pub temperature_c: f64,
    pub current_a: f64,
    pub in_motion: bool,
    pub fault: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatus {
    pub severity: Severity,
    pub emergency_latched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonalityStatus {
    pub mode: PersonalityMode,
    pub intensity: Intensity,
    pub energy: f64,
    pub social_battery: f64,
    pub stress: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsStatus {
    pub total_ticks: u64,
    pub overrun_ticks: u64,
    pub max_jitter_us: u64,
    pub jitter_buckets: [u64; 6],
    pub commands_written: u64,
    pub clamp_events: u64,
    pub counters: TelemetryCounters,
}

impl From<MotionMetrics> for MetricsStatus {
    fn from(metrics: MotionMetrics) -> Self {
        Self {
            total_ticks: metrics.total_ticks,
            overrun_ticks: metrics.overrun_ticks,
            max_jitter_us: metrics.max_jitter_us,
            jitter_buckets: metrics.jitter_buckets,
            commands_written: metrics.commands_written,
            clamp_events: metrics.clamp_events,
            counters: telemetry().counters(),
        }
    }
}

/// Full status snapshot for `Query`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub joints: Vec<JointStatus>,
    pub active_experiences: Vec<ExperienceStatus>,
    pub safety: SafetyStatus,
    pub personality: PersonalityStatus,
    pub metrics: MetricsStatus,
}

/// The command surface over a running kernel
#[derive(Clone)]
pub struct Controller {
    config: Arc<ShowConfig>,
    scheduler: Arc<Mutex<MotionScheduler>>,
    coordinator: Arc<Mutex<TimelineCoordinator>>,
    selector: Arc<Mutex<BehaviorSelector>>,
    supervisor: Arc<Mutex<SafetySupervisor>>,
    compiler: Arc<SequenceCompiler>,
}

impl Controller {
    pub fn new(
        config: Arc<ShowConfig>,
        scheduler: Arc<Mutex<MotionScheduler>>,
        coordinator: Arc<Mutex<TimelineCoordinator>>,
        selector: Arc<Mutex<BehaviorSelector>>,
        supervisor: Arc<Mutex<SafetySupervisor>>,
    ) -> Self {
        let compiler = Arc::new(SequenceCompiler::new(config.table.clone()));
        Self {
            config,
            scheduler,
            coordinator,
            selector,
            supervisor,
            compiler,
        }
    }

    /// Launch an experience from the catalog
    ///
    /// Compiles and validates every motion element up front; any failure
    /// rejects the whole trigger with no state change.
    pub fn trigger_experience(
        &self,
        experience_id: &str,
        overrides: TriggerOverrides,
    ) -> ChoreoResult<ExperienceHandle> {
        if self.supervisor.lock().is_emergency_latched() {
            let err = ChoreoError::rejected("emergency lockdown in force");
            self.record_rejection(experience_id, &err);
            return Err(err);
        }

        let experience = self
            .config
            .experiences
            .get(experience_id)
            .ok_or_else(|| ChoreoError::UnknownExperience(experience_id.to_string()))?
            .clone();

        let params = match (&overrides.params, &overrides.personality) {
            (Some(params), _) => *params,
            (None, Some(name)) => *self
                .config
                .personalities
                .get(name)
                .ok_or_else(|| ChoreoError::rejected(format!("unknown personality '{}'", name)))?,
            (None, None) => self.selector.lock().state().params(),
        };

        let compiled = match self.compile_motions(&experience.elements, &params) {
            Ok(compiled) => compiled,
            Err(err) => {
                self.record_rejection(experience_id, &err);
                return Err(err);
            }
        };

        if let Err(err) = self.coordinator.lock().launch(experience, compiled) {
            self.record_rejection(experience_id, &err);
            return Err(err);
        }
        Ok(ExperienceHandle(experience_id.to_string()))
    }

    fn compile_motions(
        &self,
        elements: &[crate::timeline::TimelineElement],
        params: &PersonalityParams,
    ) -> ChoreoResult<HashMap<String, CompiledSequence>> {
        let states = self.scheduler.lock().snapshot_handle().load_full();
        let mut compiled = HashMap::new();
        for element in elements {
            let ElementKind::Motion { sequence_id } = &element.kind else {
                continue;
            };
            let sequence = self
                .config
                .sequences
                .get(sequence_id)
                .ok_or_else(|| ChoreoError::UnknownSequence(sequence_id.clone()))?;
            let output = self.compiler.compile(sequence, params, &states)?;
            compiled.insert(element.id.clone(), output);
        }
        Ok(compiled)
    }

    fn record_rejection(&self, what: &str, err: &ChoreoError) {
        telemetry().record(TelemetryEvent::Rejected {
            what: what.to_string(),
            reason: err.to_string(),
        });
    }

    /// Set the personality mode, optionally with an intensity
    pub fn set_personality(
        &self,
        mode: PersonalityMode,
        intensity: Option<Intensity>,
    ) -> ChoreoResult<()> {
        self.selector.lock().set_personality(mode, intensity);
        Ok(())
    }

    /// Immediate Emergency directive; always accepted, idempotent
    pub fn emergency_stop(&self) {
        self.supervisor.lock().emergency_stop();
    }

    /// Clear a latched Emergency; refused until the field has been calm
    pub fn clear_emergency(&self) -> ChoreoResult<()> {
        self.supervisor.lock().clear_emergency()?;
        self.scheduler.lock().clear_lockdown();
        self.coordinator.lock().clear_lockdown();
        Ok(())
    }

    /// Full status snapshot
    pub fn query(&self) -> StatusReport {
        let states = self.scheduler.lock().snapshot_handle().load_full();
        let joints = states
            .iter()
            .enumerate()
            .map(|(index, state)| JointStatus {
                name: self.config.table.name(crate::core::JointId(index as u16)),
                current_deg: state.current_deg,
                target_deg: state.target_deg,
                velocity_dps: state.velocity_dps,
                temperature_c: state.temperature_c,
                current_a: state.current_a,
                in_motion: state.in_motion,
                fault: state.fault.map(|f| f.to_string()),
            })
            .collect();

        let supervisor = self.supervisor.lock();
        let safety = SafetyStatus {
            severity: supervisor.severity(),
            emergency_latched: supervisor.is_emergency_latched(),
        };
        drop(supervisor);

        let selector = self.selector.lock();
        let personality = PersonalityStatus {
            mode: selector.state().mode,
            intensity: selector.state().intensity,
            energy: selector.state().energy,
            social_battery: selector.state().social_battery,
            stress: selector.state().stress,
        };
        drop(selector);

        StatusReport {
            joints,
            active_experiences: self.coordinator.lock().statuses(),
            safety,
            personality,
            metrics: self.scheduler.lock().metrics().into(),
        }
    }
}

//! Safety supervisor
//!
//! Independent evaluator of thermal, electrical, positional, proximity,
//! crowd and liveness limits. Runs at a rate indexed by the current
//! severity (5 Hz calm, 200 Hz in an emergency), always evaluates every
//! limit, and the highest severity wins. Directives go out on the
//! out-of-band channel; everything Moderate and above also lands in the
//! durable incident log.
//!
//! The supervisor never touches actuators itself. Its directives preempt
//! the scheduler and coordinator; the independent watchdog covers the
//! case where the supervisor itself goes quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::BusTelemetry;
use crate::bus::SafetyPublisher;
use crate::core::{Clock, GuestObservation, JointId, JointState, JointTable};
use crate::error::{ChoreoError, ChoreoResult};
use crate::safety::{
    AffectedJoints, Incident, IncidentLog, RequiredAction, SafetyDirective, SafetyLimits,
    SafetyReason, Severity,
};
use crate::telemetry::{telemetry, TelemetryEvent};

/// Seconds Critical+ must be absent before an Emergency may clear
const CLEAR_CALM_S: f64 = 5.0;
/// Range narrowing applied by the High-severity clamp
const HIGH_CLAMP_SCALE: f64 = 0.6;

/// Read-only inputs for one evaluation pass
pub struct SafetyInputs<'a> {
    /// Latest joint snapshot from the motion scheduler
    pub joint_states: &'a [JointState],
    /// Latest guest observations
    pub observations: &'a [GuestObservation],
    /// Latest servo bus telemetry, if a poll has succeeded recently
    pub bus_telemetry: Option<&'a BusTelemetry>,
    /// Seconds since bus telemetry last arrived
    pub telemetry_age_s: f64,
    /// Seconds since the guest observer last produced anything
    pub observer_age_s: f64,
    /// Seconds since the motion scheduler's tick counter last moved
    pub scheduler_heartbeat_age_s: f64,
}

type Condition = (Severity, SafetyReason, AffectedJoints);

/// Continuously evaluates limits and issues graded directives
pub struct SafetySupervisor {
    limits: SafetyLimits,
    clock: Arc<dyn Clock>,
    table: Arc<JointTable>,
    publisher: SafetyPublisher,
    incident_log: Option<IncidentLog>,
    started_at: Instant,
    severity: Severity,
    last_reason: Option<SafetyReason>,
    /// Emergency stays latched until explicitly cleared
    emergency_latched: bool,
    last_critical_at: Option<Instant>,
    /// Liveness counter for the independent watchdog
    heartbeat: Arc<AtomicU64>,
}

impl SafetySupervisor {
    pub fn new(
        limits: SafetyLimits,
        table: Arc<JointTable>,
        clock: Arc<dyn Clock>,
        publisher: SafetyPublisher,
    ) -> Self {
        let now = clock.now();
        Self {
            limits,
            clock,
            table,
            publisher,
            incident_log: None,
            started_at: now,
            severity: Severity::None,
            last_reason: None,
            emergency_latched: false,
            last_critical_at: None,
            heartbeat: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_incident_log(mut self, log: IncidentLog) -> Self {
        self.incident_log = Some(log);
        self
    }

    /// Attach the incident log after construction
    pub fn set_incident_log(&mut self, log: IncidentLog) {
        self.incident_log = Some(log);
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_emergency_latched(&self) -> bool {
        self.emergency_latched
    }

    /// Evaluation period at the current severity
    pub fn eval_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.severity.eval_hz() as u64)
    }

    pub fn heartbeat_handle(&self) -> Arc<AtomicU64> {
        self.heartbeat.clone()
    }

    /// Operator emergency stop: always accepted, idempotent
    pub fn emergency_stop(&mut self) {
        let already = self.emergency_latched;
        self.emergency_latched = true;
        self.last_critical_at = Some(self.clock.now());
        if !already {
            self.emit(
                Severity::Emergency,
                SafetyReason::OperatorStop,
                AffectedJoints::All,
                vec![RequiredAction::Lockdown],
                0,
            );
        }
        self.severity = Severity::Emergency;
    }

    /// Clear a latched Emergency; requires ≥ 5 s without Critical+ conditions
    pub fn clear_emergency(&mut self) -> ChoreoResult<()> {
        if !self.emergency_latched {
            return Ok(());
        }
        let calm_for = self
            .last_critical_at
            .map(|at| self.clock.now().saturating_duration_since(at).as_secs_f64())
            .unwrap_or(f64::INFINITY);
        if calm_for < CLEAR_CALM_S {
            return Err(ChoreoError::ClearRefused(format!(
                "critical condition {:.1}s ago, need {:.0}s calm",
                calm_for, CLEAR_CALM_S
            )));
        }
        self.emergency_latched = false;
        self.severity = Severity::None;
        self.last_reason = None;
        log::info!("emergency cleared");
        Ok(())
    }

    /// One evaluation pass over every limit; emits at most one directive
    pub fn evaluate(&mut self, inputs: &SafetyInputs<'_>) -> Option<SafetyDirective> {
        let eval_start = self.clock.now();
        self.heartbeat.fetch_add(1, Ordering::Relaxed);

        let mut conditions: Vec<Condition> = Vec::new();
        self.check_thermal(inputs, &mut conditions);
        self.check_electrical(inputs, &mut conditions);
        self.check_position_error(inputs, &mut conditions);
        self.check_guests(inputs, &mut conditions);
        self.check_liveness(inputs, &mut conditions);
        self.check_runtime(&mut conditions);

        // Highest severity wins; first hit among equals
        let mut worst: Option<Condition> = None;
        for condition in conditions {
            let replace = match &worst {
                Some(current) => condition.0 > current.0,
                None => condition.0 > Severity::None,
            };
            if replace {
                worst = Some(condition);
            }
        }

        // The calm window for clearing an Emergency tracks real conditions
        // only, never the latch itself.
        if matches!(&worst, Some((severity, _, _)) if *severity >= Severity::Critical) {
            self.last_critical_at = Some(eval_start);
        }
        if matches!(&worst, Some((severity, _, _)) if *severity >= Severity::Emergency) {
            self.emergency_latched = true;
        }

        // A latched emergency dominates whatever else is going on
        if self.emergency_latched {
            let reason = worst
                .map(|(_, reason, _)| reason)
                .unwrap_or(SafetyReason::OperatorStop);
            worst = Some((Severity::Emergency, reason, AffectedJoints::All));
        }

        let (severity, reason, affected) = match worst {
            Some(found) => found,
            None => {
                // De-escalation is announced so consumers release graded
                // restrictions (clamps, protective bias).
                if self.severity > Severity::None {
                    log::info!("safety de-escalated from {}", self.severity.as_str());
                    self.severity = Severity::None;
                    self.last_reason = None;
                    let all_clear =
                        SafetyDirective::new(Severity::None, SafetyReason::AllClear, vec![]);
                    self.publisher.publish(&all_clear);
                    return Some(all_clear);
                }
                return None;
            }
        };

        // Emit on escalation/transition, or when a Critical+ condition
        // changes its reason while severity is unchanged.
        let transition = severity != self.severity;
        let new_reason = self.last_reason.as_ref() != Some(&reason);
        if !transition && !(severity >= Severity::Critical && new_reason) {
            return None;
        }

        let latency_ms = self
            .clock
            .now()
            .saturating_duration_since(eval_start)
            .as_millis() as u64;
        let directive = self.emit(severity, reason, affected, actions_for(severity), latency_ms);
        Some(directive)
    }

    fn emit(
        &mut self,
        severity: Severity,
        reason: SafetyReason,
        affected: AffectedJoints,
        actions: Vec<RequiredAction>,
        latency_ms: u64,
    ) -> SafetyDirective {
        let directive = SafetyDirective {
            severity,
            reason: reason.clone(),
            affected: affected.clone(),
            actions: actions.clone(),
            deadline_ms: severity.latency_budget_ms(),
        };
        self.publisher.publish(&directive);
        self.severity = severity;
        self.last_reason = Some(reason.clone());

        log::warn!("safety directive {}: {}", severity.as_str(), reason);
        telemetry().record(TelemetryEvent::DirectiveIssued {
            severity,
            reason: reason.to_string(),
        });

        if severity >= Severity::Moderate {
            if let Some(log_file) = &self.incident_log {
                let incident =
                    Incident::new(severity, reason.to_string(), affected, actions, latency_ms);
                if let Err(err) = log_file.append(&incident) {
                    log::error!("failed to append incident: {}", err);
                }
            }
        }
        directive
    }

    fn check_thermal(&self, inputs: &SafetyInputs<'_>, conditions: &mut Vec<Condition>) {
        for (index, state) in inputs.joint_states.iter().enumerate() {
            let joint = JointId(index as u16);
            if state.temperature_c >= self.limits.temp_crit_c {
                conditions.push((
                    Severity::Critical,
                    SafetyReason::Thermal {
                        joint: Some(joint),
                        temp_c: state.temperature_c,
                    },
                    AffectedJoints::All,
                ));
            } else if state.temperature_c >= self.limits.temp_warn_c {
                conditions.push((
                    Severity::Moderate,
                    SafetyReason::Thermal {
                        joint: Some(joint),
                        temp_c: state.temperature_c,
                    },
                    AffectedJoints::Joints(vec![joint]),
                ));
            }
        }
    }

    fn check_electrical(&self, inputs: &SafetyInputs<'_>, conditions: &mut Vec<Condition>) {
        let Some(samples) = inputs.bus_telemetry else {
            return;
        };
        let total = samples.total_current_a();
        if total >= self.limits.bus_current_limit_a {
            conditions.push((
                Severity::Critical,
                SafetyReason::Overcurrent {
                    joint: None,
                    current_a: total,
                },
                AffectedJoints::All,
            ));
        }
        for (index, config) in self.table.iter() {
            let Some(sample) = samples.channels.get(&config.bus_channel) else {
                continue;
            };
            if sample.current_a >= self.limits.current_crit_a {
                conditions.push((
                    Severity::Critical,
                    SafetyReason::Overcurrent {
                        joint: Some(index),
                        current_a: sample.current_a,
                    },
                    AffectedJoints::All,
                ));
            } else if sample.current_a >= self.limits.current_warn_a {
                conditions.push((
                    Severity::Moderate,
                    SafetyReason::Overcurrent {
                        joint: Some(index),
                        current_a: sample.current_a,
                    },
                    AffectedJoints::Joints(vec![index]),
                ));
            }
            if sample.voltage_v > 0.0 {
                if sample.voltage_v <= self.limits.voltage_crit_low_v {
                    conditions.push((
                        Severity::Critical,
                        SafetyReason::VoltageOutOfRange {
                            voltage_v: sample.voltage_v,
                        },
                        AffectedJoints::All,
                    ));
                } else if sample.voltage_v < self.limits.voltage_min_v
                    || sample.voltage_v > self.limits.voltage_max_v
                {
                    conditions.push((
                        Severity::Moderate,
                        SafetyReason::VoltageOutOfRange {
                            voltage_v: sample.voltage_v,
                        },
                        AffectedJoints::All,
                    ));
                }
            }
        }
    }

    fn check_position_error(&self, inputs: &SafetyInputs<'_>, conditions: &mut Vec<Condition>) {
        let Some(samples) = inputs.bus_telemetry else {
            return;
        };
        for (id, config) in self.table.iter() {
            let Some(state) = inputs.joint_states.get(id.index()) else {
                continue;
            };
            let Some(sample) = samples.channels.get(&config.bus_channel) else {
                continue;
            };
            if sample.reported_pwm_us == 0 {
                continue;
            }
            let commanded = config.angle_to_pulse_us(state.last_commanded_deg);
            let error_us = commanded.abs_diff(sample.reported_pwm_us);
            if error_us >= self.limits.position_error_crit_us {
                conditions.push((
                    Severity::High,
                    SafetyReason::PositionError { joint: id, error_us },
                    AffectedJoints::Joints(vec![id]),
                ));
            } else if error_us >= self.limits.position_error_warn_us {
                conditions.push((
                    Severity::Low,
                    SafetyReason::PositionError { joint: id, error_us },
                    AffectedJoints::Joints(vec![id]),
                ));
            }
        }
    }

    fn check_guests(&self, inputs: &SafetyInputs<'_>, conditions: &mut Vec<Condition>) {
        let mut social_count = 0usize;
        for observation in inputs.observations {
            if observation.distance_m <= self.limits.emergency_stop_distance_m {
                conditions.push((
                    Severity::Emergency,
                    SafetyReason::GuestProximity {
                        distance_m: observation.distance_m,
                    },
                    AffectedJoints::All,
                ));
                continue;
            }
            // Children get the tightened zones everywhere in safety
            let zone = observation.effective_zone(self.limits.child_zone_scale);
            if zone.is_unsafe() {
                conditions.push((
                    Severity::Critical,
                    SafetyReason::GuestProximity {
                        distance_m: observation.distance_m,
                    },
                    AffectedJoints::All,
                ));
            }
            if observation.velocity_mps >= self.limits.critical_approach_mps
                && observation.distance_m <= 2.5
            {
                conditions.push((
                    Severity::High,
                    SafetyReason::ApproachSpeed {
                        speed_mps: observation.velocity_mps,
                    },
                    AffectedJoints::All,
                ));
            }
            if observation.distance_m <= 4.0 {
                social_count += 1;
            }
        }
        if social_count > self.limits.crowd_pressure_limit {
            conditions.push((
                Severity::High,
                SafetyReason::CrowdPressure {
                    count: social_count,
                },
                AffectedJoints::All,
            ));
        }
    }

    fn check_liveness(&self, inputs: &SafetyInputs<'_>, conditions: &mut Vec<Condition>) {
        if inputs.telemetry_age_s > self.limits.comm_timeout_s {
            conditions.push((
                Severity::High,
                SafetyReason::CommTimeout {
                    backend: "servo_bus".into(),
                },
                AffectedJoints::All,
            ));
        }
        if inputs.observer_age_s > self.limits.comm_timeout_s {
            conditions.push((
                Severity::High,
                SafetyReason::CommTimeout {
                    backend: "guest_observer".into(),
                },
                AffectedJoints::All,
            ));
        }
        if inputs.scheduler_heartbeat_age_s > self.limits.scheduler_watchdog_s {
            conditions.push((
                Severity::Critical,
                SafetyReason::WatchdogMiss {
                    task: "motion_scheduler".into(),
                },
                AffectedJoints::All,
            ));
        }
        // Faulted joints keep the field degraded
        for (index, state) in inputs.joint_states.iter().enumerate() {
            if state.fault.is_some() {
                conditions.push((
                    Severity::Moderate,
                    SafetyReason::InternalFault {
                        detail: format!("{} faulted", JointId(index as u16)),
                    },
                    AffectedJoints::Joints(vec![JointId(index as u16)]),
                ));
            }
        }
    }

    fn check_runtime(&self, conditions: &mut Vec<Condition>) {
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(self.started_at)
            .as_secs();
        if elapsed >= self.limits.max_runtime_s {
            conditions.push((
                Severity::Critical,
                SafetyReason::RuntimeExceeded { elapsed_s: elapsed },
                AffectedJoints::All,
            ));
        }
    }
}

/// The directive table: what each severity requires
fn actions_for(severity: Severity) -> Vec<RequiredAction> {
    match severity {
        // Low is enhanced monitoring only; Moderate biases the selector
        Severity::None | Severity::Low | Severity::Moderate => vec![],
        Severity::High => vec![
            RequiredAction::BackOff,
            RequiredAction::Clamp {
                range_scale: HIGH_CLAMP_SCALE,
            },
        ],
        Severity::Critical => vec![RequiredAction::Halt],
        Severity::Emergency => vec![RequiredAction::Lockdown],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChannelTelemetry;
    use crate::bus::SafetyChannel;
    use crate::core::{JointConfig, VirtualClock};
    use std::collections::HashMap;

    fn table() -> Arc<JointTable> {
        Arc::new(
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
        )
    }

    fn rig() -> (SafetySupervisor, VirtualClock, SafetyChannel) {
        let clock = VirtualClock::new();
        let mut publisher = SafetyPublisher::new();
        let channel = publisher.subscribe();
        let supervisor = SafetySupervisor::new(
            SafetyLimits::default(),
            table(),
            Arc::new(clock.clone()),
            publisher,
        );
        (supervisor, clock, channel)
    }

    fn calm_inputs<'a>(
        states: &'a [JointState],
        observations: &'a [GuestObservation],
    ) -> SafetyInputs<'a> {
        SafetyInputs {
            joint_states: states,
            observations,
            bus_telemetry: None,
            telemetry_age_s: 0.0,
            observer_age_s: 0.0,
            scheduler_heartbeat_age_s: 0.0,
        }
    }

    fn rest_states(clock: &VirtualClock) -> Vec<JointState> {
        table()
            .iter()
            .map(|(_, c)| JointState::at_rest(c, clock.now()))
            .collect()
    }

    #[test]
    fn test_calm_field_emits_nothing() {
        let (mut supervisor, clock, channel) = rig();
        let states = rest_states(&clock);
        assert!(supervisor.evaluate(&calm_inputs(&states, &[])).is_none());
        assert!(channel.poll().is_none());
        assert_eq!(supervisor.severity(), Severity::None);
        assert_eq!(supervisor.eval_period(), Duration::from_millis(200));
    }

    #[test]
    fn test_guest_inside_estop_distance_is_emergency() {
        let (mut supervisor, clock, channel) = rig();
        let states = rest_states(&clock);
        let observations = vec![GuestObservation::at_distance(0.2)];
        let directive = supervisor
            .evaluate(&calm_inputs(&states, &observations))
            .unwrap();
        assert_eq!(directive.severity, Severity::Emergency);
        assert!(directive.is_lockdown());
        assert!(supervisor.is_emergency_latched());
        assert_eq!(channel.poll().unwrap().severity, Severity::Emergency);
        // Emergency cadence
        assert_eq!(supervisor.eval_period(), Duration::from_millis(5));
    }

    #[test]
    fn test_danger_zone_is_critical_halt() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        let observations = vec![GuestObservation::at_distance(0.4)];
        let directive = supervisor
            .evaluate(&calm_inputs(&states, &observations))
            .unwrap();
        assert_eq!(directive.severity, Severity::Critical);
        assert!(directive.is_halt());
        assert!(!supervisor.is_emergency_latched());
    }

    #[test]
    fn test_child_tightened_zone_raises_critical() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        // Adult at 0.6 m: Caution, no directive. Child at 0.6 m: Danger.
        let adult = vec![GuestObservation::at_distance(0.6)];
        assert!(supervisor.evaluate(&calm_inputs(&states, &adult)).is_none());

        let mut child = GuestObservation::at_distance(0.6);
        child.age_group = crate::core::AgeGroup::Child;
        let directive = supervisor
            .evaluate(&calm_inputs(&states, &[child]))
            .unwrap();
        assert_eq!(directive.severity, Severity::Critical);
    }

    #[test]
    fn test_fast_approach_is_high() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        let mut runner = GuestObservation::at_distance(2.0);
        runner.velocity_mps = 2.5;
        let directive = supervisor
            .evaluate(&calm_inputs(&states, &[runner]))
            .unwrap();
        assert_eq!(directive.severity, Severity::High);
        assert!(directive
            .actions
            .iter()
            .any(|a| matches!(a, RequiredAction::Clamp { .. })));
    }

    #[test]
    fn test_thermal_grading() {
        let (mut supervisor, clock, _channel) = rig();
        let mut states = rest_states(&clock);
        states[0].temperature_c = 72.0;
        let directive = supervisor.evaluate(&calm_inputs(&states, &[])).unwrap();
        assert_eq!(directive.severity, Severity::Moderate);

        states[0].temperature_c = 85.0;
        let directive = supervisor.evaluate(&calm_inputs(&states, &[])).unwrap();
        assert_eq!(directive.severity, Severity::Critical);
    }

    #[test]
    fn test_electrical_limits() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        let mut samples = BusTelemetry::default();
        samples.channels.insert(
            0,
            ChannelTelemetry {
                temp_c: 30.0,
                current_a: 1.7,
                voltage_v: 6.0,
                reported_pwm_us: 0,
            },
        );
        let mut inputs = calm_inputs(&states, &[]);
        inputs.bus_telemetry = Some(&samples);
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::Moderate);

        samples.channels.get_mut(&0).unwrap().current_a = 2.2;
        let mut inputs = calm_inputs(&states, &[]);
        inputs.bus_telemetry = Some(&samples);
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::Critical);
    }

    #[test]
    fn test_undervoltage_critical() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        let mut samples = BusTelemetry::default();
        samples.channels.insert(
            0,
            ChannelTelemetry {
                temp_c: 30.0,
                current_a: 0.2,
                voltage_v: 3.9,
                reported_pwm_us: 0,
            },
        );
        let mut inputs = calm_inputs(&states, &[]);
        inputs.bus_telemetry = Some(&samples);
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::Critical);
    }

    #[test]
    fn test_position_error_grading() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock); // commanded rest = 1700 µs
        let commanded = table().get(JointId(0)).unwrap().rest_pulse_us();
        let mut samples = BusTelemetry::default();
        samples.channels.insert(
            0,
            ChannelTelemetry {
                temp_c: 30.0,
                current_a: 0.2,
                voltage_v: 6.0,
                reported_pwm_us: commanded - 250,
            },
        );
        let mut inputs = calm_inputs(&states, &[]);
        inputs.bus_telemetry = Some(&samples);
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::Low);

        samples.channels.get_mut(&0).unwrap().reported_pwm_us = commanded - 600;
        let mut inputs = calm_inputs(&states, &[]);
        inputs.bus_telemetry = Some(&samples);
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::High);
    }

    #[test]
    fn test_scheduler_watchdog_miss_is_critical() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        let mut inputs = calm_inputs(&states, &[]);
        inputs.scheduler_heartbeat_age_s = 6.0;
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::Critical);
        assert_eq!(
            directive.reason,
            SafetyReason::WatchdogMiss {
                task: "motion_scheduler".into()
            }
        );
    }

    #[test]
    fn test_comm_timeout_is_high() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        let mut inputs = calm_inputs(&states, &[]);
        inputs.telemetry_age_s = 2.5;
        let directive = supervisor.evaluate(&inputs).unwrap();
        assert_eq!(directive.severity, Severity::High);
    }

    #[test]
    fn test_runtime_limit() {
        let (mut supervisor, clock, _channel) = rig();
        let states = rest_states(&clock);
        clock.advance(Duration::from_secs(28_801));
        let directive = supervisor.evaluate(&calm_inputs(&states, &[])).unwrap();
        assert_eq!(directive.severity, Severity::Critical);
        assert!(matches!(
            directive.reason,
            SafetyReason::RuntimeExceeded { .. }
        ));
    }

    #[test]
    fn test_emergency_stop_is_idempotent() {
        let (mut supervisor, _clock, channel) = rig();
        supervisor.emergency_stop();
        assert_eq!(channel.poll().unwrap().severity, Severity::Emergency);
        supervisor.emergency_stop();
        // Second stop changes nothing observable
        assert!(channel.poll().is_none());
        assert!(supervisor.is_emergency_latched());
    }

    #[test]
    fn test_clear_requires_five_calm_seconds() {
        let (mut supervisor, clock, _channel) = rig();
        supervisor.emergency_stop();

        clock.advance(Duration::from_secs(2));
        assert!(supervisor.clear_emergency().is_err());

        clock.advance(Duration::from_secs(4));
        assert!(supervisor.clear_emergency().is_ok());
        assert!(!supervisor.is_emergency_latched());
        assert_eq!(supervisor.severity(), Severity::None);
    }

    #[test]
    fn test_latched_emergency_dominates_calm_field() {
        let (mut supervisor, clock, channel) = rig();
        supervisor.emergency_stop();
        let _ = channel.poll();

        // Field is calm but the latch holds Emergency severity
        let states = rest_states(&clock);
        clock.advance(Duration::from_millis(100));
        supervisor.evaluate(&calm_inputs(&states, &[]));
        assert_eq!(supervisor.severity(), Severity::Emergency);
    }

    #[test]
    fn test_incident_log_records_directives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.jsonl");
        let clock = VirtualClock::new();
        let mut publisher = SafetyPublisher::new();
        let _channel = publisher.subscribe();
        let mut supervisor = SafetySupervisor::new(
            SafetyLimits::default(),
            table(),
            Arc::new(clock.clone()),
            publisher,
        )
        .with_incident_log(IncidentLog::open(&path).unwrap());

        let states = rest_states(&clock);
        let observations = vec![GuestObservation::at_distance(0.4)];
        supervisor
            .evaluate(&calm_inputs(&states, &observations))
            .unwrap();

        let incidents = IncidentLog::read_all(&path).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].severity, Severity::Critical);
    }

    #[test]
    fn test_escalation_reemits_deescalation_is_quiet() {
        let (mut supervisor, clock, channel) = rig();
        let states = rest_states(&clock);

        // Moderate thermal, then the same reading again: one directive
        let mut warm = rest_states(&clock);
        warm[0].temperature_c = 72.0;
        assert!(supervisor.evaluate(&calm_inputs(&warm, &[])).is_some());
        assert!(supervisor.evaluate(&calm_inputs(&warm, &[])).is_none());
        assert_eq!(channel.poll().unwrap().severity, Severity::Moderate);

        // Escalation to Critical emits again
        warm[0].temperature_c = 85.0;
        assert!(supervisor.evaluate(&calm_inputs(&warm, &[])).is_some());
        assert_eq!(channel.poll().unwrap().severity, Severity::Critical);

        // Calm field de-escalates with an all-clear announcement
        let all_clear = supervisor.evaluate(&calm_inputs(&states, &[])).unwrap();
        assert_eq!(all_clear.severity, Severity::None);
        assert_eq!(all_clear.reason, SafetyReason::AllClear);
        assert_eq!(supervisor.severity(), Severity::None);
        assert_eq!(channel.poll().unwrap().severity, Severity::None);

        // Once calm, further passes stay quiet
        assert!(supervisor.evaluate(&calm_inputs(&states, &[])).is_none());
        assert!(channel.poll().is_none());
    }
}

//! Safety model: severities, directives, limits
//!
//! Safety conditions never travel as errors. The supervisor evaluates
//! limits and emits `SafetyDirective`s on the out-of-band channel; the
//! motion loop and the coordinator act on them within the severity's
//! latency budget.

pub mod incident;
pub mod supervisor;
pub mod watchdog;

pub use incident::{Incident, IncidentLog};
pub use supervisor::{SafetyInputs, SafetySupervisor};
pub use watchdog::Watchdog;

use serde::{Deserialize, Serialize};

use crate::core::JointId;

/// Graded severity, lowest to highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Critical,
    Emergency,
}

impl Severity {
    /// Supervisor evaluation rate while at this severity
    pub fn eval_hz(self) -> u32 {
        match self {
            Severity::None => 5,
            Severity::Low => 10,
            Severity::Moderate => 20,
            Severity::High => 50,
            Severity::Critical => 100,
            Severity::Emergency => 200,
        }
    }

    /// Sensor-sample-to-directive latency budget, milliseconds
    pub fn latency_budget_ms(self) -> u64 {
        match self {
            Severity::None | Severity::Low => 500,
            Severity::Moderate => 200,
            Severity::High => 100,
            Severity::Critical => 50,
            Severity::Emergency => 20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::Critical => "Critical",
            Severity::Emergency => "Emergency",
        }
    }
}

/// Why a directive was issued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyReason {
    Thermal { joint: Option<JointId>, temp_c: f64 },
    Overcurrent { joint: Option<JointId>, current_a: f64 },
    VoltageOutOfRange { voltage_v: f64 },
    PositionError { joint: JointId, error_us: u16 },
    GuestProximity { distance_m: f64 },
    ApproachSpeed { speed_mps: f64 },
    CrowdPressure { count: usize },
    CommTimeout { backend: String },
    WatchdogMiss { task: String },
    RuntimeExceeded { elapsed_s: u64 },
    OperatorStop,
    InternalFault { detail: String },
    /// Field has calmed; consumers may release graded restrictions
    AllClear,
}

impl std::fmt::Display for SafetyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thermal { joint, temp_c } => match joint {
                Some(j) => write!(f, "thermal {} at {:.1}°C", j, temp_c),
                None => write!(f, "ambient thermal at {:.1}°C", temp_c),
            },
            Self::Overcurrent { joint, current_a } => match joint {
                Some(j) => write!(f, "overcurrent {} at {:.2}A", j, current_a),
                None => write!(f, "bus overcurrent {:.2}A", current_a),
            },
            Self::VoltageOutOfRange { voltage_v } => write!(f, "voltage {:.2}V", voltage_v),
            Self::PositionError { joint, error_us } => {
                write!(f, "position error {} off by {}µs", joint, error_us)
            }
            Self::GuestProximity { distance_m } => write!(f, "guest at {:.2}m", distance_m),
            Self::ApproachSpeed { speed_mps } => write!(f, "approach {:.1}m/s", speed_mps),
            Self::CrowdPressure { count } => write!(f, "crowd of {}", count),
            Self::CommTimeout { backend } => write!(f, "comm timeout: {}", backend),
            Self::WatchdogMiss { task } => write!(f, "watchdog miss: {}", task),
            Self::RuntimeExceeded { elapsed_s } => write!(f, "runtime {}s exceeded", elapsed_s),
            Self::OperatorStop => write!(f, "operator stop"),
            Self::InternalFault { detail } => write!(f, "internal fault: {}", detail),
            Self::AllClear => write!(f, "all clear"),
        }
    }
}

/// What the directive requires of the scheduler and coordinator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    /// Freeze active timelines; hold position
    Halt,
    /// Narrow the effective range about rest by this factor (0..1)
    Clamp { range_scale: f64 },
    /// Bias posture away from the nearest guest
    BackOff,
    /// Replace active timelines with the precomputed safe-position path
    Retract,
    /// Full lockdown: all joints to rest, audio stopped, alert lighting
    Lockdown,
}

/// Which joints a directive applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectedJoints {
    All,
    Joints(Vec<JointId>),
}

impl AffectedJoints {
    pub fn contains(&self, id: JointId) -> bool {
        match self {
            AffectedJoints::All => true,
            AffectedJoints::Joints(ids) => ids.contains(&id),
        }
    }
}

/// A graded command from the supervisor that preempts normal scheduling
///
/// The most recent highest-severity directive supersedes earlier ones
/// until acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyDirective {
    pub severity: Severity,
    pub reason: SafetyReason,
    pub affected: AffectedJoints,
    pub actions: Vec<RequiredAction>,
    /// Must take effect within this many milliseconds of emission
    pub deadline_ms: u64,
}

impl SafetyDirective {
    pub fn new(severity: Severity, reason: SafetyReason, actions: Vec<RequiredAction>) -> Self {
        Self {
            deadline_ms: severity.latency_budget_ms(),
            severity,
            reason,
            affected: AffectedJoints::All,
            actions,
        }
    }

    pub fn for_joints(mut self, joints: Vec<JointId>) -> Self {
        self.affected = AffectedJoints::Joints(joints);
        self
    }

    /// The Emergency lockdown directive
    pub fn emergency(reason: SafetyReason) -> Self {
        Self::new(
            Severity::Emergency,
            reason,
            vec![RequiredAction::Lockdown],
        )
    }

    /// The Critical hard-halt directive
    pub fn critical(reason: SafetyReason) -> Self {
        Self::new(Severity::Critical, reason, vec![RequiredAction::Halt])
    }

    pub fn requires(&self, action: RequiredAction) -> bool {
        self.actions.contains(&action)
    }

    pub fn is_lockdown(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, RequiredAction::Lockdown))
    }

    pub fn is_halt(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, RequiredAction::Halt | RequiredAction::Lockdown))
    }
}

/// Configurable safety limits with the deployment defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Per-joint temperature warning threshold, °C
    pub temp_warn_c: f64,
    /// Per-joint temperature critical threshold, °C
    pub temp_crit_c: f64,
    /// Per-joint current warning threshold, A
    pub current_warn_a: f64,
    /// Per-joint current critical threshold, A
    pub current_crit_a: f64,
    /// Total bus current limit, A
    pub bus_current_limit_a: f64,
    /// Bus voltage window, V
    pub voltage_min_v: f64,
    pub voltage_max_v: f64,
    /// Below this the bus is critically undervolted, V
    pub voltage_crit_low_v: f64,
    /// Commanded-vs-reported pulse warning threshold, µs
    pub position_error_warn_us: u16,
    /// Commanded-vs-reported pulse critical threshold, µs
    pub position_error_crit_us: u16,
    /// Guest emergency-stop distance, m
    pub emergency_stop_distance_m: f64,
    /// Critical approach speed, m/s
    pub critical_approach_mps: f64,
    /// Maximum continuous operation, seconds (8 h)
    pub max_runtime_s: u64,
    /// Per-backend communication timeout, seconds
    pub comm_timeout_s: f64,
    /// Motion scheduler watchdog timeout, seconds
    pub scheduler_watchdog_s: f64,
    /// Zone-radius multiplier applied to children (< 1 tightens)
    pub child_zone_scale: f64,
    /// Crowd size in the Social zone that raises High severity
    pub crowd_pressure_limit: usize,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            temp_warn_c: 70.0,
            temp_crit_c: 80.0,
            current_warn_a: 1.5,
            current_crit_a: 2.0,
            bus_current_limit_a: 15.0,
            voltage_min_v: 4.5,
            voltage_max_v: 7.5,
            voltage_crit_low_v: 4.0,
            position_error_warn_us: 200,
            position_error_crit_us: 500,
            emergency_stop_distance_m: 0.25,
            critical_approach_mps: 2.0,
            max_runtime_s: 28_800,
            comm_timeout_s: 2.0,
            scheduler_watchdog_s: 5.0,
            child_zone_scale: 0.8,
            crowd_pressure_limit: 12,
        }
    }
}

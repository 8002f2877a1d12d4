//! Joint model
//!
//! A joint is one controllable degree of freedom (one servo channel).
//! `JointConfig` is immutable after config load; `JointState` is owned by
//! the motion scheduler and published as read-only snapshots each tick.
//!
//! String joint names exist only in the config file and in logs. At load
//! time every joint gets a dense integer `JointId` used on all hot paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::{ChoreoError, ChoreoResult};

/// Dense integer identifier for one degree of freedom
///
/// Allocated sequentially at config load. Indexes directly into the joint
/// table and per-joint state vectors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct JointId(pub u16);

impl JointId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

/// Immutable per-joint configuration
///
/// Loaded once at startup and shared read-only across all tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointConfig {
    /// Human-readable name, kept for logging and telemetry only
    pub name: String,
    /// PWM controller channel this joint is wired to
    pub bus_channel: u8,
    /// Minimum angle in degrees
    pub min_deg: f64,
    /// Maximum angle in degrees
    pub max_deg: f64,
    /// Rest/neutral position in degrees
    pub rest_deg: f64,
    /// Maximum angular velocity in degrees/second
    pub max_velocity: f64,
    /// Maximum angular acceleration in degrees/second²
    pub max_acceleration: f64,
    /// Pulse width at `min_deg`, microseconds
    #[serde(default = "default_pwm_min")]
    pub pwm_min_us: u16,
    /// Pulse width at `max_deg`, microseconds
    #[serde(default = "default_pwm_max")]
    pub pwm_max_us: u16,
    /// Invert direction
    #[serde(default)]
    pub invert: bool,
    /// Trim adjustment in degrees, added before PWM conversion
    #[serde(default)]
    pub trim_deg: f64,
}

fn default_pwm_min() -> u16 {
    500
}

fn default_pwm_max() -> u16 {
    2500
}

impl JointConfig {
    /// Validate invariants: `min ≤ rest ≤ max`, positive velocity limit
    pub fn validate(&self) -> ChoreoResult<()> {
        if !self.min_deg.is_finite() || !self.max_deg.is_finite() || !self.rest_deg.is_finite() {
            return Err(ChoreoError::config(format!(
                "joint '{}': non-finite range",
                self.name
            )));
        }
        if self.min_deg > self.max_deg {
            return Err(ChoreoError::config(format!(
                "joint '{}': min {} > max {}",
                self.name, self.min_deg, self.max_deg
            )));
        }
        if self.rest_deg < self.min_deg || self.rest_deg > self.max_deg {
            return Err(ChoreoError::config(format!(
                "joint '{}': rest {} outside [{}, {}]",
                self.name, self.rest_deg, self.min_deg, self.max_deg
            )));
        }
        if !(self.max_velocity > 0.0) {
            return Err(ChoreoError::config(format!(
                "joint '{}': max_velocity must be > 0",
                self.name
            )));
        }
        if !(self.max_acceleration > 0.0) {
            return Err(ChoreoError::config(format!(
                "joint '{}': max_acceleration must be > 0",
                self.name
            )));
        }
        if self.pwm_min_us >= self.pwm_max_us {
            return Err(ChoreoError::config(format!(
                "joint '{}': pwm_min_us {} >= pwm_max_us {}",
                self.name, self.pwm_min_us, self.pwm_max_us
            )));
        }
        Ok(())
    }

    /// Full travel in degrees
    pub fn range_span(&self) -> f64 {
        self.max_deg - self.min_deg
    }

    /// Clamp an angle into this joint's range
    pub fn clamp(&self, angle_deg: f64) -> f64 {
        angle_deg.clamp(self.min_deg, self.max_deg)
    }

    /// Whether an angle lies within this joint's range
    pub fn contains(&self, angle_deg: f64) -> bool {
        angle_deg >= self.min_deg && angle_deg <= self.max_deg
    }

    /// Convert a (clamped) angle to a PWM pulse width, applying trim and invert
    pub fn angle_to_pulse_us(&self, angle_deg: f64) -> u16 {
        let mut angle = self.clamp(angle_deg + self.trim_deg);
        if self.invert {
            angle = self.max_deg - (angle - self.min_deg);
        }
        let span = self.range_span();
        let normalized = if span > 0.0 {
            (angle - self.min_deg) / span
        } else {
            0.5
        };
        let pulse_range = (self.pwm_max_us - self.pwm_min_us) as f64;
        self.pwm_min_us + (normalized * pulse_range).round() as u16
    }

    /// Rest position as a pulse width, for the watchdog's minimal path
    pub fn rest_pulse_us(&self) -> u16 {
        self.angle_to_pulse_us(self.rest_deg)
    }
}

/// The immutable joint table built at config load
#[derive(Debug, Clone, Default)]
pub struct JointTable {
    configs: Vec<JointConfig>,
}

impl JointTable {
    /// Build and validate the table; ids are assigned in input order
    pub fn new(configs: Vec<JointConfig>) -> ChoreoResult<Self> {
        if configs.len() > u16::MAX as usize {
            return Err(ChoreoError::config("too many joints"));
        }
        for config in &configs {
            config.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for config in &configs {
            if !seen.insert(config.name.as_str()) {
                return Err(ChoreoError::config(format!(
                    "duplicate joint name '{}'",
                    config.name
                )));
            }
        }
        Ok(Self { configs })
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Look up a joint by dense id
    pub fn get(&self, id: JointId) -> Option<&JointConfig> {
        self.configs.get(id.index())
    }

    /// Look up a joint by dense id, erroring with its printable id
    pub fn config(&self, id: JointId) -> ChoreoResult<&JointConfig> {
        self.get(id)
            .ok_or_else(|| ChoreoError::UnknownJoint(id.to_string()))
    }

    /// Resolve a config-file name to its dense id
    pub fn id_by_name(&self, name: &str) -> ChoreoResult<JointId> {
        self.configs
            .iter()
            .position(|c| c.name == name)
            .map(|i| JointId(i as u16))
            .ok_or_else(|| ChoreoError::UnknownJoint(name.to_string()))
    }

    /// Printable name for logs; falls back to the numeric id
    pub fn name(&self, id: JointId) -> String {
        self.get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn ids(&self) -> impl Iterator<Item = JointId> + '_ {
        (0..self.configs.len()).map(|i| JointId(i as u16))
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &JointConfig)> {
        self.configs
            .iter()
            .enumerate()
            .map(|(i, c)| (JointId(i as u16), c))
    }
}

/// Fault kinds that disable a joint from commanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// Persistent servo bus write failure (after one retry)
    BusError,
    /// Telemetry reports the device missing
    DeviceAbsent,
    /// Commanded vs reported pulse diverged past the critical threshold
    PositionError,
    /// Thermal shutdown of this joint
    Overtemperature,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusError => write!(f, "BusError"),
            Self::DeviceAbsent => write!(f, "DeviceAbsent"),
            Self::PositionError => write!(f, "PositionError"),
            Self::Overtemperature => write!(f, "Overtemperature"),
        }
    }
}

/// Runtime state of one joint
///
/// Mutated by the motion scheduler only; everyone else reads snapshots.
#[derive(Debug, Clone)]
pub struct JointState {
    pub current_deg: f64,
    pub target_deg: f64,
    pub velocity_dps: f64,
    pub temperature_c: f64,
    pub current_a: f64,
    pub last_commanded_deg: f64,
    pub last_update: Instant,
    pub in_motion: bool,
    pub fault: Option<FaultKind>,
}

impl JointState {
    /// Initial state: at rest, no fault
    pub fn at_rest(config: &JointConfig, now: Instant) -> Self {
        Self {
            current_deg: config.rest_deg,
            target_deg: config.rest_deg,
            velocity_dps: 0.0,
            temperature_c: 25.0,
            current_a: 0.0,
            last_commanded_deg: config.rest_deg,
            last_update: now,
            in_motion: false,
            fault: None,
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_pitch() -> JointConfig {
        JointConfig {
            name: "head_pitch".into(),
            bus_channel: 0,
            min_deg: -45.0,
            max_deg: 30.0,
            rest_deg: 0.0,
            max_velocity: 120.0,
            max_acceleration: 360.0,
            pwm_min_us: 500,
            pwm_max_us: 2500,
            invert: false,
            trim_deg: 0.0,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(head_pitch().validate().is_ok());

        let mut bad = head_pitch();
        bad.rest_deg = 90.0;
        assert!(bad.validate().is_err());

        let mut bad = head_pitch();
        bad.max_velocity = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = head_pitch();
        bad.min_deg = 50.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_angle_to_pulse_endpoints() {
        let config = head_pitch();
        assert_eq!(config.angle_to_pulse_us(-45.0), 500);
        assert_eq!(config.angle_to_pulse_us(30.0), 2500);
        // rest at 0° sits 45/75 of the way through the range
        let rest = config.angle_to_pulse_us(0.0);
        assert_eq!(rest, 500 + (2000.0_f64 * 45.0 / 75.0).round() as u16);
    }

    #[test]
    fn test_angle_to_pulse_invert_mirrors() {
        let mut config = head_pitch();
        config.invert = true;
        assert_eq!(config.angle_to_pulse_us(-45.0), 2500);
        assert_eq!(config.angle_to_pulse_us(30.0), 500);
    }

    #[test]
    fn test_angle_to_pulse_clamps_out_of_range() {
        let config = head_pitch();
        assert_eq!(config.angle_to_pulse_us(999.0), 2500);
        assert_eq!(config.angle_to_pulse_us(-999.0), 500);
    }

    #[test]
    fn test_joint_table_lookup() {
        let mut dome = head_pitch();
        dome.name = "dome_rotation".into();
        dome.bus_channel = 1;
        let table = JointTable::new(vec![head_pitch(), dome]).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.id_by_name("dome_rotation").unwrap(), JointId(1));
        assert_eq!(table.name(JointId(0)), "head_pitch");
        assert!(table.id_by_name("nonexistent").is_err());
    }

    #[test]
    fn test_joint_table_rejects_duplicates() {
        let result = JointTable::new(vec![head_pitch(), head_pitch()]);
        assert!(result.is_err());
    }
}

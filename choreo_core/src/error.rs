//! Unified error handling for CHOREO
//!
//! One error type for the whole kernel. Validation errors are surfaced to
//! the caller with no state change; transient bus errors are retried at the
//! call site; safety conditions never travel as errors (they are directives
//! on the safety channel).

use thiserror::Error;

/// Main error type for CHOREO operations
#[derive(Debug, Error)]
pub enum ChoreoError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced joint is not in the joint table
    #[error("Unknown joint: {0}")]
    UnknownJoint(String),

    /// Referenced sequence is not in the sequence library
    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),

    /// Referenced experience is not in the experience catalog
    #[error("Unknown experience: {0}")]
    UnknownExperience(String),

    /// A keyframe target lies outside the joint's configured range
    #[error("Joint '{joint}' target {angle_deg}° outside range [{min_deg}°, {max_deg}°]")]
    OutOfRange {
        joint: String,
        angle_deg: f64,
        min_deg: f64,
        max_deg: f64,
    },

    /// A keyframe implies velocity or acceleration beyond the joint's limits
    #[error("Kinematically infeasible motion on joint '{joint}': {detail}")]
    KinematicInfeasible { joint: String, detail: String },

    /// Invalid easing curve parameters (rejected at construction)
    #[error("Invalid curve parameters: {0}")]
    CurveParam(String),

    /// Keyframe or timeline shape errors (empty timeline, zero duration, bad priority)
    #[error("Invalid keyframe: {0}")]
    InvalidKeyframe(String),

    /// Servo bus write or telemetry failure
    #[error("Servo bus error: {0}")]
    Bus(String),

    /// Servo bus operation exceeded its per-call deadline
    #[error("Servo bus timeout: {0}")]
    BusTimeout(String),

    /// Addressed device is not present on the bus
    #[error("Device absent: {0}")]
    DeviceAbsent(String),

    /// Audio backend errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Lighting backend errors
    #[error("Light error: {0}")]
    Light(String),

    /// A joint is faulted and excluded from commanding until cleared
    #[error("Joint '{joint}' faulted: {kind}")]
    JointFault { joint: String, kind: String },

    /// Experience trigger rejected (preconditions, lockdown, conflicts)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Emergency clear refused
    #[error("Emergency clear refused: {0}")]
    ClearRefused(String),

    /// Invariant violations (bugs); escalate to Emergency
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using ChoreoError
pub type ChoreoResult<T> = Result<T, ChoreoError>;

impl From<serde_json::Error> for ChoreoError {
    fn from(err: serde_json::Error) -> Self {
        ChoreoError::Config(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for ChoreoError {
    fn from(err: toml::de::Error) -> Self {
        ChoreoError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ChoreoError {
    fn from(err: toml::ser::Error) -> Self {
        ChoreoError::Config(format!("TOML serialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for ChoreoError {
    fn from(err: serde_yaml::Error) -> Self {
        ChoreoError::Config(format!("YAML error: {}", err))
    }
}

// Helper methods
impl ChoreoError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        ChoreoError::Config(msg.into())
    }

    /// Create a servo bus error
    pub fn bus<S: Into<String>>(msg: S) -> Self {
        ChoreoError::Bus(msg.into())
    }

    /// Create a curve parameter error
    pub fn curve<S: Into<String>>(msg: S) -> Self {
        ChoreoError::CurveParam(msg.into())
    }

    /// Create a rejection with reason
    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        ChoreoError::Rejected(reason.into())
    }

    /// Create an internal (invariant violation) error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ChoreoError::Internal(msg.into())
    }

    /// Check if this is a validation error (input rejected, no state change)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChoreoError::UnknownJoint(_)
                | ChoreoError::UnknownSequence(_)
                | ChoreoError::UnknownExperience(_)
                | ChoreoError::OutOfRange { .. }
                | ChoreoError::KinematicInfeasible { .. }
                | ChoreoError::CurveParam(_)
                | ChoreoError::InvalidKeyframe(_)
        )
    }

    /// Check if this is a transient bus error (eligible for one retry)
    pub fn is_transient(&self) -> bool {
        matches!(self, ChoreoError::Bus(_) | ChoreoError::BusTimeout(_))
    }

    /// Check if this error must escalate to an Emergency directive
    pub fn is_internal(&self) -> bool {
        matches!(self, ChoreoError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ChoreoError::UnknownJoint("head".into()).is_validation());
        assert!(ChoreoError::CurveParam("NaN power".into()).is_validation());
        assert!(ChoreoError::Bus("write failed".into()).is_transient());
        assert!(ChoreoError::BusTimeout("5ms exceeded".into()).is_transient());
        assert!(ChoreoError::Internal("bad segment index".into()).is_internal());
        assert!(!ChoreoError::Bus("x".into()).is_validation());
    }

    #[test]
    fn test_out_of_range_display() {
        let err = ChoreoError::OutOfRange {
            joint: "head_pitch".into(),
            angle_deg: 45.0,
            min_deg: -45.0,
            max_deg: 30.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("head_pitch"));
        assert!(msg.contains("45"));
    }
}

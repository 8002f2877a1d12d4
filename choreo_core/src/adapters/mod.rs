//! External adapter contracts
//!
//! Thin seams between the kernel and the outside world: the servo bus,
//! the audio player, the light bus, and the guest observer. Backends live
//! in `choreo_library` (simulation always, hardware feature-gated); the
//! kernel only ever sees these traits.
//!
//! The injected monotonic clock lives in [`crate::core::clock`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::GuestObservation;
use crate::error::ChoreoResult;

/// Adapter lifecycle status
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AdapterStatus {
    #[default]
    Uninitialized,
    Ready,
    Running,
    Error(String),
    Shutdown,
}

impl fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::Error(msg) => write!(f, "Error: {}", msg),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Per-channel servo telemetry sample
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelTelemetry {
    pub temp_c: f64,
    pub current_a: f64,
    pub voltage_v: f64,
    /// Pulse the controller reports actually driving, microseconds
    pub reported_pwm_us: u16,
}

/// Telemetry for every channel the bus knows about, polled at ≥ 10 Hz
#[derive(Debug, Clone, Default)]
pub struct BusTelemetry {
    pub channels: HashMap<u8, ChannelTelemetry>,
}

impl BusTelemetry {
    /// Sum of per-channel currents, amps
    pub fn total_current_a(&self) -> f64 {
        self.channels.values().map(|c| c.current_a).sum()
    }
}

/// PWM servo bus
///
/// `write` must complete or fail within 5 ms; the motion loop retries a
/// failed write once on the next tick before faulting the joint.
pub trait ServoBus: Send {
    /// Command one channel to a pulse width in microseconds
    fn write(&mut self, channel: u8, pwm_us: u16) -> ChoreoResult<()>;

    /// Latest telemetry snapshot for all channels
    fn telemetry(&mut self) -> ChoreoResult<BusTelemetry>;
}

/// Opaque handle to one playing audio clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayHandle(pub u64);

/// Audio playback backend; decode and DSP are out of scope
pub trait AudioPlayer: Send {
    /// Start a clip at the given volume (0..1)
    fn play(&mut self, clip_id: &str, volume: f64) -> ChoreoResult<PlayHandle>;

    /// Linear fade-out over `ms` milliseconds, then stop
    fn fade(&mut self, handle: PlayHandle, ms: u64) -> ChoreoResult<()>;

    /// Stop everything immediately
    fn stop_all(&mut self) -> ChoreoResult<()>;

    /// Playback position for sync checks, milliseconds into the clip
    fn position_ms(&mut self, handle: PlayHandle) -> ChoreoResult<u64>;
}

/// Lighting pattern selection; no readback required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LightPattern {
    /// Safe fallback used on preemption
    #[default]
    Neutral,
    Steady,
    Pulse,
    Chase,
    Sparkle,
    /// Emergency alert pattern
    Alert,
}

/// LED/GPIO lighting backend
pub trait LightBus: Send {
    /// Apply a pattern to a named zone at the given intensity (0..1)
    fn set(&mut self, zone: &str, pattern: LightPattern, intensity: f64) -> ChoreoResult<()>;
}

/// Guest detection stream (vision + proximity), updating at ≥ 10 Hz
pub trait GuestObserver: Send {
    /// Drain observations produced since the last poll
    fn poll(&mut self) -> Vec<GuestObservation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_telemetry_total_current() {
        let mut telemetry = BusTelemetry::default();
        telemetry.channels.insert(
            0,
            ChannelTelemetry {
                current_a: 0.5,
                ..Default::default()
            },
        );
        telemetry.channels.insert(
            1,
            ChannelTelemetry {
                current_a: 1.25,
                ..Default::default()
            },
        );
        assert!((telemetry.total_current_a() - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_adapter_status_display() {
        assert_eq!(AdapterStatus::Ready.to_string(), "Ready");
        assert_eq!(
            AdapterStatus::Error("bus gone".into()).to_string(),
            "Error: bus gone"
        );
    }
}

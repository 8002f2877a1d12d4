//! Simulation servo bus
//!
//! Always available. Accepts every write, mirrors the commanded pulse back
//! as reported position, and synthesizes plausible thermal and electrical
//! telemetry: motors warm up while they move and cool toward ambient when
//! they rest. Fault injection hooks let tests exercise the scheduler's
//! retry path and the supervisor's limits.

use rand::Rng;
use std::collections::HashMap;

use choreo_core::adapters::{AdapterStatus, BusTelemetry, ChannelTelemetry, ServoBus};
use choreo_core::error::{ChoreoError, ChoreoResult};

const AMBIENT_C: f64 = 25.0;
const NOMINAL_V: f64 = 6.0;
/// Idle draw per powered channel, amps
const IDLE_CURRENT_A: f64 = 0.12;
/// Extra amps per 100 µs of pulse change in one write
const LOAD_CURRENT_PER_100US: f64 = 0.35;
/// Degrees C gained per amp-write
const HEAT_PER_AMP: f64 = 0.02;
/// Fraction of excess-over-ambient shed per telemetry poll
const COOLING_RATE: f64 = 0.01;

struct SimChannel {
    commanded_us: u16,
    temp_c: f64,
    current_a: f64,
}

impl Default for SimChannel {
    fn default() -> Self {
        Self {
            commanded_us: 1500,
            temp_c: AMBIENT_C,
            current_a: IDLE_CURRENT_A,
        }
    }
}

/// Simulated PWM servo bus
pub struct SimulationServoBus {
    status: AdapterStatus,
    channels: HashMap<u8, SimChannel>,
    /// Writes left to fail, for retry-path tests
    fail_writes: u32,
    /// Fixed voltage reported on every channel
    voltage_v: f64,
    /// Extra pulse offset applied to reported positions
    reported_skew_us: i32,
}

impl SimulationServoBus {
    pub fn new() -> Self {
        Self {
            status: AdapterStatus::Ready,
            channels: HashMap::new(),
            fail_writes: 0,
            voltage_v: NOMINAL_V,
            reported_skew_us: 0,
        }
    }

    /// Make the next `count` writes fail with a bus error
    pub fn fail_next_writes(&mut self, count: u32) {
        self.fail_writes = count;
    }

    /// Report this supply voltage in telemetry (brown-out tests)
    pub fn set_voltage(&mut self, voltage_v: f64) {
        self.voltage_v = voltage_v;
    }

    /// Skew reported positions from commanded (position-error tests)
    pub fn set_reported_skew_us(&mut self, skew_us: i32) {
        self.reported_skew_us = skew_us;
    }

    /// Force a channel's temperature (thermal tests)
    pub fn set_temperature(&mut self, channel: u8, temp_c: f64) {
        self.channels.entry(channel).or_default().temp_c = temp_c;
    }

    pub fn status(&self) -> AdapterStatus {
        self.status.clone()
    }

    /// Last commanded pulse for a channel
    pub fn commanded_us(&self, channel: u8) -> Option<u16> {
        self.channels.get(&channel).map(|c| c.commanded_us)
    }
}

impl Default for SimulationServoBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ServoBus for SimulationServoBus {
    fn write(&mut self, channel: u8, pwm_us: u16) -> ChoreoResult<()> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(ChoreoError::bus("simulated write failure"));
        }
        let state = self.channels.entry(channel).or_default();
        let delta_us = state.commanded_us.abs_diff(pwm_us) as f64;
        state.current_a = IDLE_CURRENT_A + LOAD_CURRENT_PER_100US * delta_us / 100.0;
        state.temp_c += HEAT_PER_AMP * state.current_a;
        state.commanded_us = pwm_us;
        self.status = AdapterStatus::Running;
        Ok(())
    }

    fn telemetry(&mut self) -> ChoreoResult<BusTelemetry> {
        let mut rng = rand::thread_rng();
        let mut samples = BusTelemetry::default();
        for (&channel, state) in &mut self.channels {
            state.temp_c -= (state.temp_c - AMBIENT_C) * COOLING_RATE;
            // Current relaxes toward idle between writes
            state.current_a = IDLE_CURRENT_A + (state.current_a - IDLE_CURRENT_A) * 0.8;
            let reported = (state.commanded_us as i32 + self.reported_skew_us).max(0) as u16;
            samples.channels.insert(
                channel,
                ChannelTelemetry {
                    // Sensor noise, the way a real sense board reads
                    temp_c: state.temp_c + rng.gen_range(-0.05..0.05),
                    current_a: (state.current_a + rng.gen_range(-0.005..0.005)).max(0.0),
                    voltage_v: self.voltage_v,
                    reported_pwm_us: reported,
                },
            );
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_telemetry_reflects_command() {
        let mut bus = SimulationServoBus::new();
        bus.write(0, 1800).unwrap();
        let samples = bus.telemetry().unwrap();
        assert_eq!(samples.channels[&0].reported_pwm_us, 1800);
        assert!(samples.channels[&0].current_a > IDLE_CURRENT_A);
    }

    #[test]
    fn test_injected_failures_then_recovery() {
        let mut bus = SimulationServoBus::new();
        bus.fail_next_writes(2);
        assert!(bus.write(0, 1500).is_err());
        assert!(bus.write(0, 1500).is_err());
        assert!(bus.write(0, 1500).is_ok());
    }

    #[test]
    fn test_motors_heat_under_load_and_cool_at_rest() {
        let mut bus = SimulationServoBus::new();
        for pulse in [1500u16, 2000, 1500, 2000, 1500, 2000] {
            bus.write(3, pulse).unwrap();
        }
        let hot = bus.telemetry().unwrap().channels[&3].temp_c;
        assert!(hot > AMBIENT_C);

        for _ in 0..200 {
            bus.telemetry().unwrap();
        }
        let cooled = bus.telemetry().unwrap().channels[&3].temp_c;
        assert!(cooled < hot);
    }

    #[test]
    fn test_reported_skew_for_position_error() {
        let mut bus = SimulationServoBus::new();
        bus.write(0, 1500).unwrap();
        bus.set_reported_skew_us(-600);
        let samples = bus.telemetry().unwrap();
        assert_eq!(samples.channels[&0].reported_pwm_us, 900);
    }
}

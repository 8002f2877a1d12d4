//! PCA9685 servo bus
//!
//! 16-channel PWM controller over I2C. Requires the `i2c-hardware`
//! feature. Reported telemetry is limited to echoing the commanded pulse;
//! the PCA9685 has no thermal or current sensing of its own, so those
//! fields come back zeroed and deployments wire a separate sense board.

use std::collections::HashMap;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use choreo_core::adapters::{AdapterStatus, BusTelemetry, ChannelTelemetry, ServoBus};
use choreo_core::error::{ChoreoError, ChoreoResult};

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;
const OSC_HZ: f64 = 25_000_000.0;

/// PCA9685 configuration
#[derive(Debug, Clone)]
pub struct Pca9685Config {
    /// I2C device path
    pub i2c_device: String,
    /// I2C address (default 0x40)
    pub address: u16,
    /// PWM frequency in Hz (50 Hz for servos)
    pub frequency_hz: u16,
}

impl Default for Pca9685Config {
    fn default() -> Self {
        Self {
            i2c_device: "/dev/i2c-1".to_string(),
            address: 0x40,
            frequency_hz: 50,
        }
    }
}

/// PCA9685 16-channel servo bus
pub struct Pca9685ServoBus {
    config: Pca9685Config,
    device: LinuxI2CDevice,
    status: AdapterStatus,
    commanded_us: HashMap<u8, u16>,
}

impl Pca9685ServoBus {
    /// Open and configure the controller
    pub fn new(config: Pca9685Config) -> ChoreoResult<Self> {
        let mut device = LinuxI2CDevice::new(&config.i2c_device, config.address)
            .map_err(|e| ChoreoError::bus(format!("open {}: {}", config.i2c_device, e)))?;

        // Sleep, set prescale for the target frame rate, wake, auto-increment
        let prescale = (OSC_HZ / (4096.0 * config.frequency_hz as f64) - 1.0).round() as u8;
        device
            .smbus_write_byte_data(MODE1, 0x10)
            .and_then(|_| device.smbus_write_byte_data(PRESCALE, prescale))
            .and_then(|_| device.smbus_write_byte_data(MODE1, 0x20))
            .map_err(|e| ChoreoError::bus(format!("pca9685 init: {}", e)))?;

        Ok(Self {
            config,
            device,
            status: AdapterStatus::Ready,
            commanded_us: HashMap::new(),
        })
    }

    pub fn status(&self) -> AdapterStatus {
        self.status.clone()
    }

    fn off_ticks(&self, pwm_us: u16) -> u16 {
        let period_us = 1_000_000.0 / self.config.frequency_hz as f64;
        ((pwm_us as f64 / period_us) * 4096.0).round() as u16 & 0x0FFF
    }
}

impl ServoBus for Pca9685ServoBus {
    fn write(&mut self, channel: u8, pwm_us: u16) -> ChoreoResult<()> {
        if channel >= 16 {
            return Err(ChoreoError::DeviceAbsent(format!(
                "pca9685 channel {} (0-15)",
                channel
            )));
        }
        let off = self.off_ticks(pwm_us);
        let base = LED0_ON_L + 4 * channel;
        let frame = [0u8, 0u8, (off & 0xFF) as u8, (off >> 8) as u8];
        for (offset, byte) in frame.iter().enumerate() {
            self.device
                .smbus_write_byte_data(base + offset as u8, *byte)
                .map_err(|e| {
                    self.status = AdapterStatus::Error(e.to_string());
                    ChoreoError::bus(format!("pca9685 write ch{}: {}", channel, e))
                })?;
        }
        self.status = AdapterStatus::Running;
        self.commanded_us.insert(channel, pwm_us);
        Ok(())
    }

    fn telemetry(&mut self) -> ChoreoResult<BusTelemetry> {
        let mut samples = BusTelemetry::default();
        for (&channel, &pulse) in &self.commanded_us {
            samples.channels.insert(
                channel,
                ChannelTelemetry {
                    temp_c: 0.0,
                    current_a: 0.0,
                    voltage_v: 0.0,
                    reported_pwm_us: pulse,
                },
            );
        }
        Ok(samples)
    }
}

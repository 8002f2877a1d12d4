//! Independent watchdog
//!
//! Highest-priority task with a deliberately minimal code path: it watches
//! the safety supervisor's heartbeat counter, and if the supervisor goes
//! quiet for the timeout it commands every joint straight to its rest
//! pulse, bypassing the scheduler entirely.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::ServoBus;
use crate::core::JointTable;

/// Watches one heartbeat counter for staleness
pub struct Watchdog {
    heartbeat: Arc<AtomicU64>,
    timeout: Duration,
    last_value: u64,
    last_change: Instant,
    tripped: bool,
}

impl Watchdog {
    pub fn new(heartbeat: Arc<AtomicU64>, timeout: Duration, now: Instant) -> Self {
        let last_value = heartbeat.load(Ordering::Relaxed);
        Self {
            heartbeat,
            timeout,
            last_value,
            last_change: now,
            tripped: false,
        }
    }

    /// Default supervisor watchdog: 5 s
    pub fn supervisor_default(heartbeat: Arc<AtomicU64>, now: Instant) -> Self {
        Self::new(heartbeat, Duration::from_secs(5), now)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Returns true while the heartbeat is fresh; latches tripped on expiry
    pub fn check(&mut self, now: Instant) -> bool {
        let value = self.heartbeat.load(Ordering::Relaxed);
        if value != self.last_value {
            self.last_value = value;
            self.last_change = now;
        }
        if now.saturating_duration_since(self.last_change) > self.timeout {
            self.tripped = true;
        }
        !self.tripped
    }

    /// Re-arm after the stalled task has been recovered
    pub fn reset(&mut self, now: Instant) {
        self.tripped = false;
        self.last_value = self.heartbeat.load(Ordering::Relaxed);
        self.last_change = now;
    }

    /// The minimal forced-rest path: write every joint's rest pulse
    ///
    /// Failures are ignored on purpose; there is nothing left to degrade to.
    pub fn force_rest(bus: &Mutex<Box<dyn ServoBus>>, table: &JointTable) {
        let mut bus = bus.lock();
        for (_, config) in table.iter() {
            let _ = bus.write(config.bus_channel, config.rest_pulse_us());
        }
    }
}

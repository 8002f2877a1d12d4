//! Injected monotonic clock
//!
//! Every component reads time through the `Clock` trait so tests can drive
//! the whole kernel on a virtual timebase. Production uses `MonotonicClock`
//! (std `Instant`, never wall clock).

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;
}

/// Production clock backed by `std::time::Instant`
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual clock for deterministic tests
///
/// Starts at an arbitrary epoch and only moves when `advance` is called.
#[derive(Clone)]
pub struct VirtualClock {
    inner: Arc<Mutex<VirtualClockInner>>,
}

struct VirtualClockInner {
    epoch: Instant,
    elapsed: Duration,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VirtualClockInner {
                epoch: Instant::now(),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Move virtual time forward
    pub fn advance(&self, by: Duration) {
        self.inner.lock().elapsed += by;
    }

    /// Move virtual time forward by fractional seconds
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    /// Seconds elapsed since the clock was created
    pub fn elapsed_secs(&self) -> f64 {
        self.inner.lock().elapsed.as_secs_f64()
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        let inner = self.inner.lock();
        inner.epoch + inner.elapsed
    }
}

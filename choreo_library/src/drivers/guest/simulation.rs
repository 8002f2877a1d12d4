//! Scripted guest observer
//!
//! Plays back a script of observations against the injected clock: each
//! entry becomes visible once its time arrives and is delivered on the
//! next poll. Tests also push observations directly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use choreo_core::adapters::GuestObserver;
use choreo_core::core::{Clock, GuestObservation};

struct ScriptEntry {
    due: Instant,
    observation: GuestObservation,
}

/// Shared handle for feeding a running observer from a test
#[derive(Clone)]
pub struct GuestScript {
    inner: Arc<Mutex<VecDeque<ScriptEntry>>>,
    clock: Arc<dyn Clock>,
}

impl GuestScript {
    /// Deliver an observation on the next poll
    pub fn push_now(&self, observation: GuestObservation) {
        self.push_in(Duration::ZERO, observation);
    }

    /// Deliver an observation once `delay` has elapsed
    pub fn push_in(&self, delay: Duration, observation: GuestObservation) {
        self.inner.lock().push_back(ScriptEntry {
            due: self.clock.now() + delay,
            observation,
        });
    }
}

/// Simulated guest detection stream
pub struct ScriptedGuestObserver {
    clock: Arc<dyn Clock>,
    script: GuestScript,
}

impl ScriptedGuestObserver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let script = GuestScript {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            clock: clock.clone(),
        };
        Self { clock, script }
    }

    /// Handle for pushing observations while the observer is owned elsewhere
    pub fn script(&self) -> GuestScript {
        self.script.clone()
    }
}

impl GuestObserver for ScriptedGuestObserver {
    fn poll(&mut self) -> Vec<GuestObservation> {
        let now = self.clock.now();
        let mut queue = self.script.inner.lock();
        let mut due = Vec::new();
        while let Some(entry) = queue.front() {
            if entry.due <= now {
                due.push(queue.pop_front().unwrap().observation);
            } else {
                break;
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_core::core::VirtualClock;

    #[test]
    fn test_scripted_entries_arrive_on_time() {
        let clock = VirtualClock::new();
        let mut observer = ScriptedGuestObserver::new(Arc::new(clock.clone()));
        let script = observer.script();

        script.push_now(GuestObservation::at_distance(3.0));
        script.push_in(
            Duration::from_millis(500),
            GuestObservation::at_distance(1.0),
        );

        let first = observer.poll();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].distance_m, 3.0);
        assert!(observer.poll().is_empty());

        clock.advance(Duration::from_millis(600));
        let second = observer.poll();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].distance_m, 1.0);
    }
}

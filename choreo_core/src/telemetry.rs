//! Process-wide telemetry ring
//!
//! A single append-only ring buffer of kernel events (clamps, sync
//! violations, drops, faults, rejections), initialized once at startup.
//! Writers push from any task; the control surface reads snapshots. These
//! are derived metrics, not placeholders: clamp rate, tick jitter and
//! sync skew come from what actually happened.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{FaultKind, JointId};
use crate::safety::Severity;

const RING_CAPACITY: usize = 4096;

/// One telemetry event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum TelemetryEvent {
    /// A commanded angle was outside the joint range and got clamped
    Clamped {
        joint: JointId,
        requested_deg: f64,
        clamped_deg: f64,
    },
    /// An element started outside its sync tolerance
    SyncViolation {
        element: String,
        skew_ms: f64,
        tolerance_ms: f64,
        compensated: bool,
    },
    /// Bounded channel overflowed and shed its oldest messages
    DroppedMessages { channel: String, count: u64 },
    /// A motion tick ran more than one period late and skipped ahead
    TickOverrun { late_us: u64 },
    /// A safety directive was issued
    DirectiveIssued { severity: Severity, reason: String },
    /// A joint was faulted and excluded from commanding
    JointFaulted { joint: JointId, kind: FaultKind },
    /// A control request was rejected
    Rejected { what: String, reason: String },
}

/// Rolled-up counters derived from recorded events
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TelemetryCounters {
    pub clamp_events: u64,
    pub sync_violations: u64,
    pub dropped_messages: u64,
    pub tick_overruns: u64,
    pub directives: u64,
    pub joint_faults: u64,
    pub rejections: u64,
}

/// Append-only ring of recent events plus monotonic counters
pub struct TelemetryRing {
    events: Mutex<VecDeque<TelemetryEvent>>,
    clamp_events: AtomicU64,
    sync_violations: AtomicU64,
    dropped_messages: AtomicU64,
    tick_overruns: AtomicU64,
    directives: AtomicU64,
    joint_faults: AtomicU64,
    rejections: AtomicU64,
}

impl TelemetryRing {
    fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            clamp_events: AtomicU64::new(0),
            sync_violations: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            tick_overruns: AtomicU64::new(0),
            directives: AtomicU64::new(0),
            joint_faults: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Record an event, shedding the oldest when the ring is full
    pub fn record(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::Clamped { .. } => &self.clamp_events,
            TelemetryEvent::SyncViolation { .. } => &self.sync_violations,
            TelemetryEvent::DroppedMessages { .. } => &self.dropped_messages,
            TelemetryEvent::TickOverrun { .. } => &self.tick_overruns,
            TelemetryEvent::DirectiveIssued { .. } => &self.directives,
            TelemetryEvent::JointFaulted { .. } => &self.joint_faults,
            TelemetryEvent::Rejected { .. } => &self.rejections,
        }
        .fetch_add(1, Ordering::Relaxed);

        let mut events = self.events.lock();
        if events.len() == RING_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Copy of the buffered events, oldest first
    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Current counter values
    pub fn counters(&self) -> TelemetryCounters {
        TelemetryCounters {
            clamp_events: self.clamp_events.load(Ordering::Relaxed),
            sync_violations: self.sync_violations.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            tick_overruns: self.tick_overruns.load(Ordering::Relaxed),
            directives: self.directives.load(Ordering::Relaxed),
            joint_faults: self.joint_faults.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

static TELEMETRY: Lazy<TelemetryRing> = Lazy::new(TelemetryRing::new);

/// The process-wide telemetry sink
pub fn telemetry() -> &'static TelemetryRing {
    &TELEMETRY
}

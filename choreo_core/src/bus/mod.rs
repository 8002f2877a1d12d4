//! Event bus
//!
//! Single-writer-per-source bounded channels. Safety directives travel on
//! a dedicated out-of-band channel that consumers poll before general
//! events each iteration, so a burst of observations can never delay a
//! directive. General channels shed their oldest message on overflow
//! (backpressure by drop, not block) and count what they shed.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::GuestObservation;
use crate::safety::{SafetyDirective, Severity};
use crate::telemetry::{telemetry, TelemetryEvent};

/// Default capacity for general event channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the safety channel; directives are never dropped
const SAFETY_CHANNEL_CAPACITY: usize = 64;

/// External trigger delivered to the behavior selector
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTrigger {
    /// Experience catalog id to launch
    pub experience: String,
    /// Optional intensity override, 0..1
    pub intensity: Option<f64>,
}

/// Bounded single-writer channel that drops oldest on overflow
pub struct EventQueue<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> EventQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            name,
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sender half for the single producing task
    pub fn sender(&self) -> EventSender<T> {
        EventSender {
            name: self.name,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            dropped: self.dropped.clone(),
        }
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Pop one message if available
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Messages shed so far due to overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producing half of an [`EventQueue`]
pub struct EventSender<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> EventSender<T> {
    /// Send, shedding the oldest queued message if the channel is full
    pub fn send(&self, msg: T) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                // Shed exactly one; the retry only fails if a consumer
                // raced us, in which case there is room next iteration.
                let _ = self.rx.try_recv();
                let count = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 64 == 1 {
                    log::warn!("channel '{}' overflowed, {} dropped so far", self.name, count);
                    telemetry().record(TelemetryEvent::DroppedMessages {
                        channel: self.name.to_string(),
                        count,
                    });
                }
                let _ = self.tx.try_send(msg);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("channel '{}' disconnected", self.name);
            }
        }
    }
}

/// Out-of-band safety directive channel
///
/// Never drops. Consumers call [`SafetyChannel::poll`] at the top of every
/// iteration: it drains all pending directives and yields the one that
/// wins (highest severity; the most recent among equals).
#[derive(Clone)]
pub struct SafetyChannel {
    tx: Sender<SafetyDirective>,
    rx: Receiver<SafetyDirective>,
}

impl SafetyChannel {
    pub fn new() -> Self {
        let (tx, rx) = bounded(SAFETY_CHANNEL_CAPACITY);
        Self { tx, rx }
    }

    /// Publish a directive; blocks briefly if the channel is at capacity
    /// (directives must not be shed)
    pub fn publish(&self, directive: SafetyDirective) {
        if self.tx.send(directive).is_err() {
            log::error!("safety channel disconnected");
        }
    }

    /// Drain pending directives, returning the superseding one
    ///
    /// A queued Critical+ directive always wins (highest severity, the
    /// most recent among equals); otherwise the most recent directive is
    /// authoritative, so a fresh all-clear supersedes a stale warning.
    pub fn poll(&self) -> Option<SafetyDirective> {
        let mut critical: Option<SafetyDirective> = None;
        let mut latest: Option<SafetyDirective> = None;
        for directive in self.rx.try_iter() {
            if directive.severity >= Severity::Critical {
                match &critical {
                    Some(current) if current.severity > directive.severity => {}
                    _ => critical = Some(directive.clone()),
                }
            }
            latest = Some(directive);
        }
        critical.or(latest)
    }
}

impl Default for SafetyChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out publisher for directives
///
/// Each consumer (motion loop, coordinator, selector) owns its own
/// `SafetyChannel` so none of them can steal another's directives; the
/// supervisor publishes through this to all of them at once.
#[derive(Clone, Default)]
pub struct SafetyPublisher {
    channels: Vec<SafetyChannel>,
}

impl SafetyPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer, returning its private channel
    pub fn subscribe(&mut self) -> SafetyChannel {
        let channel = SafetyChannel::new();
        self.channels.push(channel.clone());
        channel
    }

    /// Deliver a directive to every consumer
    pub fn publish(&self, directive: &SafetyDirective) {
        for channel in &self.channels {
            channel.publish(directive.clone());
        }
    }
}

/// The kernel's channel set
pub struct EventBus {
    /// Guest observations from the vision/proximity stack
    pub observations: EventQueue<GuestObservation>,
    /// External experience triggers
    pub triggers: EventQueue<ExternalTrigger>,
    /// Out-of-band safety directives
    pub safety: SafetyChannel,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            observations: EventQueue::new("observations", DEFAULT_CHANNEL_CAPACITY),
            triggers: EventQueue::new("triggers", DEFAULT_CHANNEL_CAPACITY),
            safety: SafetyChannel::new(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

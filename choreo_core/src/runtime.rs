//! Runtime assembly
//!
//! Wires the kernel together and runs it on dedicated OS threads with
//! strict role separation:
//!
//! 1. motion tick loop (50 Hz target)
//! 2. timeline coordinator
//! 3. behavior selector
//! 4. safety supervisor (cadence indexed by severity)
//! 5. watchdog (minimal path, forces rest PWM if the supervisor stalls)
//!
//! plus a telemetry/observer pump feeding the event bus. Shutdown drains
//! scheduled experiences (≤ 10 s), commands all joints to rest within
//! their velocity limits, then exits. SIGINT/SIGTERM trigger Emergency
//! followed by shutdown.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::adapters::{AudioPlayer, BusTelemetry, GuestObserver, LightBus, ServoBus};
use crate::behavior::{BehaviorDecision, BehaviorSelector, SelectorConfig};
use crate::bus::{EventBus, SafetyPublisher};
use crate::config::ShowConfig;
use crate::control::{Controller, TriggerOverrides};
use crate::core::{Clock, GuestObservation, MonotonicClock};
use crate::error::ChoreoResult;
use crate::motion::MotionScheduler;
use crate::safety::{
    AffectedJoints, IncidentLog, RequiredAction, SafetyDirective, SafetyInputs, SafetyReason,
    SafetySupervisor, Severity, Watchdog,
};
use crate::timeline::TimelineCoordinator;

/// Coordinator/selector pump period
const EVENT_LOOP_PERIOD: Duration = Duration::from_millis(5);
/// Telemetry and observer poll period (≥ 10 Hz contract)
const POLL_PERIOD: Duration = Duration::from_millis(50);
/// Watchdog check period
const WATCHDOG_PERIOD: Duration = Duration::from_millis(250);
/// Drain budget during normal shutdown
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// The hardware/backend set handed to the runtime
pub struct Backends {
    pub servo_bus: Box<dyn ServoBus>,
    pub audio: Box<dyn AudioPlayer>,
    pub lights: Box<dyn LightBus>,
    pub observer: Box<dyn GuestObserver>,
}

/// Shared field data the supervisor evaluates against
struct FieldState {
    observations: Mutex<(Vec<GuestObservation>, Instant)>,
    bus_telemetry: Mutex<(Option<BusTelemetry>, Instant)>,
}

/// A fully wired kernel
pub struct Runtime {
    clock: Arc<dyn Clock>,
    config: Arc<ShowConfig>,
    controller: Controller,
    scheduler: Arc<Mutex<MotionScheduler>>,
    coordinator: Arc<Mutex<TimelineCoordinator>>,
    selector: Arc<Mutex<BehaviorSelector>>,
    supervisor: Arc<Mutex<SafetySupervisor>>,
    bus: Arc<Mutex<Box<dyn ServoBus>>>,
    observer: Arc<Mutex<Box<dyn GuestObserver>>>,
    events: Arc<EventBus>,
    field: Arc<FieldState>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Assemble the kernel with the production clock
    pub fn new(config: ShowConfig, backends: Backends) -> ChoreoResult<Self> {
        Self::with_clock(config, backends, Arc::new(MonotonicClock))
    }

    /// Assemble with an injected clock (virtual in tests)
    pub fn with_clock(
        config: ShowConfig,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> ChoreoResult<Self> {
        let config = Arc::new(config);
        let now = clock.now();

        let mut publisher = SafetyPublisher::new();
        let motion_safety = publisher.subscribe();
        let coordinator_safety = publisher.subscribe();
        let selector_safety = publisher.subscribe();

        let bus: Arc<Mutex<Box<dyn ServoBus>>> = Arc::new(Mutex::new(backends.servo_bus));
        let scheduler = Arc::new(Mutex::new(MotionScheduler::new(
            config.table.clone(),
            bus.clone(),
            clock.clone(),
            motion_safety,
        )));
        let coordinator = Arc::new(Mutex::new(TimelineCoordinator::new(
            clock.clone(),
            scheduler.clone(),
            backends.audio,
            backends.lights,
            coordinator_safety,
        )));

        let selector_config = SelectorConfig {
            child_zone_scale: config.safety.child_zone_scale,
            ..SelectorConfig::default()
        };
        let selector = Arc::new(Mutex::new(BehaviorSelector::new(
            clock.clone(),
            selector_config,
            selector_safety,
        )));
        let supervisor = Arc::new(Mutex::new(SafetySupervisor::new(
            config.safety.clone(),
            config.table.clone(),
            clock.clone(),
            publisher,
        )));

        let controller = Controller::new(
            config.clone(),
            scheduler.clone(),
            coordinator.clone(),
            selector.clone(),
            supervisor.clone(),
        );

        Ok(Self {
            clock,
            config,
            controller,
            scheduler,
            coordinator,
            selector,
            supervisor,
            bus,
            observer: Arc::new(Mutex::new(backends.observer)),
            events: Arc::new(EventBus::new()),
            field: Arc::new(FieldState {
                observations: Mutex::new((Vec::new(), now)),
                bus_telemetry: Mutex::new((None, now)),
            }),
            running: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        })
    }

    /// Attach a durable incident log to the supervisor
    pub fn with_incident_log(self, log: IncidentLog) -> Self {
        self.supervisor.lock().set_incident_log(log);
        self
    }

    pub fn controller(&self) -> Controller {
        self.controller.clone()
    }

    /// Seed relationship records persisted from a previous run
    pub fn seed_relationships(&self, records: Vec<crate::behavior::GuestRelationship>) {
        self.selector.lock().seed_relationships(records);
    }

    /// Install SIGINT/SIGTERM handling: Emergency, then shutdown
    pub fn install_signal_handler(&self) -> ChoreoResult<()> {
        let supervisor = self.supervisor.clone();
        let running = self.running.clone();
        ctrlc::set_handler(move || {
            log::warn!("termination signal: emergency stop, then shutdown");
            supervisor.lock().emergency_stop();
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| crate::error::ChoreoError::internal(format!("signal handler: {}", e)))?;
        Ok(())
    }

    /// Spawn all task threads
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.spawn_motion_loop();
        self.spawn_poll_pump();
        self.spawn_selector_loop();
        self.spawn_coordinator_loop();
        self.spawn_supervisor_loop();
        self.spawn_watchdog();
        log::info!(
            "runtime started: {} joints, {} sequences, {} experiences",
            self.config.table.len(),
            self.config.sequences.len(),
            self.config.experiences.len()
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sender for external experience triggers
    pub fn trigger_sender(&self) -> crate::bus::EventSender<crate::bus::ExternalTrigger> {
        self.events.triggers.sender()
    }

    fn spawn_motion_loop(&mut self) {
        let running = self.running.clone();
        let scheduler = self.scheduler.clone();
        let period = self.scheduler.lock().tick_period();
        self.threads.push(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                scheduler.lock().tick();
                let elapsed = started.elapsed();
                if elapsed < period {
                    std::thread::sleep(period - elapsed);
                }
            }
        }));
    }

    /// Telemetry + guest observation pump (≥ 10 Hz each)
    fn spawn_poll_pump(&mut self) {
        let running = self.running.clone();
        let bus = self.bus.clone();
        let scheduler = self.scheduler.clone();
        let observer = self.observer.clone();
        let events = self.events.clone();
        let field = self.field.clone();
        let clock = self.clock.clone();
        self.threads.push(std::thread::spawn(move || {
            let observation_sender = events.observations.sender();
            while running.load(Ordering::SeqCst) {
                let now = clock.now();
                match bus.lock().telemetry() {
                    Ok(samples) => {
                        scheduler.lock().ingest_telemetry(&samples);
                        *field.bus_telemetry.lock() = (Some(samples), now);
                    }
                    Err(err) => {
                        log::debug!("telemetry poll failed: {}", err);
                    }
                }

                // An empty poll is still a live observer; always refresh
                // the timestamp so a quiet venue never reads as a dead
                // backend.
                let observations = observer.lock().poll();
                *field.observations.lock() = (observations.clone(), now);
                for observation in observations {
                    observation_sender.send(observation);
                }
                std::thread::sleep(POLL_PERIOD);
            }
        }));
    }

    fn spawn_selector_loop(&mut self) {
        let running = self.running.clone();
        let selector = self.selector.clone();
        let events = self.events.clone();
        let controller = self.controller.clone();
        self.threads.push(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let observations = events.observations.drain();
                let triggers = events.triggers.drain();
                let decisions = selector.lock().process(&observations, &triggers);
                for decision in decisions {
                    match decision {
                        BehaviorDecision::TriggerExperience {
                            experience, params, ..
                        } => {
                            let overrides = TriggerOverrides {
                                params: Some(params),
                                ..Default::default()
                            };
                            if let Err(err) =
                                controller.trigger_experience(&experience, overrides)
                            {
                                log::debug!("selector trigger '{}' rejected: {}", experience, err);
                            }
                        }
                        BehaviorDecision::SetPersonality { mode, intensity } => {
                            log::info!("personality: {:?} at {:?}", mode, intensity);
                        }
                    }
                }
                std::thread::sleep(EVENT_LOOP_PERIOD * 4);
            }
        }));
    }

    fn spawn_coordinator_loop(&mut self) {
        let running = self.running.clone();
        let coordinator = self.coordinator.clone();
        self.threads.push(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                coordinator.lock().tick();
                std::thread::sleep(EVENT_LOOP_PERIOD);
            }
        }));
    }

    fn spawn_supervisor_loop(&mut self) {
        let running = self.running.clone();
        let supervisor = self.supervisor.clone();
        let field = self.field.clone();
        let clock = self.clock.clone();
        let snapshot = self.scheduler.lock().snapshot_handle();
        let motion_heartbeat = self.scheduler.lock().heartbeat_handle();
        self.threads.push(std::thread::spawn(move || {
            let mut last_heartbeat_value = motion_heartbeat.load(Ordering::Relaxed);
            let mut last_heartbeat_change = clock.now();
            while running.load(Ordering::SeqCst) {
                let now = clock.now();
                let heartbeat_value = motion_heartbeat.load(Ordering::Relaxed);
                if heartbeat_value != last_heartbeat_value {
                    last_heartbeat_value = heartbeat_value;
                    last_heartbeat_change = now;
                }

                let states = snapshot.load_full();
                let (observations, observed_at) = field.observations.lock().clone();
                let (telemetry, telemetry_at) = field.bus_telemetry.lock().clone();
                let inputs = SafetyInputs {
                    joint_states: &states,
                    observations: &observations,
                    bus_telemetry: telemetry.as_ref(),
                    telemetry_age_s: now.saturating_duration_since(telemetry_at).as_secs_f64(),
                    observer_age_s: now.saturating_duration_since(observed_at).as_secs_f64(),
                    scheduler_heartbeat_age_s: now
                        .saturating_duration_since(last_heartbeat_change)
                        .as_secs_f64(),
                };
                let period = {
                    let mut supervisor = supervisor.lock();
                    supervisor.evaluate(&inputs);
                    supervisor.eval_period()
                };
                std::thread::sleep(period);
            }
        }));
    }

    fn spawn_watchdog(&mut self) {
        let running = self.running.clone();
        let heartbeat: Arc<AtomicU64> = self.supervisor.lock().heartbeat_handle();
        let bus = self.bus.clone();
        let table = self.config.table.clone();
        let clock = self.clock.clone();
        self.threads.push(std::thread::spawn(move || {
            let mut watchdog = Watchdog::supervisor_default(heartbeat, clock.now());
            while running.load(Ordering::SeqCst) {
                if !watchdog.check(clock.now()) {
                    log::error!("safety supervisor heartbeat lost; forcing rest PWM");
                    Watchdog::force_rest(&bus, &table);
                    watchdog.reset(clock.now());
                }
                std::thread::sleep(WATCHDOG_PERIOD);
            }
        }));
    }

    /// Normal shutdown: drain ≤ 10 s, retract to rest, stop threads
    pub fn shutdown(mut self) {
        log::info!("runtime shutting down");
        let drain_deadline = Instant::now() + SHUTDOWN_DRAIN;
        while Instant::now() < drain_deadline {
            let idle = self.scheduler.lock().is_idle()
                && self.coordinator.lock().active_count() == 0;
            if idle {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Command everything to rest within velocity limits
        let retract = SafetyDirective {
            severity: Severity::Critical,
            reason: SafetyReason::OperatorStop,
            affected: AffectedJoints::All,
            actions: vec![RequiredAction::Retract],
            deadline_ms: Severity::Critical.latency_budget_ms(),
        };
        self.scheduler.lock().apply_directive(&retract);

        // Give the motion loop time to ride the retraction down
        let rest_deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < rest_deadline {
            if self.scheduler.lock().is_idle() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        log::info!("runtime stopped");
    }
}

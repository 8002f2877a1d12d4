//! Motion scheduler
//!
//! The per-tick evaluator. At each tick (50 Hz target, 20 Hz floor) it
//! advances every active channel, layers the bio-mechanical modifiers onto
//! the eased base value, clamps to joint limits, rate-limits the slew and
//! dispatches PWM to the servo bus.
//!
//! The scheduler is the single writer of `JointState`; readers get
//! copy-on-write snapshots swapped in atomically each tick. The safety
//! channel is polled at the top of every tick, before any keyframe is
//! consumed, so Critical+ directives take effect within one tick.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::ServoBus;
use crate::bus::SafetyChannel;
use crate::core::{Clock, FaultKind, JointId, JointState, JointTable};
use crate::curves::Easing;
use crate::error::{ChoreoError, ChoreoResult};
use crate::motion::keyframe::Keyframe;
use crate::safety::{RequiredAction, SafetyDirective};
use crate::sequence::CompiledSequence;
use crate::telemetry::{telemetry, TelemetryEvent};

/// Target tick rate
pub const TARGET_TICK_HZ: u32 = 50;
/// Floor tick rate; below this the show is considered degraded
pub const FLOOR_TICK_HZ: u32 = 20;

/// Fixed per-joint arc scale, degrees at full `arc_amount`
const ARC_SCALE_DEG: f64 = 5.0;
/// Implied velocity above which squash kicks in, °/s
const SQUASH_VELOCITY_DPS: f64 = 50.0;

/// Per-channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// Waiting for its start instant
    Scheduled,
    Running,
    /// Inside the last segment
    Finishing,
    Completed,
    /// Frozen by a safety directive
    Held,
}

/// One joint's active timeline plus evaluation cursor
struct ActiveChannel {
    joint: JointId,
    keyframes: Vec<Keyframe>,
    start: Instant,
    exaggeration: f64,
    squash_factor: f64,
    phase: ChannelPhase,
    /// Position the current segment interpolates from
    from_deg: f64,
    segment: usize,
    /// Seconds from channel start to the current segment's start
    segment_start_s: f64,
    /// Final target has been commanded (idempotent completion)
    final_commanded: bool,
}

impl ActiveChannel {
    fn total_duration_s(&self) -> f64 {
        self.keyframes.iter().map(|k| k.duration_s).sum()
    }
}

/// Per-joint runtime bookkeeping owned by the scheduler
struct JointRuntime {
    state: JointState,
    /// A bus write failed last tick; one retry is pending
    retry_pending: bool,
    /// Effective range narrowing about rest from a Clamp directive (1 = full)
    clamp_scale: f64,
}

/// Performance counters for the motion loop
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionMetrics {
    pub total_ticks: u64,
    /// Ticks that arrived more than one full period late
    pub overrun_ticks: u64,
    pub max_jitter_us: u64,
    /// Jitter distribution: <100µs, <500µs, <1ms, <2ms, <5ms, ≥5ms
    pub jitter_buckets: [u64; 6],
    pub commands_written: u64,
    pub write_retries: u64,
    pub clamp_events: u64,
    pub active_channels: usize,
}

/// The per-tick evaluator driving all servo channels
pub struct MotionScheduler {
    table: Arc<JointTable>,
    clock: Arc<dyn Clock>,
    bus: Arc<Mutex<Box<dyn ServoBus>>>,
    safety: SafetyChannel,
    channels: Vec<ActiveChannel>,
    joints: Vec<JointRuntime>,
    snapshot: Arc<ArcSwap<Vec<JointState>>>,
    tick_period: Duration,
    last_tick: Option<Instant>,
    metrics: MotionMetrics,
    /// Refuse new work while a lockdown is in force
    lockdown: bool,
    /// Monotonic tick counter, watched by the supervisor's watchdog
    heartbeat: Arc<AtomicU64>,
}

impl MotionScheduler {
    pub fn new(
        table: Arc<JointTable>,
        bus: Arc<Mutex<Box<dyn ServoBus>>>,
        clock: Arc<dyn Clock>,
        safety: SafetyChannel,
    ) -> Self {
        let now = clock.now();
        let joints: Vec<JointRuntime> = table
            .iter()
            .map(|(_, config)| JointRuntime {
                state: JointState::at_rest(config, now),
                retry_pending: false,
                clamp_scale: 1.0,
            })
            .collect();
        let states: Vec<JointState> = joints.iter().map(|j| j.state.clone()).collect();

        Self {
            table,
            clock,
            bus,
            safety,
            channels: Vec::new(),
            joints,
            snapshot: Arc::new(ArcSwap::from_pointee(states)),
            tick_period: Duration::from_micros(1_000_000 / TARGET_TICK_HZ as u64),
            last_tick: None,
            metrics: MotionMetrics::default(),
            lockdown: false,
            heartbeat: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Tick period the runtime loop should sleep on
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Handle for snapshot readers (safety supervisor, control surface)
    pub fn snapshot_handle(&self) -> Arc<ArcSwap<Vec<JointState>>> {
        self.snapshot.clone()
    }

    /// Monotonic tick counter for watchdog staleness checks
    pub fn heartbeat_handle(&self) -> Arc<AtomicU64> {
        self.heartbeat.clone()
    }

    pub fn metrics(&self) -> MotionMetrics {
        let mut metrics = self.metrics;
        metrics.active_channels = self
            .channels
            .iter()
            .filter(|c| !matches!(c.phase, ChannelPhase::Completed))
            .count();
        metrics
    }

    pub fn is_lockdown(&self) -> bool {
        self.lockdown
    }

    /// True when no channel is scheduled or running
    pub fn is_idle(&self) -> bool {
        self.channels
            .iter()
            .all(|c| matches!(c.phase, ChannelPhase::Completed))
    }

    /// Enqueue a compiled sequence with a concrete start on the master clock
    ///
    /// The whole sequence validates or the whole sequence is rejected;
    /// nothing is ever enqueued partially. A new timeline for a joint
    /// replaces any timeline already active on that joint.
    pub fn enqueue(&mut self, compiled: &CompiledSequence, start: Instant) -> ChoreoResult<()> {
        if self.lockdown {
            return Err(ChoreoError::rejected("lockdown in force"));
        }

        // Validate every channel against its joint before touching state
        for channel in &compiled.channels {
            let config = self.table.config(channel.joint)?;
            let runtime = self
                .joints
                .get(channel.joint.index())
                .ok_or_else(|| ChoreoError::UnknownJoint(channel.joint.to_string()))?;
            if runtime.state.is_faulted() {
                return Err(ChoreoError::JointFault {
                    joint: config.name.clone(),
                    kind: runtime.state.fault.map(|f| f.to_string()).unwrap_or_default(),
                });
            }
            crate::motion::keyframe::validate_keyframes(
                config,
                runtime.state.current_deg,
                &channel.keyframes,
            )?;
        }

        for channel in &compiled.channels {
            let from_deg = self.joints[channel.joint.index()].state.current_deg;
            // Replace any active timeline on the same joint
            self.channels.retain(|c| c.joint != channel.joint);
            self.channels.push(ActiveChannel {
                joint: channel.joint,
                keyframes: channel.keyframes.clone(),
                start: start + Duration::from_secs_f64(channel.start_offset_s),
                exaggeration: compiled.exaggeration,
                squash_factor: compiled.squash_factor,
                phase: ChannelPhase::Scheduled,
                from_deg,
                segment: 0,
                segment_start_s: 0.0,
                final_commanded: false,
            });
        }
        log::debug!(
            "enqueued sequence '{}' on {} channels",
            compiled.sequence_id,
            compiled.channels.len()
        );
        Ok(())
    }

    /// Apply a safety directive immediately (also called from within tick)
    pub fn apply_directive(&mut self, directive: &SafetyDirective) {
        // De-escalation releases graded restrictions; a lockdown still
        // needs the explicit clear.
        if directive.severity <= crate::safety::Severity::Low && !self.lockdown {
            for joint in &mut self.joints {
                joint.clamp_scale = 1.0;
            }
            self.channels
                .retain(|c| !matches!(c.phase, ChannelPhase::Held));
        }
        for action in &directive.actions {
            match action {
                RequiredAction::Halt => {
                    for channel in &mut self.channels {
                        if directive.affected.contains(channel.joint)
                            && !matches!(channel.phase, ChannelPhase::Completed)
                        {
                            channel.phase = ChannelPhase::Held;
                        }
                    }
                }
                RequiredAction::Clamp { range_scale } => {
                    let scale = range_scale.clamp(0.0, 1.0);
                    for index in 0..self.joints.len() {
                        if directive.affected.contains(JointId(index as u16)) {
                            self.joints[index].clamp_scale = scale;
                        }
                    }
                }
                RequiredAction::BackOff => {
                    // Posture bias is the selector's job; nothing to do here
                }
                RequiredAction::Retract => {
                    self.retract_affected(directive);
                }
                RequiredAction::Lockdown => {
                    self.lockdown = true;
                    self.retract_affected(directive);
                }
            }
        }
    }

    /// Clear lockdown and drop held timelines (after an Emergency clear)
    pub fn clear_lockdown(&mut self) {
        self.lockdown = false;
        self.channels
            .retain(|c| !matches!(c.phase, ChannelPhase::Held));
        for joint in &mut self.joints {
            joint.clamp_scale = 1.0;
        }
        log::info!("motion lockdown cleared");
    }

    /// Clear a fault on one joint (maintenance action)
    pub fn clear_fault(&mut self, joint: JointId) {
        if let Some(runtime) = self.joints.get_mut(joint.index()) {
            runtime.state.fault = None;
            runtime.retry_pending = false;
        }
    }

    /// Replace affected timelines with a velocity-limited path to rest
    fn retract_affected(&mut self, directive: &SafetyDirective) {
        let now = self.clock.now();
        let mut replacements = Vec::new();
        for (id, config) in self.table.iter() {
            if !directive.affected.contains(id) {
                continue;
            }
            let current = self.joints[id.index()].state.current_deg;
            let travel = (current - config.rest_deg).abs();
            if travel < 1e-9 {
                continue;
            }
            // Exactly the configured velocity limit, linear ramp
            let duration_s = (travel / config.max_velocity).max(1e-3);
            replacements.push(ActiveChannel {
                joint: id,
                keyframes: vec![Keyframe::new(config.rest_deg, duration_s, Easing::Linear)],
                start: now,
                exaggeration: 1.0,
                squash_factor: 1.0,
                phase: ChannelPhase::Scheduled,
                from_deg: current,
                segment: 0,
                segment_start_s: 0.0,
                final_commanded: false,
            });
        }
        self.channels
            .retain(|c| !directive.affected.contains(c.joint));
        self.channels.extend(replacements);
    }

    /// One scheduler tick: poll safety, advance channels, command the bus,
    /// publish the snapshot
    pub fn tick(&mut self) {
        let now = self.clock.now();

        // Safety first, before any keyframe is consumed this tick
        if let Some(directive) = self.safety.poll() {
            self.apply_directive(&directive);
        }

        // Jitter and miss-budget accounting; a late tick skips ahead
        // (evaluation is absolute-time based, so no backlog accumulates)
        if let Some(last) = self.last_tick {
            let interval = now.saturating_duration_since(last);
            let jitter = interval.saturating_sub(self.tick_period);
            let jitter_us = jitter.as_micros() as u64;
            if jitter_us > self.metrics.max_jitter_us {
                self.metrics.max_jitter_us = jitter_us;
            }
            let bucket = match jitter_us {
                0..=99 => 0,
                100..=499 => 1,
                500..=999 => 2,
                1000..=1999 => 3,
                2000..=4999 => 4,
                _ => 5,
            };
            self.metrics.jitter_buckets[bucket] += 1;
            if interval > self.tick_period * 2 {
                self.metrics.overrun_ticks += 1;
                log::warn!("motion tick late by {}µs, skipping ahead", jitter_us);
                telemetry().record(TelemetryEvent::TickOverrun { late_us: jitter_us });
            }
        }
        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(self.tick_period.as_secs_f64())
            .max(1e-6);
        self.last_tick = Some(now);
        self.metrics.total_ticks += 1;
        self.heartbeat.fetch_add(1, Ordering::Relaxed);

        for i in 0..self.channels.len() {
            self.advance_channel(i, now, dt);
        }
        self.channels
            .retain(|c| !(matches!(c.phase, ChannelPhase::Completed) && c.final_commanded));

        // Publish the copy-on-write snapshot
        let states: Vec<JointState> = self.joints.iter().map(|j| j.state.clone()).collect();
        self.snapshot.store(Arc::new(states));
    }

    /// Merge the latest bus telemetry into joint state (runtime polls ≥10 Hz)
    pub fn ingest_telemetry(&mut self, samples: &crate::adapters::BusTelemetry) {
        for index in 0..self.joints.len() {
            let bus_channel = match self.table.get(JointId(index as u16)) {
                Some(config) => config.bus_channel,
                None => continue,
            };
            if let Some(sample) = samples.channels.get(&bus_channel) {
                let state = &mut self.joints[index].state;
                state.temperature_c = sample.temp_c;
                state.current_a = sample.current_a;
            }
        }
    }

    fn advance_channel(&mut self, index: usize, now: Instant, dt: f64) {
        // Evaluate first with the channel borrowed, then command with the
        // borrow released.
        let (joint, value, target, is_final) = {
            let channel = &mut self.channels[index];
            let joint_index = channel.joint.index();
            if self.joints[joint_index].state.is_faulted() {
                return;
            }
            match channel.phase {
                ChannelPhase::Completed | ChannelPhase::Held => return,
                _ => {}
            }
            if now < channel.start {
                return;
            }
            if channel.phase == ChannelPhase::Scheduled {
                channel.phase = ChannelPhase::Running;
            }

            let elapsed = now.duration_since(channel.start).as_secs_f64();

            // Walk to the segment containing `elapsed`; segments we cross
            // update the `from` cursor so interpolation always starts at
            // the previous keyframe's target.
            while channel.segment < channel.keyframes.len() {
                let dur = channel.keyframes[channel.segment].duration_s;
                if elapsed < channel.segment_start_s + dur {
                    break;
                }
                channel.from_deg = channel.keyframes[channel.segment].target_deg;
                channel.segment_start_s += dur;
                channel.segment += 1;
            }

            let (rest_deg, _) = match self.table.get(channel.joint) {
                Some(config) => (config.rest_deg, config.bus_channel),
                None => return,
            };

            if channel.segment >= channel.keyframes.len() {
                // Past the end: command the final target once, idempotently
                channel.phase = ChannelPhase::Completed;
                if channel.final_commanded {
                    return;
                }
                let last_target = channel
                    .keyframes
                    .last()
                    .expect("validated non-empty")
                    .target_deg;
                let final_deg = exaggerate(last_target, rest_deg, channel.exaggeration);
                (channel.joint, final_deg, last_target, true)
            } else {
                let keyframe = &channel.keyframes[channel.segment];
                let local_t =
                    ((elapsed - channel.segment_start_s) / keyframe.duration_s).clamp(0.0, 1.0);

                // a-d: eased base value
                let eased = keyframe.easing.apply(local_t);
                let mut value =
                    channel.from_deg + (keyframe.target_deg - channel.from_deg) * eased;

                let segment_elapsed = elapsed - channel.segment_start_s;
                let displacement = keyframe.target_deg - channel.from_deg;

                // Anticipation: brief counter-motion at the head of the
                // segment; zero at both ends of the lead window.
                if keyframe.anticipation_lead_s > 0.0 {
                    let lead = keyframe.anticipation_lead_s.min(keyframe.duration_s * 0.5);
                    if segment_elapsed < lead {
                        let phase = segment_elapsed / lead;
                        value -=
                            displacement * 0.1 * (std::f64::consts::PI * phase).sin();
                    }
                }

                // Follow-through: damped ring-out over the segment's tail;
                // lands exactly on the eased value at the boundary.
                if keyframe.follow_through_s > 0.0 {
                    let settle_start =
                        (keyframe.duration_s - keyframe.follow_through_s).max(0.0);
                    if segment_elapsed > settle_start {
                        let phase = (segment_elapsed - settle_start)
                            / keyframe.follow_through_s.min(keyframe.duration_s);
                        value += displacement
                            * 0.08
                            * (-3.0 * phase).exp()
                            * (2.0 * std::f64::consts::PI * phase).sin();
                    }
                }

                // e: arc — lift through the middle of the segment
                if keyframe.arc_amount > 0.0 {
                    value += keyframe.arc_amount
                        * (std::f64::consts::PI * local_t).sin()
                        * ARC_SCALE_DEG;
                }

                // f: secondary oscillation over the whole channel's elapsed time
                if keyframe.secondary_amp_deg > 0.0 && keyframe.secondary_freq_hz > 0.0 {
                    value += keyframe.secondary_amp_deg
                        * (2.0 * std::f64::consts::PI * keyframe.secondary_freq_hz * elapsed)
                            .sin();
                }

                // g: squash when the motion is fast
                let last_commanded = self.joints[joint_index].state.last_commanded_deg;
                let implied_velocity = (value - last_commanded) / dt;
                if implied_velocity.abs() >= SQUASH_VELOCITY_DPS {
                    value = rest_deg + (value - rest_deg) * channel.squash_factor;
                }

                // h: exaggeration about rest
                let value = exaggerate(value, rest_deg, channel.exaggeration);

                if channel.segment == channel.keyframes.len() - 1 {
                    channel.phase = ChannelPhase::Finishing;
                }
                (channel.joint, value, keyframe.target_deg, false)
            }
        };

        let wrote = self.command_joint(joint, value, dt);
        if is_final {
            self.channels[index].final_commanded = wrote;
            if wrote {
                let state = &mut self.joints[joint.index()].state;
                state.target_deg = target;
                state.in_motion = false;
            }
        } else if wrote {
            let state = &mut self.joints[joint.index()].state;
            state.target_deg = target;
            state.in_motion = true;
        }
    }

    /// Clamp, slew-limit, convert and write one joint command.
    /// Returns true when the command reached the bus.
    fn command_joint(&mut self, joint: JointId, requested_deg: f64, dt: f64) -> bool {
        // Disjoint field borrows: config reads self.table, runtime mutates
        // self.joints. No clone, no allocation on the hot path.
        let config = match self.table.get(joint) {
            Some(config) => config,
            None => return false,
        };
        let runtime = &mut self.joints[joint.index()];

        // i: clamp to the (possibly narrowed) range
        let scale = runtime.clamp_scale;
        let min = config.rest_deg - (config.rest_deg - config.min_deg) * scale;
        let max = config.rest_deg + (config.max_deg - config.rest_deg) * scale;
        let clamped = requested_deg.clamp(min, max);
        if requested_deg < config.min_deg || requested_deg > config.max_deg {
            self.metrics.clamp_events += 1;
            telemetry().record(TelemetryEvent::Clamped {
                joint,
                requested_deg,
                clamped_deg: clamped,
            });
        }

        // j: slew limiter — never exceed the velocity or acceleration
        // limits between consecutive commands; a limited channel does not
        // catch up, which keeps the motion smooth.
        let prev = runtime.state.last_commanded_deg;
        let prev_vel = runtime.state.velocity_dps;
        let max_delta = config.max_velocity * dt;
        let delta = (clamped - prev).clamp(-max_delta, max_delta);
        let desired_vel = delta / dt;
        let dv_max = config.max_acceleration * dt;
        let vel = desired_vel.clamp(prev_vel - dv_max, prev_vel + dv_max);
        let commanded = prev + vel * dt;

        // k: convert and dispatch
        let pulse = config.angle_to_pulse_us(commanded);
        let result = self.bus.lock().write(config.bus_channel, pulse);
        match result {
            Ok(()) => {
                runtime.retry_pending = false;
                self.metrics.commands_written += 1;
                let state = &mut runtime.state;
                state.velocity_dps = vel;
                state.current_deg = commanded;
                state.last_commanded_deg = commanded;
                state.last_update = self.clock.now();
                true
            }
            Err(err) => {
                if runtime.retry_pending {
                    // Second consecutive failure: fault the joint and stop
                    // commanding it; the supervisor sees the fault in the
                    // next snapshot.
                    runtime.state.fault = Some(FaultKind::BusError);
                    runtime.state.in_motion = false;
                    log::error!(
                        "joint '{}' faulted after bus retry: {}",
                        config.name,
                        err
                    );
                    telemetry().record(TelemetryEvent::JointFaulted {
                        joint,
                        kind: FaultKind::BusError,
                    });
                } else {
                    runtime.retry_pending = true;
                    self.metrics.write_retries += 1;
                    log::warn!("bus write failed on '{}', retrying next tick: {}", config.name, err);
                }
                false
            }
        }
    }
}

fn exaggerate(value_deg: f64, rest_deg: f64, exaggeration: f64) -> f64 {
    rest_deg + (value_deg - rest_deg) * exaggeration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JointConfig, VirtualClock};
    use crate::sequence::CompiledChannel;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    /// Servo bus double recording every write; optionally failing
    struct RecordingBus {
        writes: Arc<Mutex<Vec<(u8, u16)>>>,
        fail_next: Arc<AtomicU64>,
    }

    impl RecordingBus {
        fn new() -> (Self, Arc<Mutex<Vec<(u8, u16)>>>, Arc<AtomicU64>) {
            let writes = Arc::new(Mutex::new(Vec::new()));
            let fail = Arc::new(AtomicU64::new(0));
            (
                Self {
                    writes: writes.clone(),
                    fail_next: fail.clone(),
                },
                writes,
                fail,
            )
        }
    }

    impl ServoBus for RecordingBus {
        fn write(&mut self, channel: u8, pwm_us: u16) -> ChoreoResult<()> {
            if self.fail_next.load(Ordering::Relaxed) > 0 {
                self.fail_next.fetch_sub(1, Ordering::Relaxed);
                return Err(ChoreoError::bus("injected failure"));
            }
            self.writes.lock().push((channel, pwm_us));
            Ok(())
        }

        fn telemetry(&mut self) -> ChoreoResult<crate::adapters::BusTelemetry> {
            Ok(crate::adapters::BusTelemetry {
                channels: HashMap::new(),
            })
        }
    }

    fn head_pitch() -> JointConfig {
        JointConfig {
            name: "head_pitch".into(),
            bus_channel: 0,
            min_deg: -45.0,
            max_deg: 30.0,
            rest_deg: 0.0,
            max_velocity: 120.0,
            max_acceleration: 2400.0,
            pwm_min_us: 500,
            pwm_max_us: 2500,
            invert: false,
            trim_deg: 0.0,
        }
    }

    fn rig() -> (
        MotionScheduler,
        VirtualClock,
        SafetyChannel,
        Arc<Mutex<Vec<(u8, u16)>>>,
        Arc<AtomicU64>,
    ) {
        let table = Arc::new(JointTable::new(vec![head_pitch()]).unwrap());
        let clock = VirtualClock::new();
        let (bus, writes, fail) = RecordingBus::new();
        let safety = SafetyChannel::new();
        let scheduler = MotionScheduler::new(
            table,
            Arc::new(Mutex::new(Box::new(bus) as Box<dyn ServoBus>)),
            Arc::new(clock.clone()),
            safety.clone(),
        );
        (scheduler, clock, safety, writes, fail)
    }

    fn single_channel(keyframes: Vec<Keyframe>) -> CompiledSequence {
        CompiledSequence {
            sequence_id: "test".into(),
            channels: vec![CompiledChannel {
                joint: JointId(0),
                start_offset_s: 0.0,
                keyframes,
            }],
            exaggeration: 1.0,
            squash_factor: 1.0,
            total_duration_s: 0.0,
        }
    }

    fn run_ticks(scheduler: &mut MotionScheduler, clock: &VirtualClock, ticks: usize) {
        for _ in 0..ticks {
            clock.advance(Duration::from_millis(20));
            scheduler.tick();
        }
    }

    #[test]
    fn test_reaches_target_within_tolerance() {
        let (mut scheduler, clock, _safety, _writes, _fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(15.0, 0.6, Easing::EaseInOutCubic)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();

        run_ticks(&mut scheduler, &clock, 40); // 0.8 s
        let snapshot = scheduler.snapshot_handle().load_full();
        assert_relative_eq!(snapshot[0].current_deg, 15.0, epsilon = 0.1);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_commands_never_leave_joint_range() {
        let (mut scheduler, clock, _safety, writes, _fail) = rig();
        // Secondary bounce stacked on an EaseOutBack overshoot near the limit
        let kf = Keyframe::new(28.0, 0.5, Easing::EaseOutBack).with_secondary(6.0, 4.0);
        let compiled = single_channel(vec![kf]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();

        run_ticks(&mut scheduler, &clock, 50);
        let config = head_pitch();
        for (_, pulse) in writes.lock().iter() {
            assert!(*pulse >= config.pwm_min_us && *pulse <= config.pwm_max_us);
        }
        let snapshot = scheduler.snapshot_handle().load_full();
        assert!(snapshot[0].current_deg <= config.max_deg + 1e-9);
        assert!(snapshot[0].current_deg >= config.min_deg - 1e-9);
    }

    #[test]
    fn test_velocity_never_exceeds_limit() {
        let (mut scheduler, clock, _safety, _writes, _fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(24.0, 0.25, Easing::EaseInOutQuad)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();

        let mut prev = 0.0f64;
        for _ in 0..30 {
            clock.advance(Duration::from_millis(20));
            scheduler.tick();
            let current = scheduler.snapshot_handle().load_full()[0].current_deg;
            let velocity = (current - prev).abs() / 0.02;
            assert!(
                velocity <= 120.0 + 1e-6,
                "velocity {} exceeded limit",
                velocity
            );
            prev = current;
        }
    }

    #[test]
    fn test_halt_directive_freezes_channel() {
        let (mut scheduler, clock, safety, _writes, _fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(20.0, 1.0, Easing::Linear)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();
        run_ticks(&mut scheduler, &clock, 10); // 0.2 s in

        let frozen = scheduler.snapshot_handle().load_full()[0].current_deg;
        safety.publish(SafetyDirective::critical(
            crate::safety::SafetyReason::GuestProximity { distance_m: 0.2 },
        ));
        run_ticks(&mut scheduler, &clock, 20);
        let after = scheduler.snapshot_handle().load_full()[0].current_deg;
        assert_relative_eq!(after, frozen, epsilon = 1e-9);
    }

    #[test]
    fn test_lockdown_retracts_to_rest_and_refuses_work() {
        let (mut scheduler, clock, safety, _writes, _fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(24.0, 0.3, Easing::Linear)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();
        run_ticks(&mut scheduler, &clock, 10);

        safety.publish(SafetyDirective::emergency(
            crate::safety::SafetyReason::OperatorStop,
        ));
        // range_span/max_velocity = 75/120 = 0.625 s worst case; give it 1 s
        run_ticks(&mut scheduler, &clock, 50);
        let snapshot = scheduler.snapshot_handle().load_full();
        assert_relative_eq!(snapshot[0].current_deg, 0.0, epsilon = 0.1);

        let err = scheduler.enqueue(&compiled, clock.now()).unwrap_err();
        assert!(matches!(err, ChoreoError::Rejected(_)));

        scheduler.clear_lockdown();
        assert!(scheduler.enqueue(&compiled, clock.now()).is_ok());
    }

    #[test]
    fn test_bus_failure_retries_once_then_faults() {
        let (mut scheduler, clock, _safety, _writes, fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(20.0, 1.0, Easing::Linear)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();

        fail.store(2, Ordering::Relaxed); // fail this tick and the retry
        run_ticks(&mut scheduler, &clock, 2);
        let snapshot = scheduler.snapshot_handle().load_full();
        assert_eq!(snapshot[0].fault, Some(FaultKind::BusError));

        // Faulted joint refuses new sequences until cleared
        let err = scheduler.enqueue(&compiled, clock.now()).unwrap_err();
        assert!(matches!(err, ChoreoError::JointFault { .. }));
        scheduler.clear_fault(JointId(0));
        assert!(scheduler.enqueue(&compiled, clock.now()).is_ok());
    }

    #[test]
    fn test_single_transient_failure_recovers() {
        let (mut scheduler, clock, _safety, _writes, fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(20.0, 1.0, Easing::Linear)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();

        fail.store(1, Ordering::Relaxed);
        run_ticks(&mut scheduler, &clock, 3);
        let snapshot = scheduler.snapshot_handle().load_full();
        assert_eq!(snapshot[0].fault, None);
        assert!(scheduler.metrics().write_retries >= 1);
    }

    #[test]
    fn test_completion_is_idempotent() {
        let (mut scheduler, clock, _safety, writes, _fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(10.0, 0.2, Easing::Linear)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();
        run_ticks(&mut scheduler, &clock, 15);
        let count_after_completion = writes.lock().len();
        // Further ticks with no active channels write nothing
        run_ticks(&mut scheduler, &clock, 10);
        assert_eq!(writes.lock().len(), count_after_completion);
    }

    #[test]
    fn test_rejects_infeasible_sequence_without_state_change() {
        let (mut scheduler, clock, _safety, writes, _fail) = rig();
        // 600°/s implied velocity
        let compiled = single_channel(vec![Keyframe::new(30.0, 0.05, Easing::Linear)]);
        let err = scheduler.enqueue(&compiled, clock.now()).unwrap_err();
        assert!(matches!(err, ChoreoError::KinematicInfeasible { .. }));
        run_ticks(&mut scheduler, &clock, 5);
        assert!(writes.lock().is_empty());
    }

    #[test]
    fn test_clamp_directive_narrows_range() {
        let (mut scheduler, clock, safety, _writes, _fail) = rig();
        let compiled = single_channel(vec![Keyframe::new(28.0, 0.5, Easing::Linear)]);
        safety.publish(SafetyDirective::new(
            crate::safety::Severity::High,
            crate::safety::SafetyReason::CrowdPressure { count: 9 },
            vec![RequiredAction::Clamp { range_scale: 0.5 }],
        ));
        scheduler.tick(); // absorb the directive
        scheduler.enqueue(&compiled, clock.now()).unwrap();
        run_ticks(&mut scheduler, &clock, 40);
        let snapshot = scheduler.snapshot_handle().load_full();
        // Half range about rest: max becomes 15°
        assert!(snapshot[0].current_deg <= 15.0 + 1e-6);
    }

    #[test]
    fn test_all_clear_releases_clamp() {
        let (mut scheduler, clock, safety, _writes, _fail) = rig();
        safety.publish(SafetyDirective::new(
            crate::safety::Severity::High,
            crate::safety::SafetyReason::CrowdPressure { count: 9 },
            vec![RequiredAction::Clamp { range_scale: 0.5 }],
        ));
        scheduler.tick();

        safety.publish(SafetyDirective::new(
            crate::safety::Severity::None,
            crate::safety::SafetyReason::AllClear,
            vec![],
        ));
        scheduler.tick();

        let compiled = single_channel(vec![Keyframe::new(28.0, 0.5, Easing::Linear)]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();
        run_ticks(&mut scheduler, &clock, 40);
        let snapshot = scheduler.snapshot_handle().load_full();
        assert_relative_eq!(snapshot[0].current_deg, 28.0, epsilon = 0.1);
    }

    #[test]
    fn test_anticipation_lead_dips_against_travel() {
        let (mut scheduler, clock, _safety, _writes, _fail) = rig();
        let mut kf = Keyframe::new(20.0, 1.0, Easing::Linear);
        kf.anticipation_lead_s = 0.2;
        let compiled = single_channel(vec![kf]);
        scheduler.enqueue(&compiled, clock.now()).unwrap();

        // Mid-lead the joint should sit below the plain linear ramp
        run_ticks(&mut scheduler, &clock, 5); // 0.1 s
        let during_lead = scheduler.snapshot_handle().load_full()[0].current_deg;
        let plain_linear = 20.0 * 0.1;
        assert!(during_lead < plain_linear);

        // And still reach the target cleanly
        run_ticks(&mut scheduler, &clock, 55);
        let final_deg = scheduler.snapshot_handle().load_full()[0].current_deg;
        assert_relative_eq!(final_deg, 20.0, epsilon = 0.1);
    }

    #[test]
    fn test_scheduled_channel_waits_for_start() {
        let (mut scheduler, clock, _safety, writes, _fail) = rig();
        let mut compiled = single_channel(vec![Keyframe::new(10.0, 0.2, Easing::Linear)]);
        compiled.channels[0].start_offset_s = 0.5;
        scheduler.enqueue(&compiled, clock.now()).unwrap();
        run_ticks(&mut scheduler, &clock, 10); // 0.2 s: still waiting
        assert!(writes.lock().is_empty());
        run_ticks(&mut scheduler, &clock, 20);
        assert!(!writes.lock().is_empty());
    }
}

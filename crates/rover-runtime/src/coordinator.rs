//! [`DriveCoordinator`] – the drive state machine and its per-cycle step.
//!
//! Every control cycle runs, without suspending:
//!
//! 1. **Snapshot** – one point-in-time copy of the command source registry.
//! 2. **Arbitrate** – [`arbiter::select`] picks the active source, or
//!    reports that nothing is fresh.
//! 3. **Model** – the configured [`KinematicModel`] maps the winning intent
//!    to per-actuator targets stamped with this cycle's decision instant.
//! 4. **Limit** – the [`Limiter`] clamps targets against the previous
//!    cycle's output.
//! 5. **Dispatch** – [`ActuatorRegistry::dispatch`], fire-and-forget.
//! 6. **Report** – a [`DiagnosticReport`] is stored for the handle and
//!    published on the bus.
//!
//! # States
//!
//! | State | Entered when | Output |
//! |---|---|---|
//! | `INIT` | startup, or a re-arm accepted from SAFE_STOP | zeros until a source is fresh |
//! | `ACTIVE(id)` | a fresh source wins arbitration | limited model output |
//! | `DEGRADED` | nothing fresh for at most `grace_cycles` cycles | previous output, velocities decayed |
//! | `SAFE_STOP` | grace exceeded, repeated invalid intents, repeated dispatch failures, emergency stop | zeros every cycle |
//!
//! Leaving SAFE_STOP needs a re-arm request *and* a fresh source at the
//! cycle that consumes the request.  Every other transition is automatic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rover_hal::{ActuatorRegistry, DispatchReport};
use rover_kernel::arbiter::{self, ArbiterOutcome};
use rover_kernel::{CommandSourceRegistry, Limiter, watchdog};
use rover_kinematics::KinematicModel;
use rover_middleware::{EventBus, Topic};
use rover_types::{
    ActuatorCommand, ActuatorTarget, Clock, CoordinatorState, DiagnosticReport, DriveError, Event,
    EventPayload, SourceState, VelocityIntent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::streak::FailureStreak;

const EVENT_SOURCE: &str = "rover-runtime::coordinator";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Timing and escalation settings for [`DriveCoordinator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Control loop period in milliseconds.
    pub period_ms: u64,
    /// Consecutive no-fresh-source cycles spent in DEGRADED before SAFE_STOP.
    pub grace_cycles: u32,
    /// Factor applied to held velocity targets on every DEGRADED cycle.
    pub degraded_decay: f32,
    /// Consecutive cycles with a dispatch failure before SAFE_STOP.
    pub max_dispatch_failures: u32,
    /// Consecutive intents rejected by the kinematic model before SAFE_STOP.
    pub max_invalid_intents: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            period_ms: 50,
            grace_cycles: 5,
            degraded_decay: 0.5,
            max_dispatch_failures: 3,
            max_invalid_intents: 3,
        }
    }
}

impl CoordinatorConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// # Errors
    ///
    /// Returns [`DriveError::Config`] for a zero period, a decay factor
    /// outside `0.0..=1.0`, or zero escalation thresholds.
    pub fn validate(&self) -> Result<(), DriveError> {
        if self.period_ms == 0 {
            return Err(DriveError::Config("coordinator.period_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.degraded_decay) {
            return Err(DriveError::Config(format!(
                "coordinator.degraded_decay must be within 0..=1, got {}",
                self.degraded_decay
            )));
        }
        if self.max_dispatch_failures == 0 || self.max_invalid_intents == 0 {
            return Err(DriveError::Config(
                "coordinator escalation thresholds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared status and signals
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct Signals {
    pub(crate) rearm: bool,
    pub(crate) emergency_stop: Option<String>,
    pub(crate) shutdown: bool,
}

/// State shared between the coordinator and its handles.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) signals: Mutex<Signals>,
    pub(crate) notify: Notify,
    pub(crate) state: RwLock<CoordinatorState>,
    pub(crate) report: RwLock<Option<DiagnosticReport>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            signals: Mutex::new(Signals::default()),
            notify: Notify::new(),
            state: RwLock::new(CoordinatorState::Init),
            report: RwLock::new(None),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DriveCoordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the control loop's state.  Mutated only by the loop.
pub struct DriveCoordinator {
    config: CoordinatorConfig,
    registry: Arc<CommandSourceRegistry>,
    model: Box<dyn KinematicModel>,
    limiter: Limiter,
    actuators: ActuatorRegistry,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    state: CoordinatorState,
    /// Last target set handed to the dispatcher.
    previous: Vec<ActuatorTarget>,
    last_cycle_at: Option<Instant>,
    cycle: u64,
    none_fresh: FailureStreak,
    dispatch_failures: FailureStreak,
    invalid_intents: FailureStreak,
    rearm_requested: bool,
    safe_stop_reason: Option<String>,
    shared: Arc<Shared>,
}

impl DriveCoordinator {
    /// Build a coordinator in `INIT`.
    ///
    /// The coordinator's clock is taken from `registry`, so receive times and
    /// cycle instants come from the same source.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Config`] when `config` is invalid or an actuator
    /// the model commands has no registered driver.
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<CommandSourceRegistry>,
        model: Box<dyn KinematicModel>,
        actuators: ActuatorRegistry,
    ) -> Result<Self, DriveError> {
        config.validate()?;
        let missing: Vec<&str> = model
            .actuator_ids()
            .iter()
            .filter(|id| !actuators.contains(id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(DriveError::Config(format!(
                "no driver registered for actuators: {}",
                missing.join(", ")
            )));
        }

        let clock = registry.clock();
        Ok(Self {
            none_fresh: FailureStreak::new(config.grace_cycles.saturating_add(1)),
            dispatch_failures: FailureStreak::new(config.max_dispatch_failures),
            invalid_intents: FailureStreak::new(config.max_invalid_intents),
            config,
            registry,
            model,
            limiter: Limiter::default(),
            actuators,
            bus: EventBus::default(),
            clock,
            state: CoordinatorState::Init,
            previous: Vec::new(),
            last_cycle_at: None,
            cycle: 0,
            rearm_requested: false,
            safe_stop_reason: None,
            shared: Arc::new(Shared::new()),
        })
    }

    pub fn with_limiter(mut self, limiter: Limiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Publish diagnostics and targets on `bus` instead of a private bus.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// The last target set handed to the dispatcher.
    pub fn last_output(&self) -> &[ActuatorTarget] {
        &self.previous
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    // -------------------------------------------------------------------------
    // External signals
    // -------------------------------------------------------------------------

    /// Ask to leave SAFE_STOP.  Consumed by the next [`step`][Self::step];
    /// discarded if no source is fresh at that cycle.
    pub fn request_rearm(&mut self) {
        self.rearm_requested = true;
    }

    /// Enter SAFE_STOP now and dispatch the all-zero target set without
    /// waiting for the next cycle.  Any pending re-arm is cancelled.
    pub fn emergency_stop(&mut self, reason: &str, now: Instant) -> DiagnosticReport {
        self.rearm_requested = false;
        self.enter_safe_stop(reason);
        let zeros = self.model.zero_targets(now);
        let snapshot = self.registry.snapshot();
        self.dispatch_and_report(zeros, &snapshot, now)
    }

    // -------------------------------------------------------------------------
    // Control cycle
    // -------------------------------------------------------------------------

    /// Run one control cycle at `now`.
    pub fn step(&mut self, now: Instant) -> DiagnosticReport {
        self.cycle += 1;
        let dt = self
            .last_cycle_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_else(|| self.config.period());
        self.last_cycle_at = Some(now);

        let snapshot = self.registry.snapshot();
        let outcome = arbiter::select(&snapshot, now);
        let rearm = std::mem::take(&mut self.rearm_requested);

        if self.state.is_safe_stop() {
            match (&outcome, rearm) {
                (ArbiterOutcome::Active { source_id, .. }, true) => {
                    info!(source_id = %source_id, "re-armed from SAFE_STOP");
                    self.safe_stop_reason = None;
                    self.none_fresh.reset();
                    self.dispatch_failures.reset();
                    self.invalid_intents.reset();
                    self.transition(CoordinatorState::Init);
                }
                (ArbiterOutcome::NoneFresh, true) => {
                    warn!("re-arm discarded: no fresh command source");
                    let zeros = self.model.zero_targets(now);
                    return self.dispatch_and_report(zeros, &snapshot, now);
                }
                (_, false) => {
                    let zeros = self.model.zero_targets(now);
                    return self.dispatch_and_report(zeros, &snapshot, now);
                }
            }
        }

        let targets = match outcome {
            ArbiterOutcome::Active { source_id, intent } => self.drive(source_id, &intent, dt, now),
            ArbiterOutcome::NoneFresh => self.coast(now),
        };
        self.dispatch_and_report(targets, &snapshot, now)
    }

    fn drive(
        &mut self,
        source_id: String,
        intent: &VelocityIntent,
        dt: Duration,
        now: Instant,
    ) -> Vec<ActuatorTarget> {
        self.none_fresh.reset();
        match self.model.compute(intent, now) {
            Ok(raw) => {
                self.invalid_intents.reset();
                let limited = self.limiter.clamp(&raw, &self.previous, dt);
                self.transition(CoordinatorState::Active(source_id));
                limited
            }
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "intent discarded; holding previous output");
                if self.invalid_intents.record() {
                    self.enter_safe_stop(&format!(
                        "{} consecutive invalid intents from '{source_id}'",
                        self.invalid_intents.count()
                    ));
                    return self.model.zero_targets(now);
                }
                self.held(now)
            }
        }
    }

    fn coast(&mut self, now: Instant) -> Vec<ActuatorTarget> {
        // Grace only runs once a source has been ACTIVE.
        if self.state == CoordinatorState::Init {
            return self.model.zero_targets(now);
        }
        if self.none_fresh.record() {
            self.enter_safe_stop(&format!(
                "no fresh command source for {} cycles",
                self.none_fresh.count()
            ));
            return self.model.zero_targets(now);
        }
        self.transition(CoordinatorState::Degraded);
        self.decayed(now)
    }

    /// The previous output re-issued at `now`.
    fn held(&self, now: Instant) -> Vec<ActuatorTarget> {
        if self.previous.is_empty() {
            return self.model.zero_targets(now);
        }
        self.previous.iter().map(|t| t.restamped(now)).collect()
    }

    /// The previous output with velocities scaled by the decay factor and
    /// steering angles held.
    fn decayed(&self, now: Instant) -> Vec<ActuatorTarget> {
        let decay = self.config.degraded_decay;
        self.held(now)
            .into_iter()
            .map(|mut target| {
                if let ActuatorCommand::Velocity(v) = target.command {
                    target.command = ActuatorCommand::Velocity(v * decay);
                }
                target
            })
            .collect()
    }

    fn dispatch_and_report(
        &mut self,
        targets: Vec<ActuatorTarget>,
        snapshot: &[SourceState],
        now: Instant,
    ) -> DiagnosticReport {
        let dispatch = self.actuators.dispatch(&targets, now);
        self.previous = targets;
        self.track_dispatch(&dispatch, now);

        let report = DiagnosticReport {
            cycle: self.cycle,
            state: self.state.clone(),
            active_source: self.state.active_source().map(str::to_string),
            sources: watchdog::assess(snapshot, now),
            dispatched: dispatch.dispatched,
            feedback: self.actuators.feedback(),
            consecutive_none_fresh: self.none_fresh.count(),
            consecutive_dispatch_failures: self.dispatch_failures.count(),
            safe_stop_reason: self.safe_stop_reason.clone(),
        };
        debug!(
            cycle = report.cycle,
            state = %report.state,
            dispatched = report.dispatched.len(),
            "cycle complete"
        );

        *self.shared.state.write() = self.state.clone();
        *self.shared.report.write() = Some(report.clone());
        self.bus.publish_to(
            Topic::ActuatorTargets,
            Event::new(EVENT_SOURCE, EventPayload::ActuatorTargets(report.dispatched.clone())),
        );
        self.bus.publish_to(
            Topic::Diagnostics,
            Event::new(EVENT_SOURCE, EventPayload::Diagnostics(report.clone())),
        );
        report
    }

    fn track_dispatch(&mut self, dispatch: &DispatchReport, now: Instant) {
        if dispatch.failures.is_empty() {
            self.dispatch_failures.reset();
            return;
        }
        for failure in &dispatch.failures {
            warn!(error = %failure, "actuator dispatch failure");
        }
        if self.dispatch_failures.record() && !self.state.is_safe_stop() {
            self.enter_safe_stop(&format!(
                "{} consecutive cycles with dispatch failures",
                self.dispatch_failures.count()
            ));
            // Best effort: try to bring every actuator to rest right away.
            let zeros = self.model.zero_targets(now);
            let retry = self.actuators.dispatch(&zeros, now);
            if !retry.failures.is_empty() {
                error!(failures = retry.failures.len(), "zero targets could not be dispatched");
            }
            self.previous = zeros;
        }
    }

    fn enter_safe_stop(&mut self, reason: &str) {
        if !self.state.is_safe_stop() {
            error!(reason, "entering SAFE_STOP");
            self.bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    EVENT_SOURCE,
                    EventPayload::Fault {
                        component: "drive_coordinator".to_string(),
                        message: reason.to_string(),
                    },
                ),
            );
        }
        self.safe_stop_reason = Some(reason.to_string());
        self.transition(CoordinatorState::SafeStop);
    }

    fn transition(&mut self, next: CoordinatorState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "coordinator state change");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::{SimHandles, SimRegistry};
    use rover_kernel::{ActuatorBounds, LimiterConfig};
    use rover_kinematics::{AckermannDrive, DifferentialDrive};
    use rover_types::{CommandSource, ManualClock};

    const PERIOD: Duration = Duration::from_millis(50);
    const STALENESS: Duration = Duration::from_millis(200);

    struct Rig {
        coordinator: DriveCoordinator,
        registry: Arc<CommandSourceRegistry>,
        clock: ManualClock,
        wheels: SimHandles,
    }

    impl Rig {
        fn tick(&mut self) -> DiagnosticReport {
            self.clock.advance(PERIOD);
            self.coordinator.step(self.clock.now())
        }

        fn send(&self, source_id: &str, linear_x: f32, angular_z: f32) {
            self.registry
                .update(source_id, VelocityIntent::new(source_id, linear_x, 0.0, angular_z))
                .unwrap();
        }

        fn values(&self) -> Vec<f32> {
            self.coordinator.last_output().iter().map(|t| t.value()).collect()
        }
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            period_ms: 50,
            grace_cycles: 3,
            degraded_decay: 0.5,
            max_dispatch_failures: 2,
            max_invalid_intents: 2,
        }
    }

    fn wide_open() -> Limiter {
        Limiter::new(LimiterConfig::uniform(ActuatorBounds {
            max_velocity: 10.0,
            max_acceleration: 1000.0,
            max_angle: 1.0,
            max_angle_rate: 1000.0,
        }))
    }

    fn rig_with(sources: &[CommandSource], config: CoordinatorConfig) -> Rig {
        let clock = ManualClock::new();
        let registry = Arc::new(CommandSourceRegistry::with_clock(Arc::new(clock.clone())));
        for source in sources {
            registry.register(source.clone()).unwrap();
        }
        let model = DifferentialDrive::new(0.5, 2.0);
        let (actuators, wheels) = SimRegistry::builder()
            .with_actuators(model.actuator_ids().to_vec())
            .build();
        let coordinator = DriveCoordinator::new(config, Arc::clone(&registry), Box::new(model), actuators)
            .unwrap()
            .with_limiter(wide_open());
        Rig {
            coordinator,
            registry,
            clock,
            wheels,
        }
    }

    fn rig() -> Rig {
        rig_with(
            &[
                CommandSource::new("autonomy", 1, STALENESS),
                CommandSource::new("teleop", 5, STALENESS),
                CommandSource::new("estop_pad", 0, STALENESS).safety_override(),
            ],
            config(),
        )
    }

    #[test]
    fn init_with_no_source_dispatches_zeros() {
        let mut rig = rig();
        for _ in 0..10 {
            let report = rig.tick();
            assert_eq!(report.state, CoordinatorState::Init);
            assert!(report.dispatched.iter().all(|t| t.command.value() == 0.0));
            assert_eq!(report.consecutive_none_fresh, 0);
        }
    }

    #[test]
    fn grace_counts_from_the_first_silent_cycle_after_activation() {
        let mut rig = rig();
        for _ in 0..10 {
            rig.tick();
        }
        rig.send("teleop", 0.4, 0.0);
        rig.tick();
        // 200 ms staleness at 50 ms per cycle: fresh for three more cycles.
        for _ in 0..3 {
            assert_eq!(rig.tick().consecutive_none_fresh, 0);
        }
        let report = rig.tick();
        assert_eq!(report.state, CoordinatorState::Degraded);
        assert_eq!(report.consecutive_none_fresh, 1);
    }

    #[test]
    fn fresh_source_activates_and_drives_wheels() {
        let mut rig = rig();
        rig.send("teleop", 1.0, 0.0);
        let report = rig.tick();
        assert_eq!(report.state, CoordinatorState::Active("teleop".into()));
        assert_eq!(report.active_source.as_deref(), Some("teleop"));
        assert_eq!(rig.values(), vec![1.0, 1.0]);
        assert_eq!(
            rig.wheels["right_wheel"].last(),
            Some(ActuatorCommand::Velocity(1.0))
        );
    }

    #[test]
    fn override_source_takes_precedence() {
        let mut rig = rig();
        rig.send("teleop", 1.0, 0.0);
        rig.tick();
        rig.send("estop_pad", 0.0, 0.0);
        rig.send("teleop", 1.0, 0.0);
        let report = rig.tick();
        assert_eq!(report.state, CoordinatorState::Active("estop_pad".into()));
        assert_eq!(rig.values(), vec![0.0, 0.0]);
    }

    #[test]
    fn higher_priority_source_wins_and_state_switches() {
        let mut rig = rig();
        rig.send("autonomy", 0.2, 0.0);
        assert_eq!(rig.tick().state, CoordinatorState::Active("autonomy".into()));
        rig.send("teleop", 0.4, 0.0);
        rig.send("autonomy", 0.2, 0.0);
        assert_eq!(rig.tick().state, CoordinatorState::Active("teleop".into()));
    }

    #[test]
    fn stale_source_degrades_then_safe_stops_with_decaying_then_zero_targets() {
        let mut rig = rig();
        rig.send("teleop", 1.0, 0.0);
        rig.tick();
        assert_eq!(rig.values(), vec![1.0, 1.0]);

        // 200 ms staleness at 50 ms per cycle: fresh for three more cycles.
        for _ in 0..3 {
            assert_eq!(rig.tick().state, CoordinatorState::Active("teleop".into()));
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let report = rig.tick();
            assert_eq!(report.state, CoordinatorState::Degraded);
            seen.push(rig.values()[0]);
        }
        assert_eq!(seen, vec![0.5, 0.25, 0.125]);

        let report = rig.tick();
        assert_eq!(report.state, CoordinatorState::SafeStop);
        assert!(report.safe_stop_reason.is_some());
        assert_eq!(rig.values(), vec![0.0, 0.0]);

        // Nothing non-zero is dispatched after the grace period.
        for _ in 0..20 {
            let report = rig.tick();
            assert!(report.state.is_safe_stop());
            assert!(report.dispatched.iter().all(|t| t.command.value() == 0.0));
        }
    }

    #[test]
    fn fresh_source_during_degraded_recovers_without_rearm() {
        let mut rig = rig();
        rig.send("teleop", 1.0, 0.0);
        rig.tick();
        rig.clock.advance(Duration::from_millis(250));
        assert_eq!(rig.tick().state, CoordinatorState::Degraded);
        rig.send("autonomy", 0.3, 0.0);
        assert_eq!(rig.tick().state, CoordinatorState::Active("autonomy".into()));
    }

    fn force_safe_stop(rig: &mut Rig) {
        rig.send("teleop", 1.0, 0.0);
        rig.tick();
        rig.clock.advance(Duration::from_secs(1));
        while !rig.tick().state.is_safe_stop() {}
    }

    #[test]
    fn rearm_with_all_sources_stale_stays_in_safe_stop() {
        let mut rig = rig();
        force_safe_stop(&mut rig);

        rig.coordinator.request_rearm();
        let report = rig.tick();
        assert!(report.state.is_safe_stop());

        // The request was consumed: a source appearing later does not re-arm.
        rig.send("teleop", 0.5, 0.0);
        assert!(rig.tick().state.is_safe_stop());
        assert_eq!(rig.values(), vec![0.0, 0.0]);
    }

    #[test]
    fn fresh_source_without_rearm_stays_in_safe_stop() {
        let mut rig = rig();
        force_safe_stop(&mut rig);
        for _ in 0..5 {
            rig.send("teleop", 0.5, 0.0);
            assert!(rig.tick().state.is_safe_stop());
        }
    }

    #[test]
    fn rearm_with_fresh_source_resumes_from_zero() {
        let mut rig = rig();
        rig.coordinator = rig.coordinator.with_limiter(Limiter::new(LimiterConfig::uniform(
            ActuatorBounds {
                max_velocity: 1.0,
                max_acceleration: 2.0,
                ..ActuatorBounds::default()
            },
        )));
        force_safe_stop(&mut rig);

        rig.send("teleop", 1.0, 0.0);
        rig.coordinator.request_rearm();
        let report = rig.tick();
        assert_eq!(report.state, CoordinatorState::Active("teleop".into()));
        assert!(report.safe_stop_reason.is_none());
        // Ramps from the zeros dispatched in SAFE_STOP: 2 m/s² * 50 ms.
        assert!(rig.values().iter().all(|v| (v - 0.1).abs() < 1e-6));
    }

    #[test]
    fn invalid_intent_holds_previous_output_then_escalates() {
        let mut rig = rig();
        rig.send("teleop", 0.8, 0.0);
        rig.tick();

        // 2 m/s wheel limit: spinning at 10 rad/s on a 0.5 m track is out of envelope.
        rig.send("teleop", 0.0, 10.0);
        let report = rig.tick();
        assert_eq!(report.state, CoordinatorState::Active("teleop".into()));
        assert_eq!(rig.values(), vec![0.8, 0.8]);

        rig.send("teleop", 0.0, 10.0);
        let report = rig.tick();
        assert!(report.state.is_safe_stop());
        assert!(report.safe_stop_reason.unwrap().contains("invalid intents"));
        assert_eq!(rig.values(), vec![0.0, 0.0]);
    }

    #[test]
    fn valid_intent_resets_invalid_streak() {
        let mut rig = rig();
        for _ in 0..5 {
            rig.send("teleop", 0.0, 10.0);
            rig.tick();
            rig.send("teleop", 0.3, 0.0);
            assert_eq!(rig.tick().state, CoordinatorState::Active("teleop".into()));
        }
    }

    #[test]
    fn repeated_dispatch_failures_escalate_to_safe_stop() {
        let mut rig = rig();
        rig.send("teleop", 0.5, 0.0);
        rig.tick();

        rig.wheels["left_wheel"].set_failing(true);
        rig.send("teleop", 0.5, 0.0);
        let report = rig.tick();
        assert_eq!(report.consecutive_dispatch_failures, 1);
        assert_eq!(report.state, CoordinatorState::Active("teleop".into()));
        // The healthy wheel still received its target.
        assert_eq!(report.dispatched.len(), 1);

        rig.send("teleop", 0.5, 0.0);
        let report = rig.tick();
        assert!(report.state.is_safe_stop());
        assert_eq!(
            rig.wheels["right_wheel"].last(),
            Some(ActuatorCommand::Velocity(0.0))
        );
    }

    #[test]
    fn single_dispatch_failure_is_retried_next_cycle() {
        let mut rig = rig();
        rig.wheels["left_wheel"].fail_next(1);
        rig.send("teleop", 0.5, 0.0);
        assert_eq!(rig.tick().consecutive_dispatch_failures, 1);
        rig.send("teleop", 0.5, 0.0);
        let report = rig.tick();
        assert_eq!(report.consecutive_dispatch_failures, 0);
        assert_eq!(
            rig.wheels["left_wheel"].last(),
            Some(ActuatorCommand::Velocity(0.5))
        );
    }

    #[test]
    fn emergency_stop_is_immediate_and_cancels_rearm() {
        let mut rig = rig();
        rig.send("teleop", 1.0, 0.0);
        rig.tick();
        rig.coordinator.request_rearm();

        let report = rig.coordinator.emergency_stop("operator", rig.clock.now());
        assert!(report.state.is_safe_stop());
        assert_eq!(report.safe_stop_reason.as_deref(), Some("operator"));
        assert_eq!(
            rig.wheels["left_wheel"].last(),
            Some(ActuatorCommand::Velocity(0.0))
        );

        rig.send("teleop", 1.0, 0.0);
        assert!(rig.tick().state.is_safe_stop());
    }

    #[test]
    fn every_dispatched_target_carries_the_cycle_instant() {
        let mut rig = rig();
        rig.send("teleop", 0.5, 0.0);
        rig.tick();
        let now = rig.clock.now();
        assert!(rig.coordinator.last_output().iter().all(|t| t.generated_at == now));

        rig.clock.advance(Duration::from_millis(300));
        rig.tick();
        let now = rig.clock.now();
        assert_eq!(rig.coordinator.state(), &CoordinatorState::Degraded);
        assert!(rig.coordinator.last_output().iter().all(|t| t.generated_at == now));
    }

    #[test]
    fn zero_grace_goes_straight_to_safe_stop() {
        let mut rig = rig_with(
            &[CommandSource::new("teleop", 1, STALENESS)],
            CoordinatorConfig {
                grace_cycles: 0,
                ..config()
            },
        );
        rig.send("teleop", 0.5, 0.0);
        rig.tick();
        rig.clock.advance(Duration::from_secs(1));
        assert!(rig.tick().state.is_safe_stop());
    }

    #[test]
    fn degraded_holds_steering_angles() {
        let clock = ManualClock::new();
        let registry = Arc::new(CommandSourceRegistry::with_clock(Arc::new(clock.clone())));
        registry
            .register(CommandSource::new("autonomy", 1, STALENESS))
            .unwrap();
        let model = AckermannDrive::new(1.0, 0.6, 3.0, 0.6);
        let (actuators, _) = SimRegistry::builder()
            .with_actuators(model.actuator_ids().to_vec())
            .build();
        let mut coordinator =
            DriveCoordinator::new(config(), Arc::clone(&registry), Box::new(model), actuators)
                .unwrap()
                .with_limiter(wide_open());

        registry
            .update("autonomy", VelocityIntent::new("autonomy", 1.0, 0.0, 0.5))
            .unwrap();
        clock.advance(PERIOD);
        coordinator.step(clock.now());
        let before: Vec<ActuatorTarget> = coordinator.last_output().to_vec();

        clock.advance(Duration::from_millis(300));
        coordinator.step(clock.now());
        assert_eq!(coordinator.state(), &CoordinatorState::Degraded);

        for (old, new) in before.iter().zip(coordinator.last_output()) {
            match (old.command, new.command) {
                (ActuatorCommand::Angle(a), ActuatorCommand::Angle(b)) => assert_eq!(a, b),
                (ActuatorCommand::Velocity(a), ActuatorCommand::Velocity(b)) => {
                    assert!((b - a * 0.5).abs() < 1e-6)
                }
                other => panic!("command kinds changed: {other:?}"),
            }
        }
    }

    #[test]
    fn missing_driver_is_a_config_error() {
        let registry = Arc::new(CommandSourceRegistry::new());
        let (actuators, _) = SimRegistry::builder().with_actuator("left_wheel").build();
        let err = DriveCoordinator::new(
            config(),
            registry,
            Box::new(DifferentialDrive::new(0.5, 1.0)),
            actuators,
        )
        .err()
        .unwrap();
        assert!(matches!(err, DriveError::Config(msg) if msg.contains("right_wheel")));
    }

    #[test]
    fn invalid_config_is_rejected() {
        for bad in [
            CoordinatorConfig { period_ms: 0, ..config() },
            CoordinatorConfig { degraded_decay: 1.5, ..config() },
            CoordinatorConfig { max_invalid_intents: 0, ..config() },
        ] {
            assert!(matches!(bad.validate(), Err(DriveError::Config(_))));
        }
        assert!(CoordinatorConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn diagnostics_and_alerts_are_published() {
        let mut rig = rig();
        let bus = rig.coordinator.bus();
        let mut diagnostics = bus.subscribe_to(Topic::Diagnostics);
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);

        rig.send("teleop", 0.5, 0.0);
        rig.tick();
        match diagnostics.try_next().map(|e| e.payload) {
            Some(EventPayload::Diagnostics(report)) => {
                assert_eq!(report.cycle, 1);
                assert_eq!(report.sources.len(), 3);
            }
            other => panic!("expected diagnostics, got {other:?}"),
        }

        rig.coordinator.emergency_stop("test", rig.clock.now());
        assert!(matches!(
            alerts.try_next().map(|e| e.payload),
            Some(EventPayload::Fault { .. })
        ));
    }
}

//! In-process simulated drive base for tests and the operator CLI.
//!
//! [`SimRegistry`] builds an [`ActuatorRegistry`] whose every slot is a
//! [`SimActuator`].  Each simulated actuator records the commands it
//! receives and reports a first-order-lag measurement as feedback.  A
//! cloneable [`SimActuatorHandle`] lets a test inspect the history or inject
//! dispatch faults while the registry is owned by the coordinator.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use rover_hal::sim::SimRegistry;
//! use rover_types::ActuatorTarget;
//!
//! let (mut registry, handles) = SimRegistry::builder()
//!     .with_actuator("left_wheel")
//!     .with_actuator("right_wheel")
//!     .build();
//!
//! let now = Instant::now();
//! registry.dispatch(&[ActuatorTarget::velocity("left_wheel", 0.5, now)], now);
//! assert_eq!(handles["left_wheel"].last().map(|c| c.value()), Some(0.5));
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rover_types::{ActuatorCommand, DriveError};

use crate::actuator::Actuator;
use crate::registry::ActuatorRegistry;

// ────────────────────────────────────────────────────────────────────────────
// Simulated actuator
// ────────────────────────────────────────────────────────────────────────────

/// Commands kept per actuator unless overridden with
/// [`SimActuator::with_history_limit`].
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct SimState {
    /// Newest at the back; never longer than `history_limit`.
    history: VecDeque<ActuatorCommand>,
    history_limit: usize,
    measured: Option<f32>,
    fail_remaining: u32,
    failing: bool,
}

/// A simulated wheel or steering servo.
///
/// Feedback moves toward each accepted command by `response` (0..=1) of the
/// remaining error, so `response = 1.0` tracks the command exactly.
#[derive(Debug)]
pub struct SimActuator {
    id: String,
    response: f32,
    state: Arc<Mutex<SimState>>,
}

impl SimActuator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            response: 1.0,
            state: Arc::new(Mutex::new(SimState {
                history_limit: DEFAULT_HISTORY_LIMIT,
                ..SimState::default()
            })),
        }
    }

    /// Keep at most `limit` commands (at least one), dropping the oldest.
    pub fn with_history_limit(self, limit: usize) -> Self {
        self.state.lock().history_limit = limit.max(1);
        self
    }

    pub fn with_response(mut self, response: f32) -> Self {
        self.response = response.clamp(0.0, 1.0);
        self
    }

    /// A handle sharing this actuator's recorded state.
    pub fn handle(&self) -> SimActuatorHandle {
        SimActuatorHandle {
            id: self.id.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn command(&mut self, command: &ActuatorCommand) -> Result<(), DriveError> {
        let mut state = self.state.lock();
        if state.failing || state.fail_remaining > 0 {
            state.fail_remaining = state.fail_remaining.saturating_sub(1);
            return Err(DriveError::ActuatorDispatchFailure {
                actuator_id: self.id.clone(),
                details: "simulated controller fault".to_string(),
            });
        }
        let previous = state.measured.unwrap_or(0.0);
        state.measured = Some(previous + self.response * (command.value() - previous));
        if state.history.len() >= state.history_limit {
            state.history.pop_front();
        }
        state.history.push_back(*command);
        Ok(())
    }

    fn feedback(&self) -> Option<f32> {
        self.state.lock().measured
    }
}

/// Shared view of a [`SimActuator`] for tests.
#[derive(Debug, Clone)]
pub struct SimActuatorHandle {
    id: String,
    state: Arc<Mutex<SimState>>,
}

impl SimActuatorHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last accepted command.
    pub fn last(&self) -> Option<ActuatorCommand> {
        self.state.lock().history.back().copied()
    }

    /// The most recent accepted commands, oldest first.
    pub fn history(&self) -> Vec<ActuatorCommand> {
        self.state.lock().history.iter().copied().collect()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Reject the next `n` commands.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_remaining = n;
    }

    /// Reject every command until called again with `false`.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRegistry builder
// ────────────────────────────────────────────────────────────────────────────

/// Handles to the simulated actuators of one [`SimRegistry`], by id.
pub type SimHandles = BTreeMap<String, SimActuatorHandle>;

/// Builder that constructs an [`ActuatorRegistry`] populated with
/// [`SimActuator`]s.
#[derive(Debug, Clone)]
pub struct SimRegistry {
    actuator_ids: Vec<String>,
    response: f32,
    history_limit: usize,
}

impl Default for SimRegistry {
    fn default() -> Self {
        Self {
            actuator_ids: Vec::new(),
            response: 1.0,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SimRegistry {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn with_actuator(mut self, id: impl Into<String>) -> Self {
        self.actuator_ids.push(id.into());
        self
    }

    /// Add one actuator per id, typically a kinematic model's
    /// `actuator_ids()`.
    pub fn with_actuators<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actuator_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Feedback response factor applied to every actuator.
    pub fn with_response(mut self, response: f32) -> Self {
        self.response = response;
        self
    }

    /// Per-actuator command history bound.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn build(self) -> (ActuatorRegistry, SimHandles) {
        let mut registry = ActuatorRegistry::new();
        let mut handles = SimHandles::new();
        for id in self.actuator_ids {
            let actuator = SimActuator::new(id.clone())
                .with_response(self.response)
                .with_history_limit(self.history_limit);
            handles.insert(id, actuator.handle());
            registry.register(Box::new(actuator));
        }
        (registry, handles)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

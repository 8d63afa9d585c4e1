//! `rover-types` – shared data model for the rover drive stack.
//!
//! Every crate in the workspace speaks in these types: the intents produced
//! by command sources, the per-actuator targets produced by the kinematic
//! model, the coordinator's state machine value, and the diagnostic events
//! published for external tooling.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

// ────────────────────────────────────────────────────────────────────────────
// Intents and sources
// ────────────────────────────────────────────────────────────────────────────

/// A requested motion in the rover's own reference frame.
///
/// Fields are private: an intent is immutable once created and is shared by
/// cloning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityIntent {
    linear_x: f32,
    linear_y: f32,
    angular_z: f32,
    timestamp: DateTime<Utc>,
    source_id: String,
}

impl VelocityIntent {
    /// Create an intent stamped with the current wall-clock time.
    ///
    /// Linear components are in m/s, `angular_z` in rad/s.
    pub fn new(source_id: impl Into<String>, linear_x: f32, linear_y: f32, angular_z: f32) -> Self {
        Self::with_timestamp(source_id, linear_x, linear_y, angular_z, Utc::now())
    }

    /// Create an intent with an explicit producer timestamp.
    pub fn with_timestamp(
        source_id: impl Into<String>,
        linear_x: f32,
        linear_y: f32,
        angular_z: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
            timestamp,
            source_id: source_id.into(),
        }
    }

    /// The all-zero intent for `source_id`.
    pub fn stop(source_id: impl Into<String>) -> Self {
        Self::new(source_id, 0.0, 0.0, 0.0)
    }

    pub fn linear_x(&self) -> f32 {
        self.linear_x
    }

    pub fn linear_y(&self) -> f32 {
        self.linear_y
    }

    pub fn angular_z(&self) -> f32 {
        self.angular_z
    }

    /// Producer-side creation time. Informational only; freshness is judged
    /// on the registry's monotonic receive time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// `true` when every velocity component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.linear_x.is_finite() && self.linear_y.is_finite() && self.angular_z.is_finite()
    }
}

/// Static description of an upstream command producer.
///
/// Registered once at startup and never changed while the process runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSource {
    pub source_id: String,
    /// Higher wins among non-override sources.
    pub priority: i32,
    /// A fresh override source beats every non-override source.
    #[serde(default)]
    pub is_safety_override: bool,
    #[serde(rename = "max_staleness_ms", with = "duration_ms")]
    pub max_staleness: Duration,
}

impl CommandSource {
    /// Describe a regular (non-override) source.
    pub fn new(source_id: impl Into<String>, priority: i32, max_staleness: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            priority,
            is_safety_override: false,
            max_staleness,
        }
    }

    /// Mark this source as a safety override (builder-style).
    pub fn safety_override(mut self) -> Self {
        self.is_safety_override = true;
        self
    }
}

/// The registry's record of one source: its descriptor plus the most recent
/// intent and the monotonic time it was received.
///
/// `last_intent` and `last_received_at` are `None` until the first intent
/// arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceState {
    pub source: CommandSource,
    pub last_intent: Option<VelocityIntent>,
    pub last_received_at: Option<Instant>,
}

impl SourceState {
    pub fn new(source: CommandSource) -> Self {
        Self {
            source,
            last_intent: None,
            last_received_at: None,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source.source_id
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actuator targets
// ────────────────────────────────────────────────────────────────────────────

/// What a single actuator is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActuatorCommand {
    /// Wheel or track surface speed in m/s.
    Velocity(f32),
    /// Steering angle in radians.
    Angle(f32),
}

impl ActuatorCommand {
    pub fn value(&self) -> f32 {
        match *self {
            ActuatorCommand::Velocity(v) | ActuatorCommand::Angle(v) => v,
        }
    }

    /// Same kind of command carrying `value`.
    pub fn with_value(&self, value: f32) -> Self {
        match self {
            ActuatorCommand::Velocity(_) => ActuatorCommand::Velocity(value),
            ActuatorCommand::Angle(_) => ActuatorCommand::Angle(value),
        }
    }

    /// Same kind of command at rest.
    pub fn zeroed(&self) -> Self {
        self.with_value(0.0)
    }
}

/// Output of the kinematic model for one actuator, consumed by the limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorTarget {
    pub actuator_id: String,
    pub command: ActuatorCommand,
    /// Instant of the arbitration decision this target was derived from.
    pub generated_at: Instant,
}

impl ActuatorTarget {
    pub fn velocity(actuator_id: impl Into<String>, velocity: f32, generated_at: Instant) -> Self {
        Self {
            actuator_id: actuator_id.into(),
            command: ActuatorCommand::Velocity(velocity),
            generated_at,
        }
    }

    pub fn angle(actuator_id: impl Into<String>, angle: f32, generated_at: Instant) -> Self {
        Self {
            actuator_id: actuator_id.into(),
            command: ActuatorCommand::Angle(angle),
            generated_at,
        }
    }

    pub fn value(&self) -> f32 {
        self.command.value()
    }

    /// Copy of this target re-issued at `generated_at`.
    pub fn restamped(&self, generated_at: Instant) -> Self {
        Self {
            generated_at,
            ..self.clone()
        }
    }

    /// Wire-friendly view without the monotonic timestamp.
    pub fn to_value(&self) -> TargetValue {
        TargetValue {
            actuator_id: self.actuator_id.clone(),
            command: self.command,
        }
    }
}

/// Serializable projection of an [`ActuatorTarget`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetValue {
    pub actuator_id: String,
    pub command: ActuatorCommand,
}

/// Most recent measurement reported by an actuator driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorFeedback {
    pub actuator_id: String,
    /// Achieved speed (m/s) or angle (rad), matching the command kind.
    pub measured: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Coordinator state and diagnostics
// ────────────────────────────────────────────────────────────────────────────

/// The drive coordinator's state machine value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "source_id", rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Started; no source has been selected yet.
    Init,
    /// Driving from the named source.
    Active(String),
    /// No fresh source; holding decaying targets within the grace period.
    Degraded,
    /// All actuators commanded to zero until re-armed.
    SafeStop,
}

impl CoordinatorState {
    /// The active source, if any.
    pub fn active_source(&self) -> Option<&str> {
        match self {
            CoordinatorState::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_safe_stop(&self) -> bool {
        matches!(self, CoordinatorState::SafeStop)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Init => write!(f, "INIT"),
            CoordinatorState::Active(id) => write!(f, "ACTIVE({id})"),
            CoordinatorState::Degraded => write!(f, "DEGRADED"),
            CoordinatorState::SafeStop => write!(f, "SAFE_STOP"),
        }
    }
}

/// Freshness verdict for one source at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Freshness {
    Fresh { age: Duration },
    Stale { age: Duration },
    /// No intent has ever been received from the source.
    NeverHeard,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFreshness {
    pub source_id: String,
    pub freshness: Freshness,
}

/// Per-cycle coordinator health, published for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub cycle: u64,
    pub state: CoordinatorState,
    pub active_source: Option<String>,
    pub sources: Vec<SourceFreshness>,
    pub dispatched: Vec<TargetValue>,
    pub feedback: Vec<ActuatorFeedback>,
    pub consecutive_none_fresh: u32,
    pub consecutive_dispatch_failures: u32,
    pub safe_stop_reason: Option<String>,
}

/// Envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "rover-runtime::coordinator"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Diagnostics(DiagnosticReport),
    /// The target set dispatched this cycle.
    ActuatorTargets(Vec<TargetValue>),
    /// Operator request to leave SAFE_STOP.
    Rearm,
    /// Immediate transition into SAFE_STOP.
    EmergencyStop { reason: String },
    Fault { component: String, message: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error taxonomy for the drive stack.
///
/// Only `DuplicateSource` and `UnknownSource` are fatal, and only at startup.
/// Runtime faults degrade the coordinator toward SAFE_STOP instead.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriveError {
    #[error("command source '{0}' is already registered")]
    DuplicateSource(String),

    #[error("command source '{0}' is not registered")]
    UnknownSource(String),

    #[error("intent rejected by kinematic model: {0}")]
    InvalidIntent(String),

    #[error("dispatch to actuator '{actuator_id}' failed: {details}")]
    ActuatorDispatchFailure { actuator_id: String, details: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel error: {0}")]
    Channel(String),
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

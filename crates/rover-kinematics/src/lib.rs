//! `rover-kinematics` – robot-frame intent to per-actuator targets.
//!
//! The model is a pure function: no I/O, no clamping.  An intent the
//! configured geometry cannot physically achieve is rejected with
//! [`DriveError::InvalidIntent`]; bringing achievable targets inside
//! velocity and acceleration bounds is the limiter's job.
//!
//! # Modules
//!
//! - [`geometry`] – [`GeometryConfig`][geometry::GeometryConfig]: the
//!   injected drive description that selects a strategy.
//! - [`differential`] – [`DifferentialDrive`][differential::DifferentialDrive]:
//!   two-sided drives, both the classic two-wheel base and multi-wheel
//!   skid steer.
//! - [`ackermann`] – [`AckermannDrive`][ackermann::AckermannDrive]:
//!   front-steered, rear-driven bases.

use std::fmt;
use std::time::Instant;

use rover_types::{ActuatorTarget, DriveError, VelocityIntent};

pub mod ackermann;
pub mod differential;
pub mod geometry;

pub use ackermann::AckermannDrive;
pub use differential::DifferentialDrive;
pub use geometry::GeometryConfig;

/// Lateral velocities smaller than this are treated as zero.
pub(crate) const LATERAL_EPSILON: f32 = 1e-6;

/// One drive geometry's intent-to-target mapping.
///
/// Implementations are selected by [`GeometryConfig::build`], so the
/// coordinator never branches on the geometry type.
pub trait KinematicModel: Send + Sync + fmt::Debug {
    /// Short label used in logs, e.g. `"differential"`.
    fn name(&self) -> &str;

    /// Every actuator this model commands, in dispatch order.
    fn actuator_ids(&self) -> &[String];

    /// Map `intent` to one target per actuator, stamped with `generated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::InvalidIntent`] when the intent lies outside the
    /// geometry's physical envelope.
    fn compute(
        &self,
        intent: &VelocityIntent,
        generated_at: Instant,
    ) -> Result<Vec<ActuatorTarget>, DriveError>;

    /// The all-at-rest target set for this geometry.
    fn zero_targets(&self, generated_at: Instant) -> Vec<ActuatorTarget>;
}

/// Compute targets for `intent` on the drive described by `geometry`.
///
/// Convenience wrapper that builds the strategy on each call; the
/// coordinator builds its strategy once and calls
/// [`KinematicModel::compute`] directly.
///
/// # Example
///
/// ```
/// use std::time::Instant;
/// use rover_kinematics::{compute, GeometryConfig};
/// use rover_types::VelocityIntent;
///
/// let geometry = GeometryConfig::Differential { track_width: 0.5, max_wheel_speed: 2.0 };
/// let intent = VelocityIntent::new("teleop", 0.0, 0.0, 1.0);
/// let targets = compute(&intent, &geometry, Instant::now()).unwrap();
/// assert!((targets[0].value() + 0.25).abs() < 1e-6);
/// assert!((targets[1].value() - 0.25).abs() < 1e-6);
/// ```
pub fn compute(
    intent: &VelocityIntent,
    geometry: &GeometryConfig,
    generated_at: Instant,
) -> Result<Vec<ActuatorTarget>, DriveError> {
    geometry.build()?.compute(intent, generated_at)
}

/// Reject non-finite intents and lateral motion, which none of the supported
/// geometries can produce.
pub(crate) fn check_planar(intent: &VelocityIntent) -> Result<(), DriveError> {
    if !intent.is_finite() {
        return Err(DriveError::InvalidIntent(format!(
            "non-finite intent from '{}'",
            intent.source_id()
        )));
    }
    if intent.linear_y().abs() > LATERAL_EPSILON {
        return Err(DriveError::InvalidIntent(format!(
            "lateral velocity {} is not achievable by a non-holonomic base",
            intent.linear_y()
        )));
    }
    Ok(())
}

pub(crate) fn check_wheel_speed(actuator_id: &str, speed: f32, max: f32) -> Result<(), DriveError> {
    if speed.abs() > max {
        return Err(DriveError::InvalidIntent(format!(
            "{actuator_id} speed {speed} exceeds envelope {max}"
        )));
    }
    Ok(())
}

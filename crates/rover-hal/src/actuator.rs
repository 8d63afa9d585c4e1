//! Generic `Actuator` trait for drive wheels and steering servos.
//!
//! Drivers implement this trait and register themselves with an
//! [`ActuatorRegistry`][crate::registry::ActuatorRegistry].  The control loop
//! never waits on hardware: `command` must hand the value to the driver (a
//! CAN frame, a PWM register, a queue) and return.

use rover_types::{ActuatorCommand, DriveError};

/// A velocity- or angle-controlled actuator.
pub trait Actuator: Send {
    /// Stable identifier matching the kinematic model's actuator ids, e.g.
    /// `"left_wheel"` or `"front_left_steer"`.
    fn id(&self) -> &str;

    /// Hand `command` to the driver without waiting for acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::ActuatorDispatchFailure`] if the driver could
    /// not accept the command (bus fault, controller in error state).
    fn command(&mut self, command: &ActuatorCommand) -> Result<(), DriveError>;

    /// Most recent measured value (wheel speed or steering angle), if the
    /// driver reports one.  Diagnostics only.
    fn feedback(&self) -> Option<f32> {
        None
    }
}

//! [`AckermannDrive`] – front-steered, rear-driven base.
//!
//! For a turn of radius `R = v / ω` about a centre on the rear-axle line,
//! each front wheel is steered so its axis passes through that centre and
//! each rear wheel runs at `ω` times its own distance from it.

use std::time::Instant;

use rover_types::{ActuatorTarget, DriveError, VelocityIntent};

use crate::{KinematicModel, check_planar, check_wheel_speed};

/// Below this yaw rate the intent is treated as a straight line.
const STRAIGHT_EPSILON: f32 = 1e-6;

const FRONT_LEFT_STEER: &str = "front_left_steer";
const FRONT_RIGHT_STEER: &str = "front_right_steer";
const REAR_LEFT_WHEEL: &str = "rear_left_wheel";
const REAR_RIGHT_WHEEL: &str = "rear_right_wheel";

#[derive(Debug, Clone)]
pub struct AckermannDrive {
    wheelbase: f32,
    track_width: f32,
    max_wheel_speed: f32,
    max_steering_angle: f32,
    ids: Vec<String>,
}

impl AckermannDrive {
    pub fn new(wheelbase: f32, track_width: f32, max_wheel_speed: f32, max_steering_angle: f32) -> Self {
        Self {
            wheelbase,
            track_width,
            max_wheel_speed,
            max_steering_angle,
            ids: [FRONT_LEFT_STEER, FRONT_RIGHT_STEER, REAR_LEFT_WHEEL, REAR_RIGHT_WHEEL]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn targets(
        &self,
        steer_left: f32,
        steer_right: f32,
        rear_left: f32,
        rear_right: f32,
        generated_at: Instant,
    ) -> Vec<ActuatorTarget> {
        vec![
            ActuatorTarget::angle(FRONT_LEFT_STEER, steer_left, generated_at),
            ActuatorTarget::angle(FRONT_RIGHT_STEER, steer_right, generated_at),
            ActuatorTarget::velocity(REAR_LEFT_WHEEL, rear_left, generated_at),
            ActuatorTarget::velocity(REAR_RIGHT_WHEEL, rear_right, generated_at),
        ]
    }

    fn check_steering(&self, actuator_id: &str, angle: f32) -> Result<(), DriveError> {
        if angle.abs() > self.max_steering_angle {
            return Err(DriveError::InvalidIntent(format!(
                "{actuator_id} angle {angle} exceeds steering limit {}",
                self.max_steering_angle
            )));
        }
        Ok(())
    }
}

impl KinematicModel for AckermannDrive {
    fn name(&self) -> &str {
        "ackermann"
    }

    fn actuator_ids(&self) -> &[String] {
        &self.ids
    }

    fn compute(
        &self,
        intent: &VelocityIntent,
        generated_at: Instant,
    ) -> Result<Vec<ActuatorTarget>, DriveError> {
        check_planar(intent)?;
        let v = intent.linear_x();
        let omega = intent.angular_z();

        if omega.abs() < STRAIGHT_EPSILON {
            check_wheel_speed(REAR_LEFT_WHEEL, v, self.max_wheel_speed)?;
            return Ok(self.targets(0.0, 0.0, v, v, generated_at));
        }
        if v.abs() < STRAIGHT_EPSILON {
            return Err(DriveError::InvalidIntent(format!(
                "rotation in place (angular_z {omega}) is not achievable with Ackermann steering"
            )));
        }

        let radius = v / omega;
        let half_track = self.track_width * 0.5;
        if radius.abs() <= half_track {
            return Err(DriveError::InvalidIntent(format!(
                "turn radius {radius} is inside half the track width {half_track}"
            )));
        }

        let left_offset = radius - half_track;
        let right_offset = radius + half_track;

        let steer_left = (self.wheelbase / left_offset).atan();
        let steer_right = (self.wheelbase / right_offset).atan();
        self.check_steering(FRONT_LEFT_STEER, steer_left)?;
        self.check_steering(FRONT_RIGHT_STEER, steer_right)?;

        let rear_left = omega * left_offset;
        let rear_right = omega * right_offset;
        check_wheel_speed(REAR_LEFT_WHEEL, rear_left, self.max_wheel_speed)?;
        check_wheel_speed(REAR_RIGHT_WHEEL, rear_right, self.max_wheel_speed)?;

        Ok(self.targets(steer_left, steer_right, rear_left, rear_right, generated_at))
    }

    fn zero_targets(&self, generated_at: Instant) -> Vec<ActuatorTarget> {
        self.targets(0.0, 0.0, 0.0, 0.0, generated_at)
    }
}

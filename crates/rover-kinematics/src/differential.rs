//! [`DifferentialDrive`] – two-sided drives.
//!
//! `(v, ω)` decomposes into a left and right surface speed:
//!
//! ```text
//! v_left  = v - ω · track / 2
//! v_right = v + ω · track / 2
//! ```
//!
//! Skid steer uses the same mapping with an effective track widened by the
//! slip factor, and commands every wheel on a side to the same speed.

use std::time::Instant;

use rover_types::{ActuatorTarget, DriveError, VelocityIntent};

use crate::{KinematicModel, check_planar, check_wheel_speed};

#[derive(Debug, Clone)]
pub struct DifferentialDrive {
    name: &'static str,
    effective_track: f32,
    max_wheel_speed: f32,
    left_ids: Vec<String>,
    right_ids: Vec<String>,
    all_ids: Vec<String>,
}

impl DifferentialDrive {
    /// Two-wheel base commanding `"left_wheel"` and `"right_wheel"`.
    pub fn new(track_width: f32, max_wheel_speed: f32) -> Self {
        Self::with_ids(
            "differential",
            track_width,
            max_wheel_speed,
            vec!["left_wheel".to_string()],
            vec!["right_wheel".to_string()],
        )
    }

    /// Skid-steer base commanding `"left_wheel_0"..` and `"right_wheel_0"..`.
    pub fn skid_steer(
        track_width: f32,
        wheels_per_side: usize,
        slip_factor: f32,
        max_wheel_speed: f32,
    ) -> Self {
        let side = |prefix: &str| {
            (0..wheels_per_side)
                .map(|i| format!("{prefix}_wheel_{i}"))
                .collect::<Vec<_>>()
        };
        Self::with_ids(
            "skid_steer",
            track_width * slip_factor,
            max_wheel_speed,
            side("left"),
            side("right"),
        )
    }

    fn with_ids(
        name: &'static str,
        effective_track: f32,
        max_wheel_speed: f32,
        left_ids: Vec<String>,
        right_ids: Vec<String>,
    ) -> Self {
        let all_ids = left_ids.iter().chain(right_ids.iter()).cloned().collect();
        Self {
            name,
            effective_track,
            max_wheel_speed,
            left_ids,
            right_ids,
            all_ids,
        }
    }

    /// Left and right surface speeds for `(linear_x, angular_z)`.
    pub fn side_speeds(&self, linear_x: f32, angular_z: f32) -> (f32, f32) {
        let half = angular_z * self.effective_track * 0.5;
        (linear_x - half, linear_x + half)
    }

    fn targets(&self, left: f32, right: f32, generated_at: Instant) -> Vec<ActuatorTarget> {
        let left_targets = self
            .left_ids
            .iter()
            .map(|id| ActuatorTarget::velocity(id.clone(), left, generated_at));
        let right_targets = self
            .right_ids
            .iter()
            .map(|id| ActuatorTarget::velocity(id.clone(), right, generated_at));
        left_targets.chain(right_targets).collect()
    }
}

impl KinematicModel for DifferentialDrive {
    fn name(&self) -> &str {
        self.name
    }

    fn actuator_ids(&self) -> &[String] {
        &self.all_ids
    }

    fn compute(
        &self,
        intent: &VelocityIntent,
        generated_at: Instant,
    ) -> Result<Vec<ActuatorTarget>, DriveError> {
        check_planar(intent)?;
        let (left, right) = self.side_speeds(intent.linear_x(), intent.angular_z());
        check_wheel_speed("left side", left, self.max_wheel_speed)?;
        check_wheel_speed("right side", right, self.max_wheel_speed)?;
        Ok(self.targets(left, right, generated_at))
    }

    fn zero_targets(&self, generated_at: Instant) -> Vec<ActuatorTarget> {
        self.targets(0.0, 0.0, generated_at)
    }
}

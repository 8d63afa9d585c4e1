//! [`GeometryConfig`] – drive description injected from deployment config.

use serde::{Deserialize, Serialize};

use rover_types::DriveError;

use crate::KinematicModel;
use crate::ackermann::AckermannDrive;
use crate::differential::DifferentialDrive;

/// Physical description of the drive base.  Lengths in metres, speeds in
/// m/s, angles in radians.
///
/// ```toml
/// [geometry]
/// type = "skid_steer"
/// track_width = 0.62
/// wheels_per_side = 3
/// slip_factor = 1.3
/// max_wheel_speed = 1.2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryConfig {
    /// One driven wheel per side.
    Differential { track_width: f32, max_wheel_speed: f32 },
    /// Several driven wheels (or a track) per side, all on one side sharing
    /// a target.  `slip_factor` (>= 1) widens the effective track to account
    /// for lateral scrub while turning.
    SkidSteer {
        track_width: f32,
        wheels_per_side: usize,
        #[serde(default = "default_slip_factor")]
        slip_factor: f32,
        max_wheel_speed: f32,
    },
    /// Two steered front wheels and two driven rear wheels.
    Ackermann {
        wheelbase: f32,
        track_width: f32,
        max_wheel_speed: f32,
        max_steering_angle: f32,
    },
}

fn default_slip_factor() -> f32 {
    1.0
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig::Differential {
            track_width: 0.5,
            max_wheel_speed: 1.5,
        }
    }
}

impl GeometryConfig {
    /// Check that every dimension is physically meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DriveError> {
        match *self {
            GeometryConfig::Differential {
                track_width,
                max_wheel_speed,
            } => {
                positive("track_width", track_width)?;
                positive("max_wheel_speed", max_wheel_speed)
            }
            GeometryConfig::SkidSteer {
                track_width,
                wheels_per_side,
                slip_factor,
                max_wheel_speed,
            } => {
                positive("track_width", track_width)?;
                positive("max_wheel_speed", max_wheel_speed)?;
                if wheels_per_side == 0 {
                    return Err(DriveError::Config(
                        "wheels_per_side must be at least 1".to_string(),
                    ));
                }
                if !(slip_factor.is_finite() && slip_factor >= 1.0) {
                    return Err(DriveError::Config(format!(
                        "slip_factor must be >= 1.0, got {slip_factor}"
                    )));
                }
                Ok(())
            }
            GeometryConfig::Ackermann {
                wheelbase,
                track_width,
                max_wheel_speed,
                max_steering_angle,
            } => {
                positive("wheelbase", wheelbase)?;
                positive("track_width", track_width)?;
                positive("max_wheel_speed", max_wheel_speed)?;
                positive("max_steering_angle", max_steering_angle)?;
                if max_steering_angle >= std::f32::consts::FRAC_PI_2 {
                    return Err(DriveError::Config(format!(
                        "max_steering_angle must be below pi/2, got {max_steering_angle}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Validate and build the matching [`KinematicModel`] strategy.
    pub fn build(&self) -> Result<Box<dyn KinematicModel>, DriveError> {
        self.validate()?;
        let model: Box<dyn KinematicModel> = match *self {
            GeometryConfig::Differential {
                track_width,
                max_wheel_speed,
            } => Box::new(DifferentialDrive::new(track_width, max_wheel_speed)),
            GeometryConfig::SkidSteer {
                track_width,
                wheels_per_side,
                slip_factor,
                max_wheel_speed,
            } => Box::new(DifferentialDrive::skid_steer(
                track_width,
                wheels_per_side,
                slip_factor,
                max_wheel_speed,
            )),
            GeometryConfig::Ackermann {
                wheelbase,
                track_width,
                max_wheel_speed,
                max_steering_angle,
            } => Box::new(AckermannDrive::new(
                wheelbase,
                track_width,
                max_wheel_speed,
                max_steering_angle,
            )),
        };
        Ok(model)
    }
}

fn positive(field: &str, value: f32) -> Result<(), DriveError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DriveError::Config(format!(
            "{field} must be a positive number, got {value}"
        )))
    }
}

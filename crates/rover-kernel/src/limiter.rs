//! Per-actuator velocity, acceleration and steering bounds.
//!
//! The limiter runs after the kinematic model and before dispatch.  Each
//! target is clamped on its own, using only its own previous value, so the
//! result does not depend on evaluation order:
//!
//! 1. rate limit toward the previous value by `max_rate * dt`
//! 2. clamp to `±max_abs`
//!
//! For velocity targets the rate is `max_acceleration` and the bound is
//! `max_velocity`; for steering targets they are `max_angle_rate` and
//! `max_angle`.  An actuator with no previous target ramps from zero.

use std::collections::HashMap;
use std::time::Duration;

use rover_types::{ActuatorCommand, ActuatorTarget, DriveError};
use serde::{Deserialize, Serialize};

/// Limits for one actuator.  Speeds in m/s, accelerations in m/s², angles
/// in rad, angular rates in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorBounds {
    pub max_velocity: f32,
    pub max_acceleration: f32,
    #[serde(default = "default_max_angle")]
    pub max_angle: f32,
    #[serde(default = "default_max_angle_rate")]
    pub max_angle_rate: f32,
}

fn default_max_angle() -> f32 {
    0.6
}

fn default_max_angle_rate() -> f32 {
    1.5
}

impl Default for ActuatorBounds {
    fn default() -> Self {
        Self {
            max_velocity: 1.5,
            max_acceleration: 2.0,
            max_angle: default_max_angle(),
            max_angle_rate: default_max_angle_rate(),
        }
    }
}

impl ActuatorBounds {
    fn validate(&self, label: &str) -> Result<(), DriveError> {
        let fields = [
            ("max_velocity", self.max_velocity),
            ("max_acceleration", self.max_acceleration),
            ("max_angle", self.max_angle),
            ("max_angle_rate", self.max_angle_rate),
        ];
        for (name, value) in fields {
            if value.is_nan() || value < 0.0 {
                return Err(DriveError::Config(format!(
                    "{label}.{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Default bounds plus per-actuator overrides.
///
/// ```toml
/// [limits.default]
/// max_velocity = 1.0
/// max_acceleration = 1.5
///
/// [limits.actuators.rear_left_wheel]
/// max_velocity = 0.8
/// max_acceleration = 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default)]
    pub default: ActuatorBounds,
    #[serde(default)]
    pub actuators: HashMap<String, ActuatorBounds>,
}

impl LimiterConfig {
    /// Uniform bounds for every actuator.
    pub fn uniform(bounds: ActuatorBounds) -> Self {
        Self {
            default: bounds,
            actuators: HashMap::new(),
        }
    }

    /// Override the bounds of one actuator (builder-style).
    pub fn with_actuator(mut self, actuator_id: impl Into<String>, bounds: ActuatorBounds) -> Self {
        self.actuators.insert(actuator_id.into(), bounds);
        self
    }

    pub fn bounds_for(&self, actuator_id: &str) -> &ActuatorBounds {
        self.actuators.get(actuator_id).unwrap_or(&self.default)
    }

    /// # Errors
    ///
    /// Returns [`DriveError::Config`] for negative or NaN limits.
    pub fn validate(&self) -> Result<(), DriveError> {
        self.default.validate("default")?;
        for (id, bounds) in &self.actuators {
            bounds.validate(id)?;
        }
        Ok(())
    }
}

/// Clamp `targets` against `bounds`, relative to `previous` over `dt`.
///
/// Targets already within bounds are returned unchanged.  A non-finite
/// target value holds the previous value.
pub fn clamp(
    targets: &[ActuatorTarget],
    previous: &[ActuatorTarget],
    dt: Duration,
    bounds: &LimiterConfig,
) -> Vec<ActuatorTarget> {
    let previous: HashMap<&str, &ActuatorCommand> = previous
        .iter()
        .map(|t| (t.actuator_id.as_str(), &t.command))
        .collect();
    let dt_secs = dt.as_secs_f32();

    targets
        .iter()
        .map(|target| {
            let limits = bounds.bounds_for(&target.actuator_id);
            let prev = previous
                .get(target.actuator_id.as_str())
                .filter(|prev| same_kind(prev, &target.command))
                .map(|prev| prev.value())
                .unwrap_or(0.0);
            let (max_abs, max_rate) = match target.command {
                ActuatorCommand::Velocity(_) => (limits.max_velocity, limits.max_acceleration),
                ActuatorCommand::Angle(_) => (limits.max_angle, limits.max_angle_rate),
            };
            let value = clamp_value(target.value(), prev, max_abs, max_rate, dt_secs);
            ActuatorTarget {
                actuator_id: target.actuator_id.clone(),
                command: target.command.with_value(value),
                generated_at: target.generated_at,
            }
        })
        .collect()
}

fn same_kind(a: &ActuatorCommand, b: &ActuatorCommand) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn clamp_value(value: f32, prev: f32, max_abs: f32, max_rate: f32, dt_secs: f32) -> f32 {
    if !value.is_finite() {
        return prev.max(-max_abs).min(max_abs);
    }
    let max_step = if dt_secs > 0.0 { max_rate * dt_secs } else { 0.0 };
    let stepped = value.max(prev - max_step).min(prev + max_step);
    stepped.max(-max_abs).min(max_abs)
}

/// [`clamp`] bound to one [`LimiterConfig`].
#[derive(Debug, Clone, Default)]
pub struct Limiter {
    config: LimiterConfig,
}

impl Limiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn clamp(
        &self,
        targets: &[ActuatorTarget],
        previous: &[ActuatorTarget],
        dt: Duration,
    ) -> Vec<ActuatorTarget> {
        clamp(targets, previous, dt, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const DT: Duration = Duration::from_millis(100);

    fn bounds() -> LimiterConfig {
        LimiterConfig::uniform(ActuatorBounds {
            max_velocity: 1.0,
            max_acceleration: 2.0,
            max_angle: 0.5,
            max_angle_rate: 1.0,
        })
    }

    fn wheels(left: f32, right: f32, at: Instant) -> Vec<ActuatorTarget> {
        vec![
            ActuatorTarget::velocity("left_wheel", left, at),
            ActuatorTarget::velocity("right_wheel", right, at),
        ]
    }

    fn values(targets: &[ActuatorTarget]) -> Vec<f32> {
        targets.iter().map(|t| t.value()).collect()
    }

    #[test]
    fn within_bounds_is_unchanged() {
        let at = Instant::now();
        let previous = wheels(0.5, 0.5, at);
        let targets = wheels(0.6, 0.4, at);
        let out = clamp(&targets, &previous, DT, &bounds());
        assert_eq!(out, targets);
    }

    #[test]
    fn clamping_twice_changes_nothing() {
        let at = Instant::now();
        let previous = wheels(0.0, 0.0, at);
        let once = clamp(&wheels(3.0, -3.0, at), &previous, DT, &bounds());
        let twice = clamp(&once, &previous, DT, &bounds());
        assert_eq!(once, twice);
    }

    #[test]
    fn acceleration_limits_step_from_previous() {
        let at = Instant::now();
        // 2.0 m/s² over 0.1 s allows a 0.2 m/s step.
        let out = clamp(&wheels(1.0, -1.0, at), &wheels(0.0, 0.0, at), DT, &bounds());
        let v = values(&out);
        assert!((v[0] - 0.2).abs() < 1e-6);
        assert!((v[1] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn absolute_velocity_cap_applies_after_rate_limit() {
        let at = Instant::now();
        let fast = LimiterConfig::uniform(ActuatorBounds {
            max_acceleration: 100.0,
            ..bounds().default
        });
        let out = clamp(&wheels(4.0, -4.0, at), &wheels(0.9, -0.9, at), DT, &fast);
        assert_eq!(values(&out), vec![1.0, -1.0]);
    }

    #[test]
    fn missing_previous_ramps_from_zero() {
        let at = Instant::now();
        let out = clamp(&wheels(0.5, 0.5, at), &[], DT, &bounds());
        assert!(values(&out).iter().all(|v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn zero_dt_holds_previous() {
        let at = Instant::now();
        let out = clamp(&wheels(0.9, 0.1, at), &wheels(0.3, 0.3, at), Duration::ZERO, &bounds());
        assert_eq!(values(&out), vec![0.3, 0.3]);
    }

    #[test]
    fn per_actuator_override_is_used() {
        let at = Instant::now();
        let config = bounds().with_actuator(
            "right_wheel",
            ActuatorBounds {
                max_velocity: 0.25,
                ..bounds().default
            },
        );
        let previous = wheels(0.5, 0.2, at);
        let out = clamp(&wheels(0.5, 0.5, at), &previous, DT, &config);
        assert_eq!(values(&out), vec![0.5, 0.25]);
    }

    #[test]
    fn steering_uses_angle_limits() {
        let at = Instant::now();
        let targets = vec![ActuatorTarget::angle("front_left_steer", 0.9, at)];
        let previous = vec![ActuatorTarget::angle("front_left_steer", 0.45, at)];
        // rate allows 0.1 rad per cycle → 0.55, then capped at 0.5
        let out = clamp(&targets, &previous, DT, &bounds());
        assert_eq!(out[0].command, ActuatorCommand::Angle(0.5));
    }

    #[test]
    fn clamping_is_order_independent() {
        let at = Instant::now();
        let previous = wheels(0.1, -0.4, at);
        let targets = wheels(2.0, 0.7, at);
        let forward = clamp(&targets, &previous, DT, &bounds());

        let mut reversed_targets = targets.clone();
        reversed_targets.reverse();
        let mut reversed_previous = previous.clone();
        reversed_previous.reverse();
        let mut backward = clamp(&reversed_targets, &reversed_previous, DT, &bounds());
        backward.reverse();

        assert_eq!(forward, backward);
    }

    #[test]
    fn generation_instant_is_preserved() {
        let at = Instant::now();
        let out = clamp(&wheels(5.0, 5.0, at), &[], DT, &bounds());
        assert!(out.iter().all(|t| t.generated_at == at));
    }

    #[test]
    fn non_finite_value_holds_previous() {
        let at = Instant::now();
        let out = clamp(&wheels(f32::NAN, 0.3, at), &wheels(0.4, 0.3, at), DT, &bounds());
        assert_eq!(values(&out), vec![0.4, 0.3]);
    }

    #[test]
    fn validate_rejects_negative_limits() {
        let config = LimiterConfig::uniform(ActuatorBounds {
            max_velocity: -1.0,
            ..ActuatorBounds::default()
        });
        assert!(matches!(config.validate(), Err(DriveError::Config(_))));
        assert!(LimiterConfig::default().validate().is_ok());
    }

    #[test]
    fn limiter_struct_delegates_to_clamp() {
        let at = Instant::now();
        let limiter = Limiter::new(bounds());
        let targets = wheels(1.0, 1.0, at);
        let previous = wheels(0.0, 0.0, at);
        assert_eq!(
            limiter.clamp(&targets, &previous, DT),
            clamp(&targets, &previous, DT, &bounds())
        );
    }
}

//! [`ActuatorRegistry`] – driver table and target dispatcher.
//!
//! Dispatch is fire-and-forget: each target is handed to its driver and the
//! registry moves on.  A failing actuator never prevents the others from
//! receiving their targets; failures are collected into the returned
//! [`DispatchReport`] and the coordinator decides whether to escalate.
//!
//! Targets whose `generated_at` predates the current cycle's decision are
//! dropped rather than sent.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use rover_types::{ActuatorFeedback, ActuatorTarget, DriveError, TargetValue};
use tracing::{trace, warn};

use crate::actuator::Actuator;

/// What happened to one batch of targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Targets accepted by their drivers.
    pub dispatched: Vec<TargetValue>,
    /// Ids of targets dropped because they predate the decision instant.
    pub dropped_stale: Vec<String>,
    pub failures: Vec<DriveError>,
}

impl DispatchReport {
    /// `true` when every target reached its driver.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dropped_stale.is_empty()
    }
}

/// Central actuator driver table.
#[derive(Default)]
pub struct ActuatorRegistry {
    actuators: BTreeMap<String, Box<dyn Actuator>>,
}

impl fmt::Debug for ActuatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActuatorRegistry")
            .field("actuators", &self.actuators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActuatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver.  Any previously registered driver with the same
    /// id is replaced.
    pub fn register(&mut self, actuator: Box<dyn Actuator>) {
        self.actuators.insert(actuator.id().to_string(), actuator);
    }

    pub fn contains(&self, actuator_id: &str) -> bool {
        self.actuators.contains_key(actuator_id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.actuators.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }

    /// Send every target in `targets` that was generated at or after
    /// `decision_at`.
    pub fn dispatch(&mut self, targets: &[ActuatorTarget], decision_at: Instant) -> DispatchReport {
        let mut report = DispatchReport::default();
        for target in targets {
            if target.generated_at < decision_at {
                warn!(
                    actuator_id = %target.actuator_id,
                    "dropping target generated before the current decision"
                );
                report.dropped_stale.push(target.actuator_id.clone());
                continue;
            }
            let Some(actuator) = self.actuators.get_mut(&target.actuator_id) else {
                report.failures.push(DriveError::ActuatorDispatchFailure {
                    actuator_id: target.actuator_id.clone(),
                    details: "actuator is not registered".to_string(),
                });
                continue;
            };
            match actuator.command(&target.command) {
                Ok(()) => {
                    trace!(actuator_id = %target.actuator_id, value = target.value(), "target sent");
                    report.dispatched.push(target.to_value());
                }
                Err(e) => {
                    warn!(actuator_id = %target.actuator_id, error = %e, "actuator rejected target");
                    report.failures.push(e);
                }
            }
        }
        report
    }

    /// Latest measurement from every driver that reports one.
    pub fn feedback(&self) -> Vec<ActuatorFeedback> {
        self.actuators
            .iter()
            .filter_map(|(id, actuator)| {
                actuator.feedback().map(|measured| ActuatorFeedback {
                    actuator_id: id.clone(),
                    measured,
                })
            })
            .collect()
    }
}

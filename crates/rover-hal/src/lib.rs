//! `rover-hal` – Actuator Dispatch
//!
//! The boundary between the drive coordinator and the wheel / steering
//! drivers.  The coordinator only ever talks to the [`Actuator`] trait, so a
//! simulated base and a real motor controller are interchangeable.
//!
//! # Modules
//!
//! - [`actuator`] – the [`Actuator`] trait: non-blocking `command` plus an
//!   optional measured `feedback` value.
//! - [`registry`] – [`ActuatorRegistry`]: routes each [`ActuatorTarget`]
//!   to its driver, drops stale targets, and reports per-actuator failures
//!   without stopping the rest of the dispatch.
//! - [`sim`] – [`SimActuator`] and [`SimRegistry`] for tests and the CLI.
//!
//! [`ActuatorTarget`]: rover_types::ActuatorTarget

pub mod actuator;
pub mod registry;
pub mod sim;

pub use actuator::Actuator;
pub use registry::{ActuatorRegistry, DispatchReport};
pub use sim::{SimActuator, SimActuatorHandle, SimHandles, SimRegistry};

//! `rover-runtime` – The Drive Coordinator
//!
//! Ties the kernel's per-cycle decisions to time, hardware, and the outside
//! world.
//!
//! # Modules
//!
//! - [`coordinator`] – [`DriveCoordinator`][coordinator::DriveCoordinator]:
//!   the `INIT / ACTIVE / DEGRADED / SAFE_STOP` state machine and its
//!   single-cycle [`step`][coordinator::DriveCoordinator::step].
//! - [`control_loop`] – [`run`][control_loop::run] drives the coordinator
//!   from a fixed-period Tokio interval;
//!   [`CoordinatorHandle`][control_loop::CoordinatorHandle] re-arms, stops,
//!   and observes it.
//! - [`ingress`] – [`spawn_ingress`][ingress::spawn_ingress]: one
//!   independent task per command source writing into the registry.
//! - [`streak`] – [`FailureStreak`][streak::FailureStreak]: the
//!   consecutive-failure counter behind every escalation to SAFE_STOP.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export
//!   (`OTEL_EXPORTER_OTLP_ENDPOINT`).

pub mod control_loop;
pub mod coordinator;
pub mod ingress;
pub mod streak;
pub mod telemetry;

pub use control_loop::{CoordinatorHandle, handle, run};
pub use coordinator::{CoordinatorConfig, DriveCoordinator};
pub use ingress::{spawn_control_listener, spawn_ingress};
pub use streak::FailureStreak;
pub use telemetry::{LogFormat, TelemetryGuard, init_tracing};

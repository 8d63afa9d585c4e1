//! `rover-kernel` – Source Selection & Safety Bounds
//!
//! The pure, per-cycle decision logic of the drive coordinator.  Nothing in
//! this crate spawns tasks or talks to hardware; every function takes a
//! registry snapshot (or a set of targets) plus the cycle's `now`.
//!
//! # Modules
//!
//! - [`registry`] – [`CommandSourceRegistry`][registry::CommandSourceRegistry]:
//!   the copy-on-write table of registered command sources and their latest
//!   intents.  The only structure written concurrently.
//! - [`watchdog`] – [`is_fresh`][watchdog::is_fresh]: the staleness
//!   predicate evaluated against the same snapshot the arbiter sees.
//! - [`arbiter`] – [`select`][arbiter::select]: picks exactly one fresh
//!   source per cycle, with safety overrides ahead of priority.
//! - [`limiter`] – [`clamp`][limiter::clamp]: per-actuator velocity,
//!   acceleration and steering bounds applied before dispatch.
//!
//! # Cycle data flow
//!
//! ```text
//! registry.snapshot() ──▶ arbiter::select(snapshot, now) ──▶ intent
//!                                                            │
//!                                      kinematic model ◀─────┘
//!                                            │
//!                         limiter::clamp(targets, previous, dt)
//! ```

pub mod arbiter;
pub mod limiter;
pub mod registry;
pub mod watchdog;

pub use arbiter::{ArbiterOutcome, rank, select};
pub use limiter::{ActuatorBounds, Limiter, LimiterConfig, clamp};
pub use registry::CommandSourceRegistry;
pub use watchdog::{assess, freshness, is_fresh};

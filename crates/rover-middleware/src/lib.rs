//! `rover-middleware` – Drive Event Bus
//!
//! Carries the coordinator's outbound streams (diagnostics, dispatched
//! targets, faults) to external observers and the inbound control signals
//! (re-arm, emergency stop) back to the coordinator, without either side
//! knowing about the other.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe built on Tokio broadcast
//!   channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};

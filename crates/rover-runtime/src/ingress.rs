//! Per-source ingress tasks and the bus control listener.
//!
//! Each command source gets its own task that drains that source's channel
//! into the [`CommandSourceRegistry`].  Tasks share nothing but the
//! registry, so a slow or silent source never holds up another.

use std::sync::Arc;

use rover_kernel::CommandSourceRegistry;
use rover_middleware::{EventBus, Topic};
use rover_types::{DriveError, EventPayload, VelocityIntent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control_loop::CoordinatorHandle;

/// Spawn a task that records every intent received on `rx` as the latest
/// command from `source_id`.
///
/// Intents carrying a different `source_id` are dropped.  The task ends when
/// every sender is dropped and resolves to the number of intents recorded.
///
/// # Errors
///
/// Returns [`DriveError::UnknownSource`] when `source_id` is not registered;
/// no task is spawned.
pub fn spawn_ingress(
    registry: Arc<CommandSourceRegistry>,
    source_id: impl Into<String>,
    mut rx: mpsc::Receiver<VelocityIntent>,
) -> Result<JoinHandle<u64>, DriveError> {
    let source_id = source_id.into();
    if registry.source(&source_id).is_none() {
        return Err(DriveError::UnknownSource(source_id));
    }

    Ok(tokio::spawn(async move {
        let mut accepted = 0u64;
        while let Some(intent) = rx.recv().await {
            if intent.source_id() != source_id {
                warn!(
                    channel = %source_id,
                    claimed = %intent.source_id(),
                    "dropping intent tagged with another source"
                );
                continue;
            }
            match registry.update(&source_id, intent) {
                Ok(()) => accepted += 1,
                Err(e) => warn!(source_id = %source_id, error = %e, "intent not recorded"),
            }
        }
        debug!(source_id = %source_id, accepted, "ingress channel closed");
        accepted
    }))
}

/// Forward `Rearm` and `EmergencyStop` requests published on
/// [`Topic::Control`] to `handle`.
///
/// Subscribes before returning, so requests published after this call are
/// never missed.
pub fn spawn_control_listener(bus: &EventBus, handle: CoordinatorHandle) -> JoinHandle<()> {
    let mut control = bus.subscribe_to(Topic::Control);
    tokio::spawn(async move {
        while let Some(event) = control.next().await {
            match event.payload {
                EventPayload::Rearm => {
                    info!(from = %event.source, "re-arm received on control topic");
                    handle.rearm();
                }
                EventPayload::EmergencyStop { reason } => handle.emergency_stop(reason),
                _ => {}
            }
        }
    })
}

//! Fixed-period control loop and the [`CoordinatorHandle`] used to steer it.
//!
//! [`run`] drives a [`DriveCoordinator`] from a Tokio interval.  The handle
//! can be cloned freely; every request it makes is recorded in shared state
//! and the loop is woken through a [`Notify`][tokio::sync::Notify]:
//!
//! | Request | Effect |
//! |---|---|
//! | [`rearm`][CoordinatorHandle::rearm] | consumed by the next scheduled cycle |
//! | [`emergency_stop`][CoordinatorHandle::emergency_stop] | loop wakes immediately, enters SAFE_STOP and dispatches zeros |
//! | [`shutdown`][CoordinatorHandle::shutdown] | as emergency stop, then the loop returns |
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo(coordinator: rover_runtime::DriveCoordinator) {
//! let handle = rover_runtime::control_loop::handle(&coordinator);
//! let task = tokio::spawn(rover_runtime::control_loop::run(coordinator));
//!
//! handle.rearm();
//! handle.shutdown();
//! let _cycles = task.await;
//! # }
//! ```

use std::sync::Arc;

use rover_types::{CoordinatorState, DiagnosticReport};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::coordinator::{DriveCoordinator, Shared};

/// Cloneable remote control for a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
}

impl CoordinatorHandle {
    /// Request a re-arm out of SAFE_STOP.
    pub fn rearm(&self) {
        self.shared.signals.lock().rearm = true;
        info!("re-arm requested");
    }

    /// Enter SAFE_STOP without waiting for the next cycle.
    pub fn emergency_stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "emergency stop requested");
        let mut signals = self.shared.signals.lock();
        signals.rearm = false;
        signals.emergency_stop = Some(reason);
        drop(signals);
        self.shared.notify.notify_one();
    }

    /// Stop the rover and end the loop.
    pub fn shutdown(&self) {
        self.shared.signals.lock().shutdown = true;
        self.shared.notify.notify_one();
    }

    /// State as of the most recently completed cycle.
    pub fn state(&self) -> CoordinatorState {
        self.shared.state.read().clone()
    }

    pub fn latest_report(&self) -> Option<DiagnosticReport> {
        self.shared.report.read().clone()
    }
}

/// A handle to `coordinator`.  Take it before moving the coordinator into
/// [`run`].
pub fn handle(coordinator: &DriveCoordinator) -> CoordinatorHandle {
    CoordinatorHandle {
        shared: coordinator.shared(),
    }
}

/// Drive `coordinator` until [`CoordinatorHandle::shutdown`] is called.
///
/// Returns the number of scheduled cycles executed.
pub async fn run(mut coordinator: DriveCoordinator) -> u64 {
    let shared = coordinator.shared();
    let clock = coordinator.clock();
    let mut interval = tokio::time::interval(coordinator.config().period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles = 0u64;

    info!(period_ms = coordinator.config().period_ms, "control loop started");
    loop {
        let scheduled = tokio::select! {
            biased;
            _ = shared.notify.notified() => false,
            _ = interval.tick() => true,
        };

        let signals = std::mem::take(&mut *shared.signals.lock());
        let now = clock.now();
        if signals.shutdown {
            coordinator.emergency_stop("shutdown", now);
            break;
        }
        // A re-arm raised together with an emergency stop is dropped.
        match signals.emergency_stop {
            Some(reason) => {
                if signals.rearm {
                    warn!("pending re-arm cancelled by emergency stop");
                }
                coordinator.emergency_stop(&reason, now);
            }
            None if signals.rearm => coordinator.request_rearm(),
            None => {}
        }
        if scheduled {
            coordinator.step(now);
            cycles += 1;
        }
    }
    info!(cycles, "control loop stopped");
    cycles
}

//! [`CommandSourceRegistry`] – the only structure written concurrently.
//!
//! Each source's ingress path calls [`CommandSourceRegistry::update`] from
//! its own task while the control loop calls
//! [`CommandSourceRegistry::snapshot`] once per cycle.
//!
//! The table lives behind an [`ArcSwap`] and is replaced wholesale on every
//! write (copy-on-write).  Readers load one immutable table, so a snapshot is
//! a single point-in-time view and never contains a half-written entry.
//! Writers retry on contention instead of taking a lock, so one source's
//! write never blocks another's.
//!
//! The registry stores facts only.  It never ranks sources; that is the
//! arbiter's job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use rover_types::{Clock, CommandSource, DriveError, SourceState, SystemClock, VelocityIntent};
use tracing::{debug, info};

type SourceTable = BTreeMap<String, Arc<SourceState>>;

/// Shared table of command sources and their latest intents.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rover_kernel::registry::CommandSourceRegistry;
/// use rover_types::{CommandSource, VelocityIntent};
///
/// let registry = CommandSourceRegistry::new();
/// registry
///     .register(CommandSource::new("teleop", 5, Duration::from_millis(250)))
///     .unwrap();
/// registry
///     .update("teleop", VelocityIntent::new("teleop", 0.4, 0.0, 0.0))
///     .unwrap();
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.len(), 1);
/// assert!(snapshot[0].last_intent.is_some());
/// ```
#[derive(Debug)]
pub struct CommandSourceRegistry {
    table: ArcSwap<SourceTable>,
    clock: Arc<dyn Clock>,
}

impl CommandSourceRegistry {
    /// Create an empty registry timed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry that stamps receive times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: ArcSwap::from_pointee(SourceTable::new()),
            clock,
        }
    }

    /// Register `source` before the control loop starts.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::DuplicateSource`] when a source with the same
    /// id is already present.  The table is left unchanged.
    pub fn register(&self, source: CommandSource) -> Result<(), DriveError> {
        let id = source.source_id.clone();
        let mut duplicate = false;
        self.table.rcu(|current| {
            duplicate = current.contains_key(&id);
            if duplicate {
                return Arc::clone(current);
            }
            let mut next = SourceTable::clone(current);
            next.insert(id.clone(), Arc::new(SourceState::new(source.clone())));
            Arc::new(next)
        });
        if duplicate {
            return Err(DriveError::DuplicateSource(id));
        }
        info!(
            source_id = %id,
            priority = source.priority,
            safety_override = source.is_safety_override,
            max_staleness_ms = source.max_staleness.as_millis() as u64,
            "command source registered"
        );
        Ok(())
    }

    /// Record `intent` as the latest command from `source_id`, received now.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::UnknownSource`] when `source_id` was never
    /// registered.
    pub fn update(&self, source_id: &str, intent: VelocityIntent) -> Result<(), DriveError> {
        let received_at = self.clock.now();
        self.update_at(source_id, intent, received_at)
    }

    /// [`update`][Self::update] with an explicit receive instant.
    ///
    /// An instant older than the source's current `last_received_at` is
    /// raised to it, keeping receive times monotonic per source.
    pub fn update_at(
        &self,
        source_id: &str,
        intent: VelocityIntent,
        received_at: Instant,
    ) -> Result<(), DriveError> {
        let mut known = true;
        self.table.rcu(|current| {
            let Some(prev) = current.get(source_id) else {
                known = false;
                return Arc::clone(current);
            };
            known = true;
            let stamped = match prev.last_received_at {
                Some(last) if last > received_at => last,
                _ => received_at,
            };
            let next_state = SourceState {
                source: prev.source.clone(),
                last_intent: Some(intent.clone()),
                last_received_at: Some(stamped),
            };
            let mut next = SourceTable::clone(current);
            next.insert(source_id.to_string(), Arc::new(next_state));
            Arc::new(next)
        });
        if !known {
            return Err(DriveError::UnknownSource(source_id.to_string()));
        }
        debug!(source_id, "intent received");
        Ok(())
    }

    /// A consistent point-in-time copy of every source, ordered by id.
    pub fn snapshot(&self) -> Vec<SourceState> {
        self.table
            .load()
            .values()
            .map(|state| SourceState::clone(state))
            .collect()
    }

    /// The descriptor registered under `source_id`, if any.
    pub fn source(&self, source_id: &str) -> Option<CommandSource> {
        self.table.load().get(source_id).map(|s| s.source.clone())
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

impl Default for CommandSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Staleness predicate for command sources.
//!
//! The watchdog keeps no state of its own.  Freshness is a pure function of
//! a [`SourceState`] taken from the same registry snapshot the arbiter uses
//! and the cycle's `now`, so the two can never disagree about a source.

use std::time::Instant;

use rover_types::{Freshness, SourceFreshness, SourceState};

/// `true` when `state` has received an intent no longer ago than its
/// source's `max_staleness`.
///
/// A source that has never been heard from is stale.
///
/// ```
/// use std::time::{Duration, Instant};
/// use rover_kernel::watchdog::is_fresh;
/// use rover_types::{CommandSource, SourceState, VelocityIntent};
///
/// let t0 = Instant::now();
/// let mut state = SourceState::new(CommandSource::new("teleop", 1, Duration::from_millis(100)));
/// assert!(!is_fresh(&state, t0));
///
/// state.last_intent = Some(VelocityIntent::stop("teleop"));
/// state.last_received_at = Some(t0);
/// assert!(is_fresh(&state, t0 + Duration::from_millis(100)));
/// assert!(!is_fresh(&state, t0 + Duration::from_millis(101)));
/// ```
pub fn is_fresh(state: &SourceState, now: Instant) -> bool {
    freshness(state, now).is_fresh()
}

/// Classify `state` at `now`, keeping the age for diagnostics.
///
/// A receive time later than `now` (an update landed after the cycle read
/// its clock) counts as age zero.
pub fn freshness(state: &SourceState, now: Instant) -> Freshness {
    match (state.last_received_at, &state.last_intent) {
        (Some(at), Some(_)) => {
            let age = now.saturating_duration_since(at);
            if age <= state.source.max_staleness {
                Freshness::Fresh { age }
            } else {
                Freshness::Stale { age }
            }
        }
        _ => Freshness::NeverHeard,
    }
}

/// Freshness of every source in `snapshot`, in snapshot order.
pub fn assess(snapshot: &[SourceState], now: Instant) -> Vec<SourceFreshness> {
    snapshot
        .iter()
        .map(|state| SourceFreshness {
            source_id: state.source_id().to_string(),
            freshness: freshness(state, now),
        })
        .collect()
}

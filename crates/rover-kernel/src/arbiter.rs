//! Command arbitration: pick exactly one source per control cycle.
//!
//! # Precedence
//!
//! Only fresh sources (see [`watchdog`][crate::watchdog]) take part.  They
//! are ordered by a total order so the same snapshot and `now` always
//! produce the same winner:
//!
//! 1. Safety-override sources before all others, regardless of priority.
//!    Among overrides: most recent `last_received_at`, then lowest id.
//! 2. Other sources by highest `priority`, then most recent
//!    `last_received_at`, then lowest id.
//!
//! If nothing is fresh the outcome is [`ArbiterOutcome::NoneFresh`], a normal
//! result that drives the coordinator into DEGRADED and then SAFE_STOP.

use std::cmp::Ordering;
use std::time::Instant;

use rover_types::{SourceState, VelocityIntent};

use crate::watchdog::is_fresh;

/// Result of one arbitration.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterOutcome {
    Active {
        source_id: String,
        intent: VelocityIntent,
    },
    NoneFresh,
}

impl ArbiterOutcome {
    pub fn source_id(&self) -> Option<&str> {
        match self {
            ArbiterOutcome::Active { source_id, .. } => Some(source_id),
            ArbiterOutcome::NoneFresh => None,
        }
    }
}

/// Select the active source for this cycle.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use rover_kernel::arbiter::{select, ArbiterOutcome};
/// use rover_types::{CommandSource, SourceState, VelocityIntent};
///
/// let now = Instant::now();
/// let heard = |source: CommandSource, at: Instant| SourceState {
///     last_intent: Some(VelocityIntent::stop(source.source_id.clone())),
///     last_received_at: Some(at),
///     source,
/// };
/// let snapshot = vec![
///     heard(CommandSource::new("autonomy", 1, Duration::from_secs(1)), now),
///     heard(CommandSource::new("teleop", 5, Duration::from_secs(1)), now - Duration::from_millis(10)),
/// ];
/// assert_eq!(select(&snapshot, now).source_id(), Some("teleop"));
/// ```
pub fn select(snapshot: &[SourceState], now: Instant) -> ArbiterOutcome {
    let winner = snapshot
        .iter()
        .filter(|state| is_fresh(state, now))
        .min_by(|a, b| precedence(a, b));

    match winner.and_then(|state| state.last_intent.clone().map(|intent| (state, intent))) {
        Some((state, intent)) => ArbiterOutcome::Active {
            source_id: state.source_id().to_string(),
            intent,
        },
        None => ArbiterOutcome::NoneFresh,
    }
}

/// Every fresh source in precedence order, winner first.
///
/// Used for diagnostics ("why did the rover pick this command").
pub fn rank(snapshot: &[SourceState], now: Instant) -> Vec<&SourceState> {
    let mut fresh: Vec<&SourceState> = snapshot.iter().filter(|s| is_fresh(s, now)).collect();
    fresh.sort_by(|a, b| precedence(a, b));
    fresh
}

/// `Less` means `a` wins over `b`.
fn precedence(a: &SourceState, b: &SourceState) -> Ordering {
    match (a.source.is_safety_override, b.source.is_safety_override) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => more_recent_first(a, b).then_with(|| a.source_id().cmp(b.source_id())),
        (false, false) => b
            .source
            .priority
            .cmp(&a.source.priority)
            .then_with(|| more_recent_first(a, b))
            .then_with(|| a.source_id().cmp(b.source_id())),
    }
}

fn more_recent_first(a: &SourceState, b: &SourceState) -> Ordering {
    b.last_received_at.cmp(&a.last_received_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rover_types::CommandSource;
    use std::time::Duration;

    const STALENESS: Duration = Duration::from_millis(200);

    fn heard(source: CommandSource, at: Instant) -> SourceState {
        SourceState {
            last_intent: Some(VelocityIntent::new(source.source_id.clone(), 0.5, 0.0, 0.0)),
            last_received_at: Some(at),
            source,
        }
    }

    fn regular(id: &str, priority: i32) -> CommandSource {
        CommandSource::new(id, priority, STALENESS)
    }

    fn override_source(id: &str, priority: i32) -> CommandSource {
        CommandSource::new(id, priority, STALENESS).safety_override()
    }

    #[test]
    fn override_beats_higher_priority_even_when_older() {
        let now = Instant::now();
        let snapshot = vec![
            heard(regular("a", 1), now),
            heard(override_source("b", 5), now - Duration::from_millis(100)),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("b"));

        // Override flag wins even against a regular source with larger priority.
        let snapshot = vec![
            heard(regular("teleop", 100), now),
            heard(override_source("estop", -100), now - Duration::from_millis(100)),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("estop"));
    }

    #[test]
    fn stale_override_does_not_win() {
        let now = Instant::now();
        let snapshot = vec![
            heard(regular("a", 1), now),
            heard(override_source("b", 5), now - Duration::from_millis(500)),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("a"));
    }

    #[test]
    fn most_recent_override_wins_among_overrides() {
        let now = Instant::now();
        let snapshot = vec![
            heard(override_source("pad", 9), now - Duration::from_millis(50)),
            heard(override_source("radio", 1), now - Duration::from_millis(10)),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("radio"));
    }

    #[test]
    fn override_tie_breaks_on_lowest_id() {
        let now = Instant::now();
        let snapshot = vec![
            heard(override_source("zeta", 1), now),
            heard(override_source("alpha", 1), now),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("alpha"));
    }

    #[test]
    fn highest_priority_wins_among_regular_sources() {
        let now = Instant::now();
        let snapshot = vec![
            heard(regular("autonomy", 1), now),
            heard(regular("teleop", 5), now - Duration::from_millis(100)),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("teleop"));
    }

    #[test]
    fn priority_tie_breaks_on_recency_then_id() {
        let now = Instant::now();
        let snapshot = vec![
            heard(regular("b", 3), now - Duration::from_millis(10)),
            heard(regular("c", 3), now),
        ];
        assert_eq!(select(&snapshot, now).source_id(), Some("c"));

        let snapshot = vec![heard(regular("b", 3), now), heard(regular("a", 3), now)];
        assert_eq!(select(&snapshot, now).source_id(), Some("a"));
    }

    #[test]
    fn none_fresh_when_everything_is_stale_or_silent() {
        let now = Instant::now();
        let snapshot = vec![
            heard(regular("a", 1), now - Duration::from_secs(1)),
            SourceState::new(regular("b", 2)),
        ];
        assert_eq!(select(&snapshot, now), ArbiterOutcome::NoneFresh);
        assert_eq!(select(&[], now), ArbiterOutcome::NoneFresh);
    }

    #[test]
    fn winner_carries_its_latest_intent() {
        let now = Instant::now();
        let snapshot = vec![heard(regular("teleop", 1), now)];
        match select(&snapshot, now) {
            ArbiterOutcome::Active { source_id, intent } => {
                assert_eq!(source_id, "teleop");
                assert!((intent.linear_x() - 0.5).abs() < f32::EPSILON);
            }
            ArbiterOutcome::NoneFresh => panic!("expected an active source"),
        }
    }

    #[test]
    fn rank_lists_winner_first_and_skips_stale() {
        let now = Instant::now();
        let snapshot = vec![
            heard(regular("autonomy", 1), now),
            heard(regular("stale", 9), now - Duration::from_secs(5)),
            heard(override_source("estop", 0), now),
            heard(regular("teleop", 5), now),
        ];
        let order: Vec<&str> = rank(&snapshot, now).iter().map(|s| s.source_id()).collect();
        assert_eq!(order, vec!["estop", "teleop", "autonomy"]);
    }

    // ------------------------------------------------------------------ properties

    fn arb_snapshot() -> impl Strategy<Value = (Vec<SourceState>, Instant)> {
        prop::collection::vec((any::<bool>(), -5i32..5, 0u64..400, any::<bool>()), 0..8).prop_map(
            |entries| {
                let now = Instant::now() + Duration::from_secs(10);
                let snapshot = entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, (is_override, priority, age_ms, heard_from))| {
                        let mut source = regular(&format!("src_{i}"), priority);
                        source.is_safety_override = is_override;
                        if heard_from {
                            heard(source, now - Duration::from_millis(age_ms))
                        } else {
                            SourceState::new(source)
                        }
                    })
                    .collect();
                (snapshot, now)
            },
        )
    }

    proptest! {
        #[test]
        fn fresh_override_always_wins(input in arb_snapshot()) {
            let (snapshot, now) = input;
            let any_fresh_override = snapshot
                .iter()
                .any(|s| s.source.is_safety_override && is_fresh(s, now));
            if any_fresh_override {
                let winner = select(&snapshot, now);
                let id = winner.source_id().expect("an override is fresh");
                let state = snapshot.iter().find(|s| s.source_id() == id).unwrap();
                prop_assert!(state.source.is_safety_override);
            }
        }

        #[test]
        fn selection_is_repeatable(input in arb_snapshot()) {
            let (snapshot, now) = input;
            let first = select(&snapshot, now);
            for _ in 0..3 {
                prop_assert_eq!(select(&snapshot, now), first.clone());
            }
            let mut reversed = snapshot.clone();
            reversed.reverse();
            let reversed_outcome = select(&reversed, now);
            prop_assert_eq!(reversed_outcome.source_id(), first.source_id());
        }

        #[test]
        fn none_fresh_iff_no_source_is_fresh(input in arb_snapshot()) {
            let (snapshot, now) = input;
            let any_fresh = snapshot.iter().any(|s| is_fresh(s, now));
            let outcome = select(&snapshot, now);
            prop_assert_eq!(outcome == ArbiterOutcome::NoneFresh, !any_fresh);
            if let Some(id) = outcome.source_id() {
                let state = snapshot.iter().find(|s| s.source_id() == id).unwrap();
                prop_assert!(is_fresh(state, now));
            }
        }
    }
}

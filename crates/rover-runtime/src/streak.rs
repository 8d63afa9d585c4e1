//! [`FailureStreak`] – consecutive-event escalation counter.
//!
//! The coordinator keeps one streak per escalating condition (cycles with no
//! fresh source, failed dispatches, rejected intents).  Each bad cycle calls
//! [`FailureStreak::record`]; a good cycle calls [`FailureStreak::reset`].
//! Once `threshold` bad cycles have been recorded in a row the streak is
//! tripped and stays tripped until reset.
//!
//! # Example
//!
//! ```rust
//! use rover_runtime::streak::FailureStreak;
//!
//! let mut dispatch_failures = FailureStreak::new(3);
//!
//! assert!(!dispatch_failures.record());
//! assert!(!dispatch_failures.record());
//! assert!(dispatch_failures.record()); // third in a row → escalate
//!
//! dispatch_failures.reset();
//! assert_eq!(dispatch_failures.count(), 0);
//! ```

/// Counts consecutive bad cycles against a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStreak {
    threshold: u32,
    count: u32,
}

impl FailureStreak {
    /// `threshold` is the number of consecutive records that trips the
    /// streak.  A threshold of `0` is tripped from the start.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            count: 0,
        }
    }

    /// Record one more bad cycle.  Returns `true` once the streak is tripped.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.is_tripped()
    }

    pub fn is_tripped(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

//! Per-worker request statistics.
//!
//! A worker keeps two counter groups: `total`, which only ever grows, and
//! `since_last`, which is reset every time the worker reports to the
//! coordinator. The coordinator sums the `since_last` deltas it receives, so a
//! delta must be counted in exactly one report.

use crate::probe::Outcome;
use core::ops::{Add, AddAssign};
use portable_atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

/// One group of request counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counts {
    /// Probes that received an interpretable response.
    pub succeeded: u64,
    /// Probes that got no response at all.
    pub failed: u64,
    /// Successful probes the endpoint reported as a match.
    pub found: u64,
    /// Probes whose response could not be interpreted.
    pub malformed: u64,
}

impl Counts {
    /// Number of probes issued, whatever their outcome.
    pub const fn requests(&self) -> u64 {
        self.succeeded + self.failed + self.malformed
    }

    pub const fn is_zero(&self) -> bool {
        self.requests() == 0 && self.found == 0
    }

    /// Per-counter difference, clamped at zero.
    #[must_use]
    pub const fn saturating_sub(&self, earlier: &Self) -> Self {
        Self {
            succeeded: self.succeeded.saturating_sub(earlier.succeeded),
            failed: self.failed.saturating_sub(earlier.failed),
            found: self.found.saturating_sub(earlier.found),
            malformed: self.malformed.saturating_sub(earlier.malformed),
        }
    }
}

impl Add for Counts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            succeeded: self.succeeded + rhs.succeeded,
            failed: self.failed + rhs.failed,
            found: self.found + rhs.found,
            malformed: self.malformed + rhs.malformed,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// A read-only copy of a worker's counters, as sent to the coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub since_last: Counts,
    pub total: Counts,
}

#[derive(Default)]
struct AtomicCounts {
    succeeded: AtomicU64,
    failed: AtomicU64,
    found: AtomicU64,
    malformed: AtomicU64,
}

impl AtomicCounts {
    fn load(&self) -> Counts {
        Counts {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn take(&self) -> Counts {
        Counts {
            succeeded: self.succeeded.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
            found: self.found.swap(0, Ordering::Relaxed),
            malformed: self.malformed.swap(0, Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { matched } => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                if *matched {
                    self.found.fetch_add(1, Ordering::Relaxed);
                }
            }
            Outcome::Failure => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Malformed => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Lock-free accumulator owned by one worker and shared by its lanes.
#[derive(Default)]
pub struct Tally {
    since_last: AtomicCounts,
    total: AtomicCounts,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one probe outcome in both groups.
    pub fn record(&self, outcome: &Outcome) {
        self.total.record(outcome);
        self.since_last.record(outcome);
    }

    /// Returns the current counters and resets `since_last` to zero.
    ///
    /// Totals are never reset.
    pub fn flush(&self) -> StatisticsSnapshot {
        // Taking the delta before reading totals guarantees
        // `since_last <= total` in every snapshot.
        let since_last = self.since_last.take();
        StatisticsSnapshot {
            since_last,
            total: self.total.load(),
        }
    }

    /// Returns the current counters without resetting anything.
    pub fn peek(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            since_last: self.since_last.load(),
            total: self.total.load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_each_outcome_once() {
        let tally = Tally::new();
        tally.record(&Outcome::Success { matched: false });
        tally.record(&Outcome::Success { matched: true });
        tally.record(&Outcome::Failure);
        tally.record(&Outcome::Malformed);

        let expected = Counts {
            succeeded: 2,
            failed: 1,
            found: 1,
            malformed: 1,
        };
        let snapshot = tally.peek();
        assert_eq!(snapshot.total, expected);
        assert_eq!(snapshot.since_last, expected);
        assert_eq!(snapshot.total.requests(), 4);
    }

    #[test]
    fn saturating_sub_clamps_each_counter() {
        let later = Counts {
            succeeded: 10,
            failed: 3,
            found: 1,
            malformed: 0,
        };
        let earlier = Counts {
            succeeded: 4,
            failed: 3,
            found: 0,
            malformed: 2,
        };
        assert_eq!(
            later.saturating_sub(&earlier),
            Counts {
                succeeded: 6,
                failed: 0,
                found: 1,
                malformed: 0,
            }
        );
    }

    #[test]
    fn flush_resets_since_last_but_not_totals() {
        let tally = Tally::new();
        for _ in 0..5 {
            tally.record(&Outcome::Success { matched: false });
        }

        let first = tally.flush();
        assert_eq!(first.since_last.succeeded, 5);
        assert_eq!(first.total.succeeded, 5);

        let idle = tally.flush();
        assert!(idle.since_last.is_zero());
        assert_eq!(idle.total.succeeded, 5);

        tally.record(&Outcome::Failure);
        let second = tally.flush();
        assert_eq!(second.since_last.failed, 1);
        assert_eq!(second.since_last.succeeded, 0);
        assert_eq!(second.total.succeeded, 5);
        assert_eq!(second.total.failed, 1);
    }

    #[test]
    fn deltas_sum_to_totals_and_totals_never_decrease() {
        let tally = Tally::new();
        let mut summed = Counts::default();
        let mut last_total = Counts::default();

        for round in 0..50_u64 {
            for i in 0..round {
                let outcome = match i % 3 {
                    0 => Outcome::Success { matched: i % 7 == 0 },
                    1 => Outcome::Failure,
                    _ => Outcome::Malformed,
                };
                tally.record(&outcome);
            }
            let snapshot = tally.flush();
            summed += snapshot.since_last;

            assert!(snapshot.total.succeeded >= last_total.succeeded);
            assert!(snapshot.total.failed >= last_total.failed);
            assert!(snapshot.total.found >= last_total.found);
            assert!(snapshot.total.malformed >= last_total.malformed);
            last_total = snapshot.total;
        }

        assert_eq!(summed, tally.peek().total);
    }

    #[test]
    fn concurrent_recording_loses_nothing() {
        use std::sync::Arc;

        const THREADS: usize = 8;
        const PER_THREAD: u64 = 10_000;

        let tally = Arc::new(Tally::new());
        std::thread::scope(|s| {
            for _ in 0..THREADS {
                let tally = Arc::clone(&tally);
                s.spawn(move || {
                    for _ in 0..PER_THREAD {
                        tally.record(&Outcome::Success { matched: false });
                    }
                });
            }
        });

        assert_eq!(tally.peek().total.succeeded, THREADS as u64 * PER_THREAD);
    }
}

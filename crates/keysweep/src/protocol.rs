//! Worker ⇄ Coordinator message protocol.
//!
//! The protocol is closed and fixed. Every worker emits, in order:
//!
//! 1. [`WorkerEvent::Ready`] once, then waits for its [`Assignment`];
//! 2. [`WorkerEvent::Started`] once it begins dispensing;
//! 3. any number of [`WorkerEvent::Statistics`] (one per report interval) and
//!    [`WorkerEvent::Found`] (one per matched candidate);
//! 4. [`WorkerEvent::End`] exactly once, after which it sends nothing.
//!
//! The coordinator answers `Ready` with the worker's assignment over a
//! dedicated one-shot channel and never sends anything else. Messages travel
//! to the coordinator wrapped in an [`Envelope`] naming the sender.
//!
//! [`Assignment`]: crate::keyspace::Assignment

use crate::stats::StatisticsSnapshot;
use core::{fmt, time::Duration};
use serde::{Deserialize, Serialize};

/// Identifies a worker. Ids are 1-based and follow partition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(usize);

impl WorkerId {
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Builds the id of the worker at zero-based position `index`.
    pub const fn from_index(index: usize) -> Self {
        Self(index + 1)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    /// Zero-based position of this worker in partition order.
    pub const fn index(self) -> usize {
        self.0.saturating_sub(1)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A message from a worker to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// The worker is initialised and awaits its assignment. Carries zeroed
    /// statistics.
    Ready { stats: StatisticsSnapshot },
    /// The worker received its assignment and started dispensing.
    Started { stats: StatisticsSnapshot },
    /// Periodic progress report; `since_last` covers the interval since the
    /// previous report.
    Statistics { stats: StatisticsSnapshot },
    /// A candidate the endpoint reported as a match.
    Found { candidate: String },
    /// Terminal report with any still-unflushed `since_last` delta.
    End {
        stats: StatisticsSnapshot,
        elapsed: Duration,
    },
}

impl WorkerEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Started { .. } => "started",
            Self::Statistics { .. } => "statistics",
            Self::Found { .. } => "found",
            Self::End { .. } => "end",
        }
    }
}

/// A [`WorkerEvent`] tagged with its sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub worker: WorkerId,
    pub event: WorkerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Counts;

    #[test]
    fn worker_ids_are_one_based() {
        assert_eq!(WorkerId::from_index(0).get(), 1);
        assert_eq!(WorkerId::new(3).index(), 2);
        assert_eq!(WorkerId::new(7).to_string(), "worker-7");
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = WorkerEvent::Statistics {
            stats: StatisticsSnapshot {
                since_last: Counts {
                    succeeded: 3,
                    ..Counts::default()
                },
                total: Counts {
                    succeeded: 10,
                    failed: 1,
                    ..Counts::default()
                },
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "statistics");
        assert_eq!(json["stats"]["since_last"]["succeeded"], 3);
        assert_eq!(json["stats"]["total"]["failed"], 1);
    }

    #[test]
    fn event_names_match_the_wire_tags() {
        let end = WorkerEvent::End {
            stats: StatisticsSnapshot::default(),
            elapsed: Duration::from_millis(5),
        };
        let json = serde_json::to_value(&end).unwrap();
        assert_eq!(json["type"], end.name());
    }
}

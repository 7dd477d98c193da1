use crate::{keyspace::Assignment, protocol::WorkerId, stats::Counts};
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Where a worker is in its lifecycle, as seen by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Spawned, `ready` not yet received.
    Spawned,
    /// `ready` received and the assignment sent back.
    Assigned,
    /// `started` received; probing.
    Running,
    /// `end` received; the worker will send nothing else.
    Finished,
}

/// Live view of one worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerProgress {
    pub worker: WorkerId,
    pub phase: WorkerPhase,
    /// Candidates in this worker's range.
    pub range: u64,
    /// Counters as of the worker's most recent report.
    pub totals: Counts,
}

impl WorkerProgress {
    pub const fn completed(&self) -> u64 {
        self.totals.requests()
    }
}

/// Live view of the whole scan, published by the coordinator whenever a
/// worker reports and on every rate tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Size of the keyspace.
    pub candidates: u64,
    /// Sum of every `since_last` delta received so far.
    pub totals: Counts,
    /// Probes per second over the latest report interval of each running
    /// worker.
    pub requests_per_second: f64,
    pub running_workers: usize,
    pub finished_workers: usize,
    pub workers: Vec<WorkerProgress>,
}

impl Progress {
    /// Candidates probed so far, whatever the outcome.
    pub const fn completed(&self) -> u64 {
        self.totals.requests()
    }

    pub fn percent(&self) -> f64 {
        if self.candidates == 0 {
            return 100.0;
        }
        self.completed() as f64 * 100.0 / self.candidates as f64
    }

    pub fn is_complete(&self) -> bool {
        !self.workers.is_empty() && self.finished_workers == self.workers.len()
    }
}

/// Final outcome of one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub assignment: Assignment,
    pub totals: Counts,
    pub elapsed: Duration,
}

/// Final aggregate of a completed scan. Produced exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub candidates: u64,
    pub totals: Counts,
    /// Every candidate the endpoint reported as a match, in arrival order.
    pub matches: Vec<String>,
    /// Wall-clock time from spawning the first worker to the last `end`.
    pub elapsed: Duration,
    pub workers: Vec<WorkerReport>,
}

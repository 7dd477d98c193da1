//! Coordinator-side bookkeeping of the worker protocol.
//!
//! The [`Ledger`] is a pure state machine: it consumes [`Envelope`]s in
//! arrival order and tells the coordinator what to do next. Keeping it free of
//! channels and threads lets every protocol rule be tested directly.

use super::report::{Progress, ScanReport, WorkerPhase, WorkerProgress, WorkerReport};
use crate::{
    error::{Error, Result},
    keyspace::Assignment,
    protocol::{Envelope, WorkerEvent, WorkerId},
    stats::{Counts, StatisticsSnapshot},
};
use core::{fmt, time::Duration};

/// What the coordinator must do after applying a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Hand this assignment to the worker that just reported `ready`.
    Assign(Assignment),
    Continue,
}

#[derive(Debug)]
struct WorkerEntry {
    assignment: Assignment,
    phase: WorkerPhase,
    /// Sum of every `since_last` delta received from this worker.
    received: Counts,
    /// Delta of the worker's most recent periodic report.
    last_delta: Counts,
    found_events: u64,
    elapsed: Option<Duration>,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawned => "spawned",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Per-worker phases plus the global aggregate.
#[derive(Debug)]
pub struct Ledger {
    candidates: u64,
    workers: Vec<WorkerEntry>,
    totals: Counts,
    matches: Vec<String>,
    running: usize,
    started: usize,
    finished: usize,
    requests_per_second: f64,
}

impl Ledger {
    /// Starts tracking one worker per assignment, all in
    /// [`WorkerPhase::Spawned`].
    pub fn new(candidates: u64, assignments: &[Assignment]) -> Self {
        Self {
            candidates,
            workers: assignments
                .iter()
                .map(|&assignment| WorkerEntry {
                    assignment,
                    phase: WorkerPhase::Spawned,
                    received: Counts::default(),
                    last_delta: Counts::default(),
                    found_events: 0,
                    elapsed: None,
                })
                .collect(),
            totals: Counts::default(),
            matches: Vec::new(),
            running: 0,
            started: 0,
            finished: 0,
            requests_per_second: 0.0,
        }
    }

    fn entry_mut(&mut self, worker: WorkerId) -> Result<&mut WorkerEntry> {
        self.workers
            .get_mut(worker.index())
            .filter(|entry| entry.assignment.worker == worker)
            .ok_or_else(|| Error::protocol(worker, "message from an unknown worker id"))
    }

    /// Applies one worker message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if the sender is unknown, the
    /// message is not valid in the sender's current phase, or a worker's final
    /// statistics do not reconcile with the deltas it reported.
    pub fn apply(&mut self, envelope: Envelope) -> Result<Directive> {
        let Envelope { worker, event } = envelope;
        let entry = self.entry_mut(worker)?;

        match (entry.phase, event) {
            (WorkerPhase::Spawned, WorkerEvent::Ready { stats }) => {
                if !stats.total.is_zero() || !stats.since_last.is_zero() {
                    return Err(Error::protocol(worker, "`ready` carried non-zero statistics"));
                }
                entry.phase = WorkerPhase::Assigned;
                Ok(Directive::Assign(entry.assignment))
            }
            (WorkerPhase::Assigned, WorkerEvent::Started { .. }) => {
                entry.phase = WorkerPhase::Running;
                self.running += 1;
                self.started += 1;
                Ok(Directive::Continue)
            }
            (WorkerPhase::Running, WorkerEvent::Statistics { stats }) => {
                entry.received += stats.since_last;
                entry.last_delta = stats.since_last;
                self.totals += stats.since_last;
                Ok(Directive::Continue)
            }
            (WorkerPhase::Running, WorkerEvent::Found { candidate }) => {
                entry.found_events += 1;
                self.matches.push(candidate);
                Ok(Directive::Continue)
            }
            (WorkerPhase::Running, WorkerEvent::End { stats, elapsed }) => {
                entry.received += stats.since_last;
                Self::reconcile(worker, entry, &stats)?;

                entry.phase = WorkerPhase::Finished;
                entry.last_delta = Counts::default();
                entry.elapsed = Some(elapsed);
                self.totals += stats.since_last;
                self.running -= 1;
                self.finished += 1;
                Ok(Directive::Continue)
            }
            (phase, event) => Err(Error::protocol(
                worker,
                format!("unexpected `{}` while {phase}", event.name()),
            )),
        }
    }

    fn reconcile(worker: WorkerId, entry: &WorkerEntry, stats: &StatisticsSnapshot) -> Result<()> {
        if entry.received != stats.total {
            return Err(Error::protocol(
                worker,
                format!(
                    "reported deltas sum to {:?} but final totals are {:?}",
                    entry.received, stats.total
                ),
            ));
        }
        if entry.found_events != stats.total.found {
            return Err(Error::protocol(
                worker,
                format!(
                    "reported {} matched candidates but counted {} matches",
                    entry.found_events, stats.total.found
                ),
            ));
        }
        if stats.total.requests() != entry.assignment.range {
            return Err(Error::protocol(
                worker,
                format!(
                    "probed {} candidates of a {}-candidate range",
                    stats.total.requests(),
                    entry.assignment.range
                ),
            ));
        }
        Ok(())
    }

    /// Recomputes the global request rate from the latest delta of every
    /// running worker, each covering one `interval`.
    pub fn tick(&mut self, interval: Duration) -> f64 {
        let requests: u64 = self
            .workers
            .iter()
            .filter(|entry| entry.phase == WorkerPhase::Running)
            .map(|entry| entry.last_delta.requests())
            .sum();
        self.requests_per_second = requests as f64 / interval.as_secs_f64();
        self.requests_per_second
    }

    pub fn phase(&self, worker: WorkerId) -> Option<WorkerPhase> {
        self.workers
            .get(worker.index())
            .filter(|entry| entry.assignment.worker == worker)
            .map(|entry| entry.phase)
    }

    pub fn all_started(&self) -> bool {
        self.started == self.workers.len()
    }

    /// True exactly when every worker has sent `end`.
    pub fn is_complete(&self) -> bool {
        self.finished == self.workers.len()
    }

    pub const fn totals(&self) -> Counts {
        self.totals
    }

    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    /// Ids of the workers currently probing.
    pub fn running(&self) -> Vec<WorkerId> {
        self.workers
            .iter()
            .filter(|entry| entry.phase == WorkerPhase::Running)
            .map(|entry| entry.assignment.worker)
            .collect()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            candidates: self.candidates,
            totals: self.totals,
            requests_per_second: self.requests_per_second,
            running_workers: self.running,
            finished_workers: self.finished,
            workers: self
                .workers
                .iter()
                .map(|entry| WorkerProgress {
                    worker: entry.assignment.worker,
                    phase: entry.phase,
                    range: entry.assignment.range,
                    totals: entry.received,
                })
                .collect(),
        }
    }

    /// Produces the final aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if some worker has not finished,
    /// or the aggregate does not cover the keyspace exactly.
    pub fn into_report(self, elapsed: Duration) -> Result<ScanReport> {
        if let Some(entry) = self
            .workers
            .iter()
            .find(|entry| entry.phase != WorkerPhase::Finished)
        {
            return Err(Error::protocol(
                entry.assignment.worker,
                format!("report requested while {}", entry.phase),
            ));
        }

        if self.totals.requests() != self.candidates {
            let last = self
                .workers
                .last()
                .map_or(WorkerId::new(0), |entry| entry.assignment.worker);
            return Err(Error::protocol(
                last,
                format!(
                    "aggregate covers {} of {} candidates",
                    self.totals.requests(),
                    self.candidates
                ),
            ));
        }

        Ok(ScanReport {
            candidates: self.candidates,
            totals: self.totals,
            matches: self.matches,
            elapsed,
            workers: self
                .workers
                .into_iter()
                .map(|entry| WorkerReport {
                    assignment: entry.assignment,
                    totals: entry.received,
                    elapsed: entry.elapsed.unwrap_or_default(),
                })
                .collect(),
        })
    }
}

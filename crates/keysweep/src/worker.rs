//! Worker lifecycle.
//!
//! A [`Worker`] owns one [`Assignment`], the [`Cursor`] over it, the probe
//! shared by its lanes and the statistics they accumulate. It speaks the
//! protocol described in [`crate::protocol`]:
//!
//! - reports `ready`, then waits for its assignment;
//! - reports `started`, launches its lanes and arms the report timer;
//! - flushes `statistics` on every timer tick;
//! - once every lane is exhausted, stops the timer, sends exactly one `end`
//!   carrying whatever delta was still unflushed, and releases the probe.
//!
//! Workers run on dedicated OS threads (see [`spawn_worker`]), each with its
//! own single-threaded Tokio runtime. Lanes of one worker are interleaved
//! cooperatively on that runtime; workers run in parallel with one another.

use crate::{
    config::ScanConfig,
    cursor::Cursor,
    error::{Error, Result},
    keyspace::{Assignment, Keyspace},
    lane::{LaneContext, run_lane},
    probe::{Probe, ProbeFactory},
    protocol::{Envelope, WorkerEvent, WorkerId},
    stats::{Counts, Tally},
};
use core::time::Duration;
use std::{sync::Arc, thread};
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant, MissedTickBehavior},
};

/// What a worker thread returns once it has sent `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSummary {
    pub assignment: Assignment,
    pub totals: Counts,
    pub probed: u64,
    pub elapsed: Duration,
}

pub struct Worker<P> {
    id: WorkerId,
    keyspace: Arc<Keyspace>,
    probe: P,
    lanes: usize,
    report_interval: Duration,
    events: mpsc::Sender<Envelope>,
    tally: Tally,
}

impl<P: Probe> Worker<P> {
    pub fn new(
        id: WorkerId,
        keyspace: Arc<Keyspace>,
        probe: P,
        lanes: usize,
        report_interval: Duration,
        events: mpsc::Sender<Envelope>,
    ) -> Self {
        Self {
            id,
            keyspace,
            probe,
            lanes: lanes.max(1),
            report_interval,
            events,
            tally: Tally::new(),
        }
    }

    pub const fn id(&self) -> WorkerId {
        self.id
    }

    async fn send(&self, event: WorkerEvent) -> Result<()> {
        let name = event.name();
        self.events
            .send(Envelope {
                worker: self.id,
                event,
            })
            .await
            .map_err(|_| Error::ChannelError {
                context: format!("{} could not send `{name}`: coordinator is gone", self.id),
            })
    }

    /// Runs the worker to exhaustion.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelError`] if the coordinator hangs up, or drops the
    ///   assignment sender without sending.
    /// - [`Error::ProtocolViolation`] if the assignment names another worker.
    /// - [`Error::IndexOutOfRange`] if the assignment reaches past the end of
    ///   the keyspace.
    pub async fn run(self, assignment: oneshot::Receiver<Assignment>) -> Result<WorkerSummary> {
        self.send(WorkerEvent::Ready {
            stats: self.tally.peek(),
        })
        .await?;

        let assignment = assignment.await.map_err(|_| Error::ChannelError {
            context: format!("{} never received its assignment", self.id),
        })?;
        if assignment.worker != self.id {
            return Err(Error::protocol(
                self.id,
                format!("received the assignment of {}", assignment.worker),
            ));
        }
        if assignment.end() > self.keyspace.size() {
            return Err(Error::IndexOutOfRange {
                index: assignment.end() - 1,
                size: self.keyspace.size(),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "{} assigned [{}, {}) with {} lanes",
            self.id,
            assignment.offset,
            assignment.end(),
            self.lanes
        );

        let cursor = Cursor::new(&assignment);
        let start = Instant::now();
        self.send(WorkerEvent::Started {
            stats: self.tally.peek(),
        })
        .await?;

        let probed = {
            let ctx = LaneContext {
                worker: self.id,
                keyspace: &self.keyspace,
                cursor: &cursor,
                probe: &self.probe,
                tally: &self.tally,
                events: &self.events,
            };
            let lanes = futures::future::try_join_all(
                (0..self.lanes).map(|lane| run_lane(&ctx, lane)),
            );
            tokio::pin!(lanes);

            let mut ticker = time::interval_at(start + self.report_interval, self.report_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    done = &mut lanes => break done?.into_iter().sum::<u64>(),
                    _ = ticker.tick() => {
                        self.send(WorkerEvent::Statistics { stats: self.tally.flush() }).await?;
                    }
                }
            }
        };

        let elapsed = start.elapsed();
        let stats = self.tally.flush();
        self.send(WorkerEvent::End { stats, elapsed }).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "{} finished {probed} probes in {elapsed:?} ({} failed, {} found)",
            self.id,
            stats.total.failed,
            stats.total.found
        );

        // All lanes are done with the probe; release its connections.
        let Self { probe, .. } = self;
        drop(probe);

        Ok(WorkerSummary {
            assignment,
            totals: stats.total,
            probed,
            elapsed,
        })
    }
}

/// Starts worker `id` on its own named thread.
///
/// The thread builds a single-threaded runtime, asks `factory` for the
/// worker's probe and runs the worker to completion on it.
///
/// # Errors
///
/// Returns [`Error::Runtime`] if the thread cannot be spawned. Failures after
/// that, including building the runtime or the probe, are returned through
/// the join handle.
pub(crate) fn spawn_worker<F: ProbeFactory>(
    id: WorkerId,
    factory: Arc<F>,
    config: &ScanConfig,
    events: mpsc::Sender<Envelope>,
    assignment: oneshot::Receiver<Assignment>,
) -> Result<thread::JoinHandle<Result<WorkerSummary>>> {
    let keyspace = Arc::clone(config.keyspace());
    let lanes = config.lanes_per_worker();
    let report_interval = config.report_interval();

    let handle = thread::Builder::new()
        .name(format!("keysweep-{id}"))
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            runtime.block_on(async move {
                let probe = factory.build(id, lanes)?;
                Worker::new(id, keyspace, probe, lanes, report_interval, events)
                    .run(assignment)
                    .await
            })
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests;

//! Scan orchestration.
//!
//! The [`Coordinator`] partitions the keyspace, spawns one worker thread per
//! assignment, answers each worker's `ready` with its assignment and folds
//! every message into a [`Ledger`]. It owns the only receiver of the worker
//! channel; workers never talk to each other.
//!
//! A scan completes when every worker has sent `end`. Any worker error,
//! panic or protocol violation aborts the whole scan: the coordinator returns
//! the error and drops its receiver, which makes the remaining workers fail
//! their next send and exit.

mod ledger;
mod report;

pub use ledger::{Directive, Ledger};
pub use report::{Progress, ScanReport, WorkerPhase, WorkerProgress, WorkerReport};

use crate::{
    config::ScanConfig,
    error::{Error, Result},
    keyspace::Assignment,
    probe::ProbeFactory,
    protocol::WorkerId,
    worker::{WorkerSummary, spawn_worker},
};
use std::{sync::Arc, thread::JoinHandle};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{self, Instant, MissedTickBehavior},
};

type WorkerHandle = JoinHandle<Result<WorkerSummary>>;

/// The coordinator's end of one worker.
struct Slot {
    worker: WorkerId,
    assignment: Option<oneshot::Sender<Assignment>>,
    handle: Option<WorkerHandle>,
}

impl Slot {
    fn assign(&mut self, assignment: Assignment) -> Result<()> {
        let sender = self
            .assignment
            .take()
            .ok_or_else(|| Error::protocol(self.worker, "assignment already sent"))?;
        sender.send(assignment).map_err(|_| Error::ChannelError {
            context: format!("{} hung up before receiving its assignment", self.worker),
        })
    }

    /// Joins the worker thread if it has already exited.
    fn reap(&mut self) -> Result<()> {
        match self.handle.take_if(|handle| handle.is_finished()) {
            Some(handle) => join(self.worker, handle).map(drop),
            None => Ok(()),
        }
    }
}

fn join(worker: WorkerId, handle: WorkerHandle) -> Result<WorkerSummary> {
    handle
        .join()
        .map_err(|_| Error::WorkerPanicked { worker })?
}

/// Joins every remaining worker thread off the async runtime and returns the
/// first failure, if any.
async fn join_all(slots: &mut [Slot]) -> Result<Vec<WorkerSummary>> {
    let handles: Vec<_> = slots
        .iter_mut()
        .filter_map(|slot| slot.handle.take().map(|handle| (slot.worker, handle)))
        .collect();

    tokio::task::spawn_blocking(move || {
        handles
            .into_iter()
            .map(|(worker, handle)| join(worker, handle))
            .collect::<Result<Vec<_>>>()
    })
    .await
    .map_err(|e| Error::ChannelError {
        context: format!("failed to join worker threads: {e}"),
    })?
}

/// Drives one scan from partitioning to the final report.
pub struct Coordinator<F> {
    config: ScanConfig,
    factory: Arc<F>,
    progress: watch::Sender<Progress>,
}

impl<F: ProbeFactory> Coordinator<F> {
    pub fn new(config: ScanConfig, factory: F) -> Self {
        let (progress, _) = watch::channel(Progress {
            candidates: config.keyspace().size(),
            ..Progress::default()
        });
        Self {
            config,
            factory: Arc::new(factory),
            progress,
        }
    }

    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The ranges the workers will be given, in worker order.
    pub fn assignments(&self) -> Result<Vec<Assignment>> {
        self.config.assignments()
    }

    /// Live progress, updated on every worker message and every report tick.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Runs the scan to completion.
    ///
    /// Must be called from within a Tokio runtime; the workers themselves run
    /// on their own threads and runtimes.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a worker that failed, panicked or broke
    /// the protocol, or a worker thread that could not be spawned.
    pub async fn run(self) -> Result<ScanReport> {
        let assignments = self.config.assignments()?;
        let interval = self.config.report_interval();
        let mut ledger = Ledger::new(self.config.keyspace().size(), &assignments);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Scanning {} candidates with {} workers x {} lanes",
            self.config.keyspace().size(),
            assignments.len(),
            self.config.lanes_per_worker()
        );

        let start = Instant::now();
        let (events_tx, mut events) = mpsc::channel(self.config.event_buffer());
        let mut slots = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let (tx, rx) = oneshot::channel();
            let handle = spawn_worker(
                assignment.worker,
                Arc::clone(&self.factory),
                &self.config,
                events_tx.clone(),
                rx,
            )?;
            slots.push(Slot {
                worker: assignment.worker,
                assignment: Some(tx),
                handle: Some(handle),
            });
        }
        // Only workers hold senders now, so `recv` yields `None` once they
        // have all exited.
        drop(events_tx);

        let mut ticker = time::interval_at(start + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut all_started = false;

        while !ledger.is_complete() {
            tokio::select! {
                envelope = events.recv() => {
                    let Some(envelope) = envelope else {
                        return Err(Self::diagnose(&mut slots).await);
                    };
                    let slot = envelope.worker.index();
                    if let Directive::Assign(assignment) = ledger.apply(envelope)? {
                        slots[slot].assign(assignment)?;
                    }
                    if !all_started && ledger.all_started() {
                        all_started = true;
                        #[cfg(feature = "tracing")]
                        tracing::info!("All workers started in {:?}", start.elapsed());
                    }
                    self.progress.send_replace(ledger.progress());
                }
                _ = ticker.tick() => {
                    ledger.tick(interval);
                    self.progress.send_replace(ledger.progress());
                    for slot in &mut slots {
                        slot.reap()?;
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        join_all(&mut slots).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "All workers finished after {elapsed:?}: {} succeeded, {} failed, {} malformed, {} found",
            ledger.totals().succeeded,
            ledger.totals().failed,
            ledger.totals().malformed,
            ledger.totals().found
        );

        self.progress.send_replace(ledger.progress());
        ledger.into_report(elapsed)
    }

    /// Explains why every worker hung up before the scan completed.
    async fn diagnose(slots: &mut [Slot]) -> Error {
        match join_all(slots).await {
            Err(e) => e,
            Ok(_) => Error::ChannelError {
                context: "all workers exited before the scan completed".into(),
            },
        }
    }
}

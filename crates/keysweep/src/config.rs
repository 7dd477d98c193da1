use crate::{
    error::{Error, Result},
    keyspace::{Assignment, Keyspace, partition},
};
use core::time::Duration;
use std::sync::Arc;

/// How often workers report and the coordinator recomputes its rate.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the shared worker → coordinator channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Validated settings for one scan.
///
/// Built once and handed to the [`Coordinator`](crate::Coordinator), which
/// shares the keyspace with its workers.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    keyspace: Arc<Keyspace>,
    workers: usize,
    lanes_per_worker: usize,
    report_interval: Duration,
    event_buffer: usize,
}

impl ScanConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `workers` or `lanes_per_worker` is
    /// zero, or if the keyspace is too small to give every worker at least
    /// one candidate.
    pub fn new(keyspace: Keyspace, workers: usize, lanes_per_worker: usize) -> Result<Self> {
        if lanes_per_worker == 0 {
            return Err(Error::invalid_config(
                "connections per worker must be at least 1",
            ));
        }
        // Surfaces worker-count problems before anything is spawned.
        partition(keyspace.size(), workers)?;

        Ok(Self {
            keyspace: Arc::new(keyspace),
            workers,
            lanes_per_worker,
            report_interval: DEFAULT_REPORT_INTERVAL,
            event_buffer: DEFAULT_EVENT_BUFFER,
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero interval.
    pub fn with_report_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::invalid_config("report interval must be non-zero"));
        }
        self.report_interval = interval;
        Ok(self)
    }

    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    pub const fn lanes_per_worker(&self) -> usize {
        self.lanes_per_worker
    }

    pub const fn report_interval(&self) -> Duration {
        self.report_interval
    }

    pub const fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    /// The per-worker assignments for this configuration.
    pub fn assignments(&self) -> Result<Vec<Assignment>> {
        partition(self.keyspace.size(), self.workers)
    }
}

/// Number of workers to use when none is configured: one per available
/// parallel execution unit.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

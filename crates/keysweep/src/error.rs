//! Error types for the keyspace scanner.
//!
//! This module defines the central `Error` enum, which captures every fatal
//! condition the scanner can hit. Per-candidate problems are deliberately not
//! errors: a probe whose transport failed, or whose response could not be
//! interpreted, is an [`Outcome`](crate::probe::Outcome) that gets counted,
//! and the lane moves on.
//!
//! ## Error Cases
//! - `InvalidConfig`: The keyspace or worker parameters are unusable. Raised
//!   before any worker is spawned.
//! - `IndexOutOfRange`: An index outside `[0, N)` was handed to the encoder.
//! - `InvalidCandidate`: A string could not be decoded back into an index.
//! - `ChannelError`: A worker or the coordinator hung up unexpectedly.
//! - `ProtocolViolation`: A worker message arrived out of order, for an
//!   unknown worker, or the final statistics do not reconcile.
//! - `ProbeInit`: A worker could not build its probe client.
//! - `WorkerPanicked`: A worker thread terminated abnormally.
//! - `Runtime`: The per-worker runtime or thread could not be created.

use crate::protocol::WorkerId;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the scanner.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The scan configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The encoder was asked for an index past the end of the keyspace.
    #[error("Index {index} is outside the keyspace of {size} candidates")]
    IndexOutOfRange { index: u64, size: u64 },

    /// A candidate string is not a member of the keyspace.
    #[error("Invalid candidate: {reason}")]
    InvalidCandidate { reason: String },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// A worker broke the fixed message protocol.
    #[error("Protocol violation by {worker}: {reason}")]
    ProtocolViolation { worker: WorkerId, reason: String },

    /// A worker failed to construct its probe client.
    #[error("{worker} failed to initialise its probe: {reason}")]
    ProbeInit { worker: WorkerId, reason: String },

    /// A worker thread panicked.
    #[error("{worker} panicked")]
    WorkerPanicked { worker: WorkerId },

    /// The worker thread or its runtime could not be started.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(worker: WorkerId, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            worker,
            reason: reason.into(),
        }
    }
}

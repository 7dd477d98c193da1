//! # keysweep
//!
//! Exhaustive, partitioned enumeration of a fixed-length keyspace against a
//! remote probe endpoint.
//!
//! The keyspace is split into contiguous, disjoint ranges, one per worker.
//! Each worker runs on its own thread and drives its range through a bounded
//! number of concurrent lanes, probing every candidate exactly once and
//! reporting statistics to a single [`Coordinator`].
//!
//! ```no_run
//! use keysweep::{Coordinator, HttpProbeFactory, Keyspace, ProbeConfig, ScanConfig};
//!
//! # async fn scan() -> keysweep::Result<()> {
//! let keyspace = Keyspace::new("0123456789abcdefghijklmnopqrstuvwxyz", 4)?;
//! let config = ScanConfig::new(keyspace, 8, 16)?;
//! let probe = ProbeConfig::new("http://127.0.0.1:8080/check")?;
//!
//! let report = Coordinator::new(config, HttpProbeFactory::new(probe))
//!     .run()
//!     .await?;
//! println!("{} matches", report.matches.len());
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod cursor;
mod error;
mod keyspace;
mod lane;
mod probe;
mod protocol;
mod stats;
mod worker;

pub use crate::config::*;
pub use crate::coordinator::*;
pub use crate::cursor::*;
pub use crate::error::*;
pub use crate::keyspace::*;
pub use crate::probe::*;
pub use crate::protocol::*;
pub use crate::stats::*;
pub use crate::worker::{Worker, WorkerSummary};

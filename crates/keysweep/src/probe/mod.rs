//! Probing a single candidate against the remote endpoint.
//!
//! A [`Probe`] turns one candidate into one [`Outcome`]. Each worker builds
//! exactly one probe through a [`ProbeFactory`], on its own thread, and all of
//! that worker's lanes share it by reference. The probe therefore owns the
//! worker's pooled connection context and is dropped, releasing it, once every
//! lane is done.
//!
//! There is no retry at this level or any other: a failed probe is counted and
//! the lane moves on to the next candidate.

mod http;

pub use http::{
    DEFAULT_MATCH_FIELD, DEFAULT_PAYLOAD_FIELD, DEFAULT_TIMEOUT, HttpProbe, HttpProbeFactory,
    MAX_RESPONSE_BYTES, ProbeConfig,
};

use crate::{error::Result, protocol::WorkerId};
use core::future::Future;

/// Classification of one probe.
///
/// Success and match are independent axes, except that a probe that failed
/// can never be a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// A response was received and interpreted.
    Success { matched: bool },
    /// No response was received (connection refused, reset, timed out, ...).
    Failure,
    /// A response was received but did not carry a readable match flag.
    Malformed,
}

impl Outcome {
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Success { matched: true })
    }
}

/// Issues one request per candidate.
pub trait Probe {
    /// Probes `candidate` and classifies the result.
    ///
    /// Implementations must not panic on bad responses; every case maps to an
    /// [`Outcome`].
    fn probe(&self, candidate: &str) -> impl Future<Output = Outcome>;
}

/// Builds the probe of each worker.
///
/// The factory is shared by every worker thread; the probe it returns stays on
/// the thread that built it, so it need not be `Send`.
pub trait ProbeFactory: Send + Sync + 'static {
    type Probe: Probe;

    /// Builds the probe for `worker`, sized for `lanes` concurrent requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProbeInit`](crate::Error::ProbeInit) if the connection
    /// context cannot be created.
    fn build(&self, worker: WorkerId, lanes: usize) -> Result<Self::Probe>;
}

impl<F, P> ProbeFactory for F
where
    F: Fn(WorkerId, usize) -> Result<P> + Send + Sync + 'static,
    P: Probe,
{
    type Probe = P;

    fn build(&self, worker: WorkerId, lanes: usize) -> Result<P> {
        self(worker, lanes)
    }
}

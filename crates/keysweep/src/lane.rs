use crate::{
    cursor::{Cursor, Dispensed},
    error::{Error, Result},
    keyspace::Keyspace,
    probe::Probe,
    protocol::{Envelope, WorkerEvent, WorkerId},
    stats::Tally,
};
use tokio::sync::mpsc;

/// Everything a lane borrows from its worker.
pub(crate) struct LaneContext<'a, P> {
    pub worker: WorkerId,
    pub keyspace: &'a Keyspace,
    pub cursor: &'a Cursor,
    pub probe: &'a P,
    pub tally: &'a Tally,
    pub events: &'a mpsc::Sender<Envelope>,
}

/// Drives candidates through the probe one at a time until the cursor is
/// exhausted.
///
/// Exactly one probe of this lane is in flight at any moment, so a worker with
/// `K` lanes never has more than `K` outstanding requests. Transport failures
/// and malformed responses are counted and skipped. Only a broken invariant
/// (an index the encoder rejects) or a vanished coordinator ends the lane
/// early.
///
/// Returns the number of candidates this lane probed.
pub(crate) async fn run_lane<P: Probe>(ctx: &LaneContext<'_, P>, _lane: usize) -> Result<u64> {
    let mut candidate = String::with_capacity(ctx.keyspace.length());
    let mut probed = 0_u64;

    loop {
        let index = match ctx.cursor.dispense() {
            Dispensed::Index(index) => index,
            Dispensed::Exhausted => break,
        };

        ctx.keyspace.encode_into(index, &mut candidate)?;
        let outcome = ctx.probe.probe(&candidate).await;
        ctx.tally.record(&outcome);
        probed += 1;

        if outcome.is_match() {
            #[cfg(feature = "tracing")]
            tracing::info!("{} lane {_lane} found a match: {candidate:?}", ctx.worker);

            ctx.events
                .send(Envelope {
                    worker: ctx.worker,
                    event: WorkerEvent::Found {
                        candidate: candidate.clone(),
                    },
                })
                .await
                .map_err(|_| Error::ChannelError {
                    context: format!("{} lost the coordinator while reporting a match", ctx.worker),
                })?;
        }

        // Probes that complete without suspending would otherwise starve the
        // sibling lanes and the report timer.
        tokio::task::yield_now().await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("{} lane {_lane} exhausted after {probed} probes", ctx.worker);

    Ok(probed)
}

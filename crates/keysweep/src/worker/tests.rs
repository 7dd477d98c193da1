use super::*;
use crate::probe::Outcome;
use core::cell::RefCell;
use std::{collections::HashSet, rc::Rc};

const INTERVAL: Duration = Duration::from_secs(1);

struct Always(Outcome);

impl Probe for Always {
    async fn probe(&self, _candidate: &str) -> Outcome {
        self.0
    }
}

/// Records candidates into a buffer the test keeps a handle to.
struct Recorder {
    seen: Rc<RefCell<Vec<String>>>,
    delay: Duration,
    matching: &'static str,
}

impl Probe for Recorder {
    async fn probe(&self, candidate: &str) -> Outcome {
        if !self.delay.is_zero() {
            time::sleep(self.delay).await;
        }
        self.seen.borrow_mut().push(candidate.to_string());
        Outcome::Success {
            matched: candidate == self.matching,
        }
    }
}

fn assignment(worker: usize, offset: u64, range: u64) -> Assignment {
    Assignment {
        worker: WorkerId::new(worker),
        offset,
        range,
    }
}

fn digits() -> Arc<Keyspace> {
    Arc::new(Keyspace::new("0123456789", 2).unwrap())
}

/// Plays the coordinator's side of the protocol for a single worker and
/// returns the worker's result together with every event it sent.
async fn drive<P: Probe>(
    probe: P,
    assignment: Assignment,
    lanes: usize,
    interval: Duration,
) -> (Result<WorkerSummary>, Vec<WorkerEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let (assign_tx, assign_rx) = oneshot::channel();
    let worker = Worker::new(assignment.worker, digits(), probe, lanes, interval, tx);

    let coordinator = async move {
        let mut events = Vec::new();
        let mut assign_tx = Some(assign_tx);
        while let Some(envelope) = rx.recv().await {
            assert_eq!(envelope.worker, assignment.worker);
            if matches!(envelope.event, WorkerEvent::Ready { .. }) {
                let tx = assign_tx.take().expect("ready sent twice");
                tx.send(assignment).unwrap();
            }
            events.push(envelope.event);
        }
        events
    };

    tokio::join!(worker.run(assign_rx), coordinator)
}

fn end_count(events: &[WorkerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, WorkerEvent::End { .. }))
        .count()
}

#[tokio::test]
async fn reports_ready_started_and_a_single_end() {
    let (summary, events) = drive(
        Always(Outcome::Success { matched: false }),
        assignment(1, 0, 10),
        2,
        INTERVAL,
    )
    .await;
    let summary = summary.unwrap();

    assert!(matches!(
        events.first(),
        Some(WorkerEvent::Ready { stats }) if stats.total.is_zero()
    ));
    assert!(matches!(events.get(1), Some(WorkerEvent::Started { .. })));
    assert_eq!(end_count(&events), 1);

    let Some(WorkerEvent::End { stats, .. }) = events.last() else {
        panic!("last event is not `end`: {events:?}");
    };
    assert_eq!(stats.total.succeeded, 10);
    assert_eq!(stats.total.failed, 0);
    assert_eq!(stats.total.found, 0);
    assert_eq!(summary.totals, stats.total);
    assert_eq!(summary.probed, 10);
}

#[tokio::test]
async fn failing_transport_still_exhausts_the_range() {
    let (summary, events) =
        drive(Always(Outcome::Failure), assignment(2, 33, 33), 3, INTERVAL).await;
    let summary = summary.unwrap();

    assert_eq!(summary.totals.failed, 33);
    assert_eq!(summary.totals.succeeded, 0);
    assert_eq!(summary.probed, 33);
    assert_eq!(end_count(&events), 1);
}

#[tokio::test]
async fn malformed_responses_are_counted_separately() {
    let (summary, _) = drive(Always(Outcome::Malformed), assignment(1, 0, 7), 1, INTERVAL).await;
    let totals = summary.unwrap().totals;

    assert_eq!(totals.malformed, 7);
    assert_eq!(totals.succeeded, 0);
    assert_eq!(totals.failed, 0);
}

#[tokio::test]
async fn dispenses_every_index_once_for_any_lane_count() {
    for lanes in [1, 2, 8] {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let probe = Recorder {
            seen: Rc::clone(&seen),
            delay: Duration::ZERO,
            matching: "",
        };
        let (summary, _) = drive(probe, assignment(3, 66, 34), lanes, INTERVAL).await;
        assert_eq!(summary.unwrap().probed, 34);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 34, "lanes = {lanes}");
        let distinct: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(distinct.len(), 34, "lanes = {lanes}");
        let expected: HashSet<_> = (66..100).map(|i| i.to_string()).collect();
        assert_eq!(distinct, expected, "lanes = {lanes}");
    }
}

#[tokio::test]
async fn matches_are_reported_before_end() {
    let probe = Recorder {
        seen: Rc::default(),
        delay: Duration::ZERO,
        matching: "42",
    };
    let (summary, events) = drive(probe, assignment(1, 40, 10), 2, INTERVAL).await;
    assert_eq!(summary.unwrap().totals.found, 1);

    let found = events
        .iter()
        .position(|e| matches!(e, WorkerEvent::Found { candidate } if candidate == "42"))
        .expect("no `found` event");
    let end = events
        .iter()
        .position(|e| matches!(e, WorkerEvent::End { .. }))
        .unwrap();
    assert!(found < end);
}

#[tokio::test(start_paused = true)]
async fn periodic_reports_flush_deltas_that_sum_to_the_total() {
    let probe = Recorder {
        seen: Rc::default(),
        delay: Duration::from_millis(5),
        matching: "",
    };
    let (summary, events) = drive(probe, assignment(1, 0, 40), 1, Duration::from_millis(20)).await;
    let summary = summary.unwrap();

    let mut reports = 0;
    let mut summed = Counts::default();
    let mut last_total = Counts::default();
    for event in &events {
        let stats = match event {
            WorkerEvent::Statistics { stats } => {
                reports += 1;
                stats
            }
            WorkerEvent::End { stats, .. } => stats,
            _ => continue,
        };
        summed += stats.since_last;
        assert!(stats.since_last.succeeded <= stats.total.succeeded);
        assert!(stats.total.succeeded >= last_total.succeeded);
        last_total = stats.total;
    }

    assert!(reports >= 5, "only {reports} periodic reports");
    assert_eq!(summed, summary.totals);
    assert_eq!(summary.totals.succeeded, 40);
}

#[tokio::test]
async fn rejects_an_assignment_for_another_worker() {
    let (tx, mut rx) = mpsc::channel(8);
    let (assign_tx, assign_rx) = oneshot::channel();
    let worker = Worker::new(
        WorkerId::new(1),
        digits(),
        Always(Outcome::Failure),
        1,
        INTERVAL,
        tx,
    );

    assign_tx.send(assignment(2, 0, 10)).unwrap();
    let result = worker.run(assign_rx).await;

    assert!(matches!(result, Err(Error::ProtocolViolation { .. })));
    assert!(matches!(
        rx.recv().await.map(|e| e.event),
        Some(WorkerEvent::Ready { .. })
    ));
}

#[tokio::test]
async fn fails_when_the_assignment_never_arrives() {
    let (tx, _rx) = mpsc::channel(8);
    let (assign_tx, assign_rx) = oneshot::channel::<Assignment>();
    drop(assign_tx);
    let worker = Worker::new(
        WorkerId::new(1),
        digits(),
        Always(Outcome::Failure),
        1,
        INTERVAL,
        tx,
    );

    assert!(matches!(
        worker.run(assign_rx).await,
        Err(Error::ChannelError { .. })
    ));
}

#[tokio::test]
async fn rejects_an_assignment_past_the_keyspace() {
    let (tx, _rx) = mpsc::channel(8);
    let (assign_tx, assign_rx) = oneshot::channel();
    let worker = Worker::new(
        WorkerId::new(1),
        digits(),
        Always(Outcome::Failure),
        1,
        INTERVAL,
        tx,
    );

    assign_tx.send(assignment(1, 90, 20)).unwrap();
    assert!(matches!(
        worker.run(assign_rx).await,
        Err(Error::IndexOutOfRange { .. })
    ));
}

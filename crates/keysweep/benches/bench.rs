use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use keysweep::{
    Assignment, Coordinator, Cursor, DEFAULT_ALPHABET, DEFAULT_LENGTH, Dispensed, Keyspace,
    Outcome, Probe, Result, ScanConfig, WorkerId,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};
use tokio::runtime::Builder;

// Candidates handled per benchmark iteration (shared across threads for the
// contended benchmarks).
const TOTAL_CANDIDATES: u64 = 4096;

struct Immediate;

impl Probe for Immediate {
    async fn probe(&self, candidate: &str) -> Outcome {
        black_box(candidate);
        Outcome::Success { matched: false }
    }
}

fn assignment(range: u64) -> Assignment {
    Assignment {
        worker: WorkerId::new(1),
        offset: 0,
        range,
    }
}

fn bench_encode(c: &mut Criterion) {
    let keyspace = Keyspace::new(DEFAULT_ALPHABET, DEFAULT_LENGTH).unwrap();
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(TOTAL_CANDIDATES));

    group.bench_function(format!("alloc/elems/{TOTAL_CANDIDATES}"), |b| {
        b.iter(|| {
            for index in 0..TOTAL_CANDIDATES {
                black_box(keyspace.encode(index).unwrap());
            }
        });
    });

    group.bench_function(format!("reuse/elems/{TOTAL_CANDIDATES}"), |b| {
        let mut candidate = String::with_capacity(DEFAULT_LENGTH);
        b.iter(|| {
            for index in 0..TOTAL_CANDIDATES {
                keyspace.encode_into(index, &mut candidate).unwrap();
                black_box(&candidate);
            }
        });
    });

    group.finish();
}

fn bench_dispense_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispense");

    for thread_count in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(TOTAL_CANDIDATES));
        group.bench_function(
            format!("elems/{TOTAL_CANDIDATES}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let cursor = Cursor::new(&assignment(TOTAL_CANDIDATES));
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let cursor = &cursor;
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    while let Dispensed::Index(index) = cursor.dispense() {
                                        black_box(index);
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// End-to-end scan overhead with a probe that answers immediately.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(TOTAL_CANDIDATES));
    group.sample_size(20);

    for workers in [1, 4] {
        group.bench_function(
            format!("elems/{TOTAL_CANDIDATES}/workers/{workers}"),
            |b| {
                let rt = Builder::new_multi_thread()
                    .enable_all()
                    .worker_threads(1)
                    .build()
                    .unwrap();

                b.to_async(&rt).iter_custom(|iters| async move {
                    let start = Instant::now();

                    for _ in 0..iters {
                        // 16^3 = TOTAL_CANDIDATES
                        let keyspace = Keyspace::new("0123456789abcdef", 3).unwrap();
                        let config = ScanConfig::new(keyspace, workers, 8).unwrap();
                        let factory = |_: WorkerId, _: usize| -> Result<Immediate> { Ok(Immediate) };
                        black_box(Coordinator::new(config, factory).run().await.unwrap());
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_dispense_contended, bench_scan);
criterion_main!(benches);

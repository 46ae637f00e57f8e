//! Latency benchmarks for QuickPoll.
//!
//! These benchmarks focus on the path from a vote to a viewer's queue.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quickpoll_core::{
    Broadcaster, MemoryStore, PollAggregator, PollService, PollStore, SystemClock,
};
use std::sync::Arc;
use std::time::Instant;

/// Benchmark vote + publish + receive latency.
fn bench_vote_to_update(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("vote_to_update");

    for viewers in [1usize, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(viewers), &viewers, |b, &viewers| {
            b.iter_custom(|iters| {
                let service =
                    PollService::new(Arc::new(MemoryStore::new()), Arc::new(Broadcaster::new()));
                let broadcaster = service.broadcaster();
                let mut receivers: Vec<_> = (0..viewers)
                    .map(|i| broadcaster.connect(&format!("conn-{}", i)))
                    .collect();

                let labels = vec!["a".to_string(), "b".to_string()];
                let mut elapsed = std::time::Duration::ZERO;
                let mut poll_id = 0;
                for i in 0..iters {
                    // Keep the voter list short so snapshot size stays flat.
                    if i % 256 == 0 {
                        for v in 0..viewers {
                            broadcaster.unsubscribe_all(&format!("conn-{}", v));
                        }
                        poll_id = rt
                            .block_on(service.create_poll("bench", &labels))
                            .unwrap()
                            .id;
                        for v in 0..viewers {
                            broadcaster.subscribe(&format!("conn-{}", v), poll_id).unwrap();
                        }
                    }

                    let start = Instant::now();
                    rt.block_on(service.cast_vote(poll_id, (i % 2) as i64, "bench"))
                        .unwrap();
                    for rx in &mut receivers {
                        black_box(rx.try_recv().unwrap());
                    }
                    elapsed += start.elapsed();
                }
                elapsed
            });
        });
    }

    group.finish();
}

/// Benchmark snapshot aggregation as voter lists grow.
fn bench_snapshot(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("snapshot");
    let aggregator = PollAggregator::new(Arc::new(SystemClock));

    for votes in [10usize, 100, 1000] {
        let store = MemoryStore::new();
        let poll = rt.block_on(async {
            let poll = store
                .create_poll("bench", &["a".to_string(), "b".to_string(), "c".to_string()])
                .await
                .unwrap();
            for i in 0..votes {
                store
                    .append_vote(poll.id, i % 3, &format!("voter-{}", i))
                    .await
                    .unwrap();
            }
            store.get_poll(poll.id).await.unwrap()
        });

        group.bench_with_input(BenchmarkId::from_parameter(votes), &poll, |b, poll| {
            b.iter(|| aggregator.snapshot(black_box(poll)))
        });
    }

    group.finish();
}

/// Benchmark joining and leaving a poll topic.
fn bench_join_leave(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_leave");

    let broadcaster = Broadcaster::new();
    let _rx = broadcaster.connect("conn-1");
    let mut poll_id = 0u64;

    group.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            poll_id += 1;
            broadcaster.subscribe("conn-1", black_box(poll_id)).unwrap();
            broadcaster.unsubscribe("conn-1", black_box(poll_id)).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_vote_to_update, bench_snapshot, bench_join_leave);
criterion_main!(benches);

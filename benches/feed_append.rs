//! Benchmarks for the live feed buffer
//!
//! Measures the single-writer append path (filter evaluation, admission and
//! FIFO eviction at capacity) and the reader side under a full buffer.

use aprsfeed::config::FeedConfig;
use aprsfeed::feed::{FeedCursor, LiveFeed};
use aprsfeed::test_utils::packet;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn full_feed(capacity: usize) -> LiveFeed {
    let feed = LiveFeed::new(&FeedConfig { capacity, raw_log_capacity: capacity, dedup_window_ms: 0 });
    let status = packet("N0CALL>APRS,TCPIP*:>Monitoring 144.390");
    for _ in 0..capacity {
        feed.append(status.clone());
    }
    feed
}

fn bench_append(c: &mut Criterion) {
    let status = packet("N0CALL>APRS,TCPIP*:>Monitoring 144.390");
    let mut group = c.benchmark_group("feed_append");
    group.throughput(Throughput::Elements(1));

    let feed = full_feed(20_000);
    group.bench_function("match_all_at_capacity", |b| b.iter(|| black_box(feed.append(status.clone()))));

    let filtered = full_feed(20_000);
    filtered.set_filter("type=message or from=W1AW").expect("benchmark filter compiles");
    group.bench_function("rejected_by_filter", |b| b.iter(|| black_box(filtered.append(status.clone()))));

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let feed = full_feed(20_000);
    let mut group = c.benchmark_group("feed_read");

    group.bench_function("latest_50", |b| b.iter(|| black_box(feed.latest(50))));
    group.bench_function("read_before_middle", |b| {
        let middle = feed.head_seq() - 10_000;
        b.iter(|| black_box(feed.read_before(black_box(middle), 50)))
    });
    group.bench_function("cursor_catch_up", |b| {
        b.iter_batched(
            || FeedCursor::after(feed.head_seq() - 500),
            |mut cursor| black_box(cursor.next_batch(&feed, 500)),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    c.bench_function("reapply_filter_20k", |b| {
        b.iter_batched(
            || full_feed(20_000),
            |feed| black_box(feed.reapply_filter("from=N0CALL")),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_append, bench_read, bench_rebuild);
criterion_main!(benches);

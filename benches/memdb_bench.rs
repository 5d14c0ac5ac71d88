//! Benchmarks for Chronicle cluster write buffers and tag search
//!
//! Run with: cargo bench

use chronicle_cluster::memdb::*;
use chronicle_cluster::query::{Expr, TagFilter, TagSearch};
use chronicle_cluster::TagIndex;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

const HOUR: i64 = 3_600_000;
const INTERVAL: i64 = 10_000;

fn create_writes(count: usize) -> Vec<(Field, WriteContext)> {
    (0..count)
        .filter_map(|i| {
            let ts = i as i64 * INTERVAL;
            let ctx = WriteContext::for_timestamp(ts, INTERVAL, HOUR)?;
            Some((Field::new("requests", FieldValue::Sum(i as f64)), ctx))
        })
        .collect()
}

fn filled_store(writes: &[(Field, WriteContext)]) -> FieldStore {
    let mut store = FieldStore::new("requests", 1, FieldType::Sum);
    for (field, ctx) in writes {
        store.write(field, *ctx);
    }
    store
}

fn bench_field_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_store");

    for size in [360, 3600, 36000] {
        let writes = create_writes(size);

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("write_{}", size), |b| {
            b.iter(|| filled_store(black_box(&writes)))
        });

        group.bench_function(format!("flush_{}", size), |b| {
            b.iter_batched(
                || (filled_store(&writes), MemoryTableFlusher::new()),
                |(mut store, mut flusher)| {
                    for family_time in store.family_times() {
                        store.flush_field_to(&mut flusher, family_time);
                    }
                    flusher
                },
                BatchSize::SmallInput,
            )
        });

        let store = filled_store(&writes);
        group.bench_function(format!("time_range_{}", size), |b| {
            b.iter(|| store.time_range(black_box(INTERVAL)))
        });
    }

    group.finish();
}

fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");

    let mut segment = SimpleSegmentStore::new(0, AggType::Sum);
    for slot in 0..360u16 {
        segment.write_float(slot as f64, &WriteContext::new(0, slot));
    }
    let (encoded, _, _) = segment.bytes().unwrap();

    group.bench_function("encode_360", |b| b.iter(|| segment.bytes().unwrap()));
    group.bench_function("decode_360", |b| {
        b.iter(|| decode_segment(black_box(&encoded)).unwrap())
    });

    group.finish();
}

fn bench_tag_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_search");

    let index = TagIndex::new();
    for i in 0..1000 {
        index.register("ns", "cpu", "host", &format!("web-{}", i)).unwrap();
        index.register("ns", "cpu", "zone", &format!("z{}", i % 10)).unwrap();
    }
    let condition = Expr::and(
        Expr::tag(TagFilter::like("host", "web-1*")),
        Expr::or(
            Expr::tag(TagFilter::equals("zone", "z1")),
            Expr::not(Expr::tag(TagFilter::in_values("zone", &["z2", "z3"]))),
        ),
    );

    group.bench_function("filter_3_leaves", |b| {
        b.iter(|| {
            TagSearch::new("ns", "cpu", Some(black_box(&condition)), &index)
                .filter()
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_field_store, bench_segment, bench_tag_search);
criterion_main!(benches);


use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tsquery::core::QueryEngine;
use tsquery::filter::build_row_filter;
use tsquery::row_key::{build_row_key, KeyLayout};
use tsquery::span::SpanBuilder;
use tsquery::store::{Cell, MemStore, ScannedRow, POINTS_FAMILY};
use tsquery::types::{SeekableView, TagPair};
use tsquery::uid::{MemUidTable, Uids};
use tsquery::Aggregator;

const LAYOUT: KeyLayout = KeyLayout {
    metric: 3,
    name: 3,
    value: 3,
};

fn id(n: usize) -> Vec<u8> {
    let be = (n as u32).to_be_bytes();
    be[1..].to_vec()
}

fn bench_build_filter(c: &mut Criterion) {
    let literal_tags: Vec<TagPair> = (1..6)
        .map(|n| TagPair {
            name: id(2 * n),
            value: id(100 + n),
        })
        .collect();
    let group_bys = vec![id(11), id(13)];
    let mut group_by_values = BTreeMap::new();
    group_by_values.insert(id(11), (0..8).map(|v| id(200 + v)).collect::<Vec<_>>());

    c.bench_function("filter_build_5_literals_2_group_bys", |b| {
        b.iter(|| {
            build_row_filter(
                black_box(&LAYOUT),
                black_box(&literal_tags),
                black_box(&group_bys),
                black_box(&group_by_values),
            )
        })
    });
}

fn bench_span_seek(c: &mut Criterion) {
    let rows = datasets::generate_rows(datasets::DEFAULT_SEED, 1, 64, 128);
    let mut builder = SpanBuilder::new(LAYOUT);
    for spec in &rows {
        let key = build_row_key(
            &LAYOUT,
            &[0, 0, 1],
            spec.base_time,
            &[(&[0, 0, 2], &[0, 0, 5])],
        );
        let cells = spec
            .cells
            .iter()
            .map(|(q, v)| Cell {
                qualifier: q.clone(),
                value: v.clone(),
            })
            .collect();
        builder.add_row(&ScannedRow { key, cells }).unwrap();
    }
    let span = builder.finish().unwrap();
    let last = span.timestamp(span.size() - 1);

    c.bench_function("span_seek_64_rows", |b| {
        b.iter(|| {
            let mut it = span.iter();
            for target in (0..last).step_by(997) {
                it.seek(black_box(target));
                let _ = black_box(it.has_next());
            }
        })
    });
}

fn bench_query_mem_store(c: &mut Criterion) {
    let metrics = Arc::new(MemUidTable::new("metric", 3));
    let tag_names = Arc::new(MemUidTable::new("tag name", 3));
    let tag_values = Arc::new(MemUidTable::new("tag value", 3));
    let metric_id = metrics.assign("sys.cpu.user");
    let host_id = tag_names.assign("host");

    let store = Arc::new(MemStore::new());
    let rows = datasets::generate_rows(datasets::DEFAULT_SEED, 16, 8, 64);
    for spec in &rows {
        let value_id = tag_values.assign(&format!("web{:02}", spec.host));
        let key = build_row_key(
            &LAYOUT,
            &metric_id,
            spec.base_time,
            &[(host_id.as_slice(), value_id.as_slice())],
        );
        store.put_row(POINTS_FAMILY, &key, &spec.cells);
    }

    let uids = Uids {
        metrics,
        tag_names,
        tag_values,
    };
    let engine = QueryEngine::new(uids, store);

    let mut group = c.benchmark_group("query");
    group.bench_function("group_by_host_16x8x64", |b| {
        let mut q = engine.query();
        q.set_start_time(1).unwrap();
        q.set_end_time(20 * tsquery::MAX_TIMESPAN as u64).unwrap();
        q.set_time_series(
            "sys.cpu.user",
            &[("host".to_string(), "*".to_string())].into_iter().collect(),
            Aggregator::SUM,
            false,
        )
        .unwrap();
        b.iter(|| {
            let groups = q.run().unwrap();
            black_box(groups.len())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_build_filter,
    bench_span_seek,
    bench_query_mem_store
);
criterion_main!(benches);

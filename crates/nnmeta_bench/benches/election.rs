//! Leader election round benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nnmeta_core::election::select_leader;
use nnmeta_storage::Leader;
use nnmeta_testkit::TestCluster;
use rand::Rng;

/// One heartbeat round against a table of `n` namenodes.
fn bench_heartbeat(c: &mut Criterion) {
    let mut group = c.benchmark_group("heartbeat");

    for namenodes in [1usize, 8, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(namenodes),
            &namenodes,
            |b, &namenodes| {
                let cluster = TestCluster::new();
                let mut nodes: Vec<_> = (0..namenodes)
                    .map(|n| cluster.namenode(&format!("nn{n}:8020")))
                    .collect();
                for nn in &mut nodes {
                    nn.join();
                }
                let mut next = 0;

                b.iter(|| {
                    nodes[next].heartbeat();
                    next = (next + 1) % namenodes;
                });
            },
        );
    }
    group.finish();
}

/// Leader selection alone, without storage.
fn bench_select_leader(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_leader");
    let mut rng = rand::thread_rng();

    for rows in [8i64, 128, 1024] {
        let table: Vec<Leader> = (1..=rows)
            .map(|id| Leader::new(id, rng.gen_range(0..10_000), 0, format!("nn{id}")))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &table, |b, table| {
            b.iter(|| select_leader(table, 2));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_heartbeat, bench_select_leader);
criterion_main!(benches);

//! Cache hit and miss benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nnmeta_bench::{directory_ids, populated_cluster, sample_ids};
use nnmeta_core::{INodeFinder, INodeListFinder, OperationKind};
use nnmeta_storage::INode;

const DIRS: i64 = 32;
const FILES: i64 = 16;

/// Every lookup misses: each one runs in its own transaction.
fn bench_find_miss(c: &mut Criterion) {
    let cluster = populated_cluster(DIRS, FILES);
    let ids = sample_ids(&directory_ids(DIRS, FILES), 256);
    let mut em = cluster.manager();

    c.bench_function("find_miss", |b| {
        let mut next = ids.iter().cycle();
        b.iter(|| {
            let id = *next.next().unwrap();
            black_box(em.find::<INode>(&INodeFinder::ById(id)).unwrap());
        });
    });
}

/// The first lookup misses and the rest hit the transaction cache.
fn bench_find_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_hit");
    let cluster = populated_cluster(DIRS, FILES);
    let dirs = directory_ids(DIRS, FILES);

    for repeats in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(repeats as u64));
        group.bench_with_input(BenchmarkId::from_parameter(repeats), &repeats, |b, &repeats| {
            let mut em = cluster.manager();
            b.iter(|| {
                cluster
                    .store
                    .transactional(OperationKind::GetFileInfo)
                    .handle(&mut em, |em| {
                        for _ in 0..repeats {
                            black_box(em.find::<INode>(&INodeFinder::ById(dirs[0]))?);
                        }
                        Ok(())
                    })
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Listing a directory, then resolving each child by name from the cache.
fn bench_list_then_resolve(c: &mut Criterion) {
    let cluster = populated_cluster(DIRS, FILES);
    let dir = directory_ids(DIRS, FILES)[0];
    let mut em = cluster.manager();

    c.bench_function("list_then_resolve", |b| {
        b.iter(|| {
            cluster
                .store
                .transactional(OperationKind::GetListing)
                .handle(&mut em, |em| {
                    let children = em.find_list::<INode>(&INodeListFinder::ByParentId(dir))?;
                    for child in &children {
                        black_box(em.find::<INode>(&INodeFinder::ByNameAndParentId {
                            name: child.name.clone(),
                            parent_id: dir,
                        })?);
                    }
                    Ok(())
                })
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_find_miss, bench_find_hit, bench_list_then_resolve);
criterion_main!(benches);

//! Traversal benchmarks over a generated artifact.

use std::fmt::Write as _;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quiver_query::QueryEngine;
use quiver_storage::{import, GraphStore, ImportConfig};
use tempfile::TempDir;

/// A preferential-attachment-flavored graph: node i links to i % (i/2+1)
/// and a couple of ring neighbors, giving skewed degrees without rand.
fn generate_graph(nodes: u32) -> (TempDir, GraphStore) {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("src_id,src_label,dst_id,dst_label,edge_label\n");
    for i in 0..nodes {
        let hub = i % (i / 2 + 1);
        writeln!(csv, "n{i},node,n{hub},node,link").unwrap();
        writeln!(csv, "n{i},node,n{},node,ring", (i + 1) % nodes).unwrap();
    }
    let input = dir.path().join("edges.csv");
    std::fs::write(&input, csv).unwrap();

    let dest = dir.path().join("graph");
    import(&input, &dest, &ImportConfig::default()).unwrap();
    let store = GraphStore::open(&dest).unwrap();
    (dir, store)
}

fn bench_traversals(c: &mut Criterion) {
    let (_dir, store) = generate_graph(10_000);
    let engine = QueryEngine::new(&store);

    c.bench_function("khop_k2_10k", |b| {
        b.iter(|| black_box(engine.khop(black_box("n0"), 2)))
    });

    c.bench_function("khop_k4_10k", |b| {
        b.iter(|| black_box(engine.khop(black_box("n0"), 4)))
    });

    c.bench_function("common_neighbors_10k", |b| {
        b.iter(|| black_box(engine.common_neighbors(&[black_box("n10"), black_box("n11")])))
    });

    c.bench_function("connected_components_10k", |b| {
        b.iter(|| black_box(engine.connected_components()))
    });

    c.bench_function("reachability_10k", |b| {
        b.iter(|| black_box(engine.reachable(black_box("n9999"), black_box("n0"))))
    });
}

criterion_group!(benches, bench_traversals);
criterion_main!(benches);

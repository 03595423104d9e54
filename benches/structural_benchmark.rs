use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cmis_search::content::memory::MemoryContentSource;
use cmis_search::core::config::Config;
use cmis_search::core::database::SearchDatabase;
use cmis_search::core::types::{ContentId, Document};
use cmis_search::query::ast::{Constraint, Query, Source};
use cmis_search::schema::schema::{Schema, CMIS_DOCUMENT, CMIS_FOLDER};
use cmis_search::search::structural::DescendantTraversal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Helper to build a random repository of `size` nodes under one root folder
fn create_repository(dir: &std::path::Path, size: usize) -> SearchDatabase {
    let mut rng = StdRng::seed_from_u64(size as u64);
    let content = Arc::new(MemoryContentSource::new());
    content.insert(Document::new("root", CMIS_FOLDER, "root"));

    let mut folders = vec!["root".to_string()];
    for i in 0..size {
        let parent = folders[rng.gen_range(0..folders.len())].clone();
        let id = format!("node-{}", i);
        if rng.gen_bool(0.2) {
            content.insert(Document::new(id.as_str(), CMIS_FOLDER, &id).with_parent(parent.as_str()));
            folders.push(id);
        } else {
            content.insert(
                Document::new(id.as_str(), CMIS_DOCUMENT, &id)
                    .with_parent(parent.as_str())
                    .with_property("size", rng.gen_range(0..10_000i64)),
            );
        }
    }

    let config = Config {
        auto_merge: false,
        reindex_flush_threshold: 5_000,
        ..Config::default().with_storage_path(dir)
    };
    SearchDatabase::open(config, Schema::cmis(), content).unwrap()
}

/// Benchmark lazy descendant traversal from the root
fn bench_descendants(c: &mut Criterion) {
    let mut group = c.benchmark_group("descendants_of_root");

    for size in [1_000usize, 10_000, 50_000].iter() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_repository(dir.path(), *size);
        let searcher = db.index().searcher();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let count = DescendantTraversal::from_anchor(&searcher, ContentId::new("root")).count();
                black_box(count)
            });
        });
    }
    group.finish();
}

/// Benchmark an InTree query end to end
fn bench_in_tree_query(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let db = create_repository(dir.path(), 10_000);
    let query = Query::new(Source::selector("d", CMIS_DOCUMENT))
        .with_constraint(Constraint::in_tree("d", "root"))
        .with_limit(100);

    c.bench_function("in_tree_query_10k", |b| {
        b.iter(|| black_box(db.execute(&query).unwrap().len()));
    });
}

criterion_group!(benches, bench_descendants, bench_in_tree_query);
criterion_main!(benches);

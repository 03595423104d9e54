mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use cmis_search::content::memory::MemoryContentSource;
use cmis_search::core::database::SearchDatabase;
use cmis_search::core::transaction::IndexTransaction;
use cmis_search::core::types::{ContentId, Document};
use cmis_search::index::searcher::Searcher;
use cmis_search::query::ast::{Constraint, Query, Source};
use cmis_search::schema::schema::{Schema, CMIS_FOLDER};
use cmis_search::search::structural::{children_of, DescendantTraversal};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;
use common::{sorted_ids, test_config};

/// Random forest with a few roots; returns child -> parent.
fn random_forest(rng: &mut StdRng, nodes: usize) -> BTreeMap<usize, Option<usize>> {
    let mut parents = BTreeMap::new();
    for i in 0..nodes {
        let parent = if i < 3 || rng.gen_bool(0.02) { None } else { Some(rng.gen_range(0..i)) };
        parents.insert(i, parent);
    }
    parents
}

fn name(i: usize) -> String {
    format!("n{:04}", i)
}

/// Indexes the forest in several transactions so it spans segments.
fn index_forest(dir: &std::path::Path, parents: &BTreeMap<usize, Option<usize>>) -> SearchDatabase {
    let content = Arc::new(MemoryContentSource::new());
    let db = SearchDatabase::open_without_recovery(test_config(dir), Schema::cmis(), content.clone()).unwrap();

    let ids: Vec<usize> = parents.keys().copied().collect();
    for chunk in ids.chunks(64) {
        let mut tx = IndexTransaction::new();
        for &i in chunk {
            let mut doc = Document::new(name(i), CMIS_FOLDER, &name(i));
            if let Some(p) = parents[&i] {
                doc = doc.with_parent(name(p));
            }
            content.insert(doc);
            tx.add(name(i));
        }
        db.save(&tx).unwrap();
    }
    db
}

fn expected_descendants(parents: &BTreeMap<usize, Option<usize>>, anchor: usize) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for (&node, _) in parents {
        let mut current = parents[&node];
        while let Some(p) = current {
            if p == anchor {
                out.insert(name(node));
                break;
            }
            current = parents[&p];
        }
    }
    out
}

fn fixed_point(searcher: &Searcher, anchor: u32) -> RoaringBitmap {
    let mut seen = RoaringBitmap::new();
    let mut frontier: RoaringBitmap = std::iter::once(anchor).collect();
    loop {
        let next = children_of(searcher, &frontier) - &seen;
        if next.is_empty() {
            return seen;
        }
        seen |= &next;
        frontier = next;
    }
}

fn names(searcher: &Searcher, docs: impl IntoIterator<Item = u32>) -> BTreeSet<String> {
    docs.into_iter()
        .filter_map(|addr| searcher.document(addr))
        .map(|doc| doc.id.as_str().to_string())
        .collect()
}

#[test]
fn descendants_are_the_fixed_point_of_children() {
    for seed in [7u64, 42, 1234] {
        let mut rng = StdRng::seed_from_u64(seed);
        let parents = random_forest(&mut rng, 300);
        let dir = tempfile::tempdir().unwrap();
        let db = index_forest(dir.path(), &parents);
        let searcher = db.index().searcher();

        for _ in 0..10 {
            let anchor = rng.gen_range(0..parents.len());
            let addr = searcher.find(&ContentId::new(name(anchor))).unwrap();
            let expected = expected_descendants(&parents, anchor);

            let lazy = names(&searcher, DescendantTraversal::from_parents(&searcher, std::iter::once(addr).collect()));
            let single = names(&searcher, DescendantTraversal::from_anchor(&searcher, ContentId::new(name(anchor))));
            let closure = names(&searcher, fixed_point(&searcher, addr));

            assert_eq!(lazy, expected, "seed {} anchor {}", seed, anchor);
            assert_eq!(single, expected, "seed {} anchor {}", seed, anchor);
            assert_eq!(closure, expected, "seed {} anchor {}", seed, anchor);
        }
    }
}

#[test]
fn in_tree_query_agrees_with_traversal_after_removals() {
    let mut rng = StdRng::seed_from_u64(99);
    let parents = random_forest(&mut rng, 200);
    let dir = tempfile::tempdir().unwrap();
    let db = index_forest(dir.path(), &parents);

    // Removing interior nodes cuts their subtrees off from the anchor.
    let removed: Vec<usize> = (10..200).step_by(17).collect();
    let mut tx = IndexTransaction::new();
    for &i in &removed {
        tx.remove(name(i));
    }
    db.save(&tx).unwrap();

    let mut remaining = parents.clone();
    for i in &removed {
        remaining.remove(i);
    }

    for anchor in [0usize, 1, 2] {
        let query = Query::new(Source::selector("f", CMIS_FOLDER))
            .with_constraint(Constraint::in_tree("f", &name(anchor)));
        let results = db.execute(&query).unwrap();
        let got: BTreeSet<String> = sorted_ids(&results, "f").into_iter().collect();

        // Ground truth over the surviving links only.
        let mut expected = BTreeSet::new();
        for (&node, _) in &remaining {
            let mut current = remaining[&node];
            while let Some(p) = current {
                if p == anchor {
                    expected.insert(name(node));
                    break;
                }
                current = match remaining.get(&p) {
                    Some(parent) => *parent,
                    None => None,
                };
            }
        }
        assert_eq!(got, expected, "anchor {}", anchor);
    }
}

mod common;

use cmis_search::core::config::Config;
use cmis_search::core::database::SearchDatabase;
use cmis_search::core::error::ErrorKind;
use cmis_search::core::transaction::IndexTransaction;
use cmis_search::core::types::Document;
use cmis_search::query::ast::{Constraint, Query, Source};
use cmis_search::schema::schema::{Schema, CMIS_DOCUMENT, CMIS_FOLDER};
use cmis_search::storage::merge_policy::MergePolicyConfig;
use common::{abc, open, sorted_ids, test_config};

fn in_tree(type_name: &str, folder: &str) -> Query {
    Query::new(Source::selector("n", type_name)).with_constraint(Constraint::in_tree("n", folder))
}

fn under_path(type_name: &str, path: &str) -> Query {
    Query::new(Source::selector("n", type_name)).with_constraint(Constraint::descendant_node("n", path))
}

fn documents() -> Query {
    Query::new(Source::selector("d", CMIS_DOCUMENT))
}

#[test]
fn abc_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let content = abc();
    let db = open(dir.path(), content.clone());

    // InTree('A') = {B, C}, across both base types.
    let mut tree = sorted_ids(&db.execute(&in_tree(CMIS_FOLDER, "A")).unwrap(), "n");
    tree.extend(sorted_ids(&db.execute(&in_tree(CMIS_DOCUMENT, "A")).unwrap(), "n"));
    assert_eq!(tree, vec!["B", "C"]);

    let children = db
        .execute(&Query::new(Source::selector("n", CMIS_FOLDER)).with_constraint(Constraint::child_node("n", "/")))
        .unwrap();
    assert_eq!(sorted_ids(&children, "n"), vec!["B"]);

    // Same tree through paths: A is the root "/", B sits at "/B".
    assert_eq!(sorted_ids(&db.execute(&under_path(CMIS_FOLDER, "/")).unwrap(), "n"), vec!["B"]);
    assert_eq!(sorted_ids(&db.execute(&under_path(CMIS_DOCUMENT, "/")).unwrap(), "n"), vec!["C"]);
    assert_eq!(sorted_ids(&db.execute(&under_path(CMIS_DOCUMENT, "/B")).unwrap(), "n"), vec!["C"]);

    content.remove(&"B".into());
    db.save(IndexTransaction::new().remove("B")).unwrap();

    assert!(db.execute(&in_tree(CMIS_FOLDER, "A")).unwrap().is_empty());
    assert!(db.execute(&in_tree(CMIS_DOCUMENT, "A")).unwrap().is_empty());
    assert!(db.execute(&under_path(CMIS_FOLDER, "/")).unwrap().is_empty());
    assert!(db.execute(&under_path(CMIS_DOCUMENT, "/")).unwrap().is_empty());
    assert!(db.execute(&under_path(CMIS_DOCUMENT, "/B")).unwrap().is_empty());
    // C is still indexed, only unreachable from A.
    assert_eq!(sorted_ids(&db.execute(&documents()).unwrap(), "d"), vec!["C"]);
}

#[test]
fn save_then_query_and_remove_then_query() {
    let dir = tempfile::tempdir().unwrap();
    let content = abc();
    let db = open(dir.path(), content.clone());

    content.insert(Document::new("D", CMIS_DOCUMENT, "d.txt").with_parent("A"));
    let report = db.save(IndexTransaction::new().add("D")).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(sorted_ids(&db.execute(&documents()).unwrap(), "d"), vec!["C", "D"]);

    content.insert(Document::new("D", CMIS_DOCUMENT, "renamed.txt").with_parent("B"));
    db.save(IndexTransaction::new().update("D")).unwrap();
    let in_b = db
        .execute(&documents().with_constraint(Constraint::in_folder("d", "B")))
        .unwrap();
    assert_eq!(sorted_ids(&in_b, "d"), vec!["C", "D"]);

    content.remove(&"D".into());
    db.save(IndexTransaction::new().remove("D")).unwrap();
    assert_eq!(sorted_ids(&db.execute(&documents()).unwrap(), "d"), vec!["C"]);
}

#[test]
fn failed_transaction_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), abc());
    let generation = db.index().generation();

    let err = db.save(IndexTransaction::new().add("ghost").remove("C")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexTransaction);
    assert_eq!(db.index().generation(), generation);
    assert_eq!(sorted_ids(&db.execute(&documents()).unwrap(), "d"), vec!["C"]);

    let err = db.save(IndexTransaction::new().add("C").remove("C")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexTransaction);
}

#[test]
fn committed_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let content = abc();
    {
        let db = open(dir.path(), content.clone());
        content.insert(Document::new("D", CMIS_DOCUMENT, "d.txt").with_parent("B"));
        db.save(IndexTransaction::new().add("D")).unwrap();
    }

    let db = SearchDatabase::open(test_config(dir.path()), Schema::cmis(), content).unwrap();
    assert!(!db.recovery().needs_reindex());
    assert_eq!(sorted_ids(&db.execute(&documents()).unwrap(), "d"), vec!["C", "D"]);
}

#[test]
fn inline_merges_keep_query_results() {
    let dir = tempfile::tempdir().unwrap();
    let content = abc();
    let config = Config {
        auto_merge: true,
        background_merge: false,
        merge_policy: MergePolicyConfig::DocumentCount { min: 1, max: 1000 },
        ..Config::default().with_storage_path(dir.path())
    };
    let db = SearchDatabase::open(config, Schema::cmis(), content.clone()).unwrap();

    for i in 0..5 {
        let id = format!("doc-{}", i);
        content.insert(Document::new(id.as_str(), CMIS_DOCUMENT, &id).with_parent("B"));
        db.save(IndexTransaction::new().add(id.as_str())).unwrap();
    }

    assert!(db.index().statistics().segment_count <= 2);
    let in_b = db
        .execute(&documents().with_constraint(Constraint::in_folder("d", "B")))
        .unwrap();
    assert_eq!(in_b.len(), 6);
}

mod common;

use std::sync::Arc;
use cmis_search::content::memory::MemoryContentSource;
use cmis_search::core::error::ErrorKind;
use cmis_search::core::types::{Document, Value};
use cmis_search::query::ast::{
    Column, Constraint, DynamicOperand, JoinCondition, JoinKind, Operator, Ordering, Query, Source,
};
use cmis_search::schema::schema::{CMIS_DOCUMENT, CMIS_FOLDER};
use common::{open, sorted_ids};

fn library() -> Arc<MemoryContentSource> {
    Arc::new(MemoryContentSource::with_documents([
        Document::new("root", CMIS_FOLDER, "root"),
        Document::new("reports", CMIS_FOLDER, "reports").with_parent("root"),
        Document::new("archive", CMIS_FOLDER, "archive").with_parent("reports"),
        Document::new("q1", CMIS_DOCUMENT, "q1.pdf")
            .with_parent("reports")
            .with_property("pages", 12i64)
            .with_text("quarterly budget overview"),
        Document::new("q2", CMIS_DOCUMENT, "q2.pdf")
            .with_parent("reports")
            .with_property("pages", 30i64)
            .with_text("second quarter staffing"),
        Document::new("old", CMIS_DOCUMENT, "Old.txt")
            .with_parent("archive")
            .with_property("pages", 3i64)
            .with_text("budget from last year"),
    ]))
}

#[test]
fn single_selector_scores_every_row_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let results = db.execute(&Query::new(Source::selector("d", CMIS_DOCUMENT))).unwrap();
    assert_eq!(sorted_ids(&results, "d"), vec!["old", "q1", "q2"]);
    assert!(results.rows.iter().all(|row| row.score == 1.0));
    assert!(!results.has_problems());
}

#[test]
fn child_join_pairs_documents_with_their_folder() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let query = Query::new(Source::join(
        Source::selector("f", CMIS_FOLDER),
        Source::selector("d", CMIS_DOCUMENT),
        JoinKind::Inner,
        JoinCondition::ChildNode { parent: "f".into(), child: "d".into() },
    ))
    .with_column(Column::new("f", "cmis:objectId"))
    .with_column(Column::new("d", "cmis:parentId"));

    let results = db.execute(&query).unwrap();
    assert_eq!(results.len(), 3);
    for row in &results.rows {
        assert_eq!(row.values[0], row.values[1]);
    }
}

#[test]
fn structural_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());
    let docs = || Query::new(Source::selector("d", CMIS_DOCUMENT));

    let in_folder = db.execute(&docs().with_constraint(Constraint::in_folder("d", "reports"))).unwrap();
    assert_eq!(sorted_ids(&in_folder, "d"), vec!["q1", "q2"]);

    let in_tree = db.execute(&docs().with_constraint(Constraint::in_tree("d", "reports"))).unwrap();
    assert_eq!(sorted_ids(&in_tree, "d"), vec!["old", "q1", "q2"]);

    let by_path = db
        .execute(&docs().with_constraint(Constraint::descendant_node("d", "/reports/archive")))
        .unwrap();
    assert_eq!(sorted_ids(&by_path, "d"), vec!["old"]);
}

#[test]
fn full_text_and_property_filters_combine() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let query = Query::new(Source::selector("d", CMIS_DOCUMENT)).with_constraint(Constraint::and(
        Constraint::full_text("d", None, "budget").unwrap(),
        Constraint::comparison(DynamicOperand::property("d", "pages"), Operator::GreaterThan, Value::Integer(5)),
    ));
    let results = db.execute(&query).unwrap();
    assert_eq!(sorted_ids(&results, "d"), vec!["q1"]);
}

#[test]
fn case_insensitive_name_match() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let query = Query::new(Source::selector("d", CMIS_DOCUMENT)).with_constraint(Constraint::comparison(
        DynamicOperand::NodeName { selector: "d".into() }.upper(),
        Operator::Like,
        Value::from("%.TXT"),
    ));
    let results = db.execute(&query).unwrap();
    assert_eq!(sorted_ids(&results, "d"), vec!["old"]);
}

#[test]
fn ordering_and_paging() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let query = Query::new(Source::selector("d", CMIS_DOCUMENT))
        .with_ordering(Ordering::ascending(DynamicOperand::property("d", "pages")))
        .with_offset(1)
        .with_limit(2);
    let results = db.execute(&query).unwrap();
    let ids: Vec<&str> = results.ids("d").iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2"]);
}

#[test]
fn bind_variables_come_from_the_context() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let query = Query::new(Source::selector("d", CMIS_DOCUMENT)).with_constraint(Constraint::comparison(
        DynamicOperand::property("d", "pages"),
        Operator::LessThan,
        cmis_search::query::ast::StaticOperand::BindVariable("max".to_string()),
    ));

    let results = db.execute_with(&db.context().bind("max", 10i64), &query).unwrap();
    assert_eq!(sorted_ids(&results, "d"), vec!["old"]);

    let err = db.execute(&query).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnresolvedBindVariable);
}

#[test]
fn unknown_selector_fails_before_execution() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), library());

    let query = Query::new(Source::selector("d", CMIS_DOCUMENT))
        .with_constraint(Constraint::in_folder("x", "reports"));
    let err = db.execute(&query).unwrap_err();
    assert_eq!(err.kind, ErrorKind::QueryCompile);
}

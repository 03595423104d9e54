#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use cmis_search::content::memory::MemoryContentSource;
use cmis_search::core::config::Config;
use cmis_search::core::database::SearchDatabase;
use cmis_search::core::types::Document;
use cmis_search::schema::schema::{Schema, CMIS_DOCUMENT, CMIS_FOLDER};
use cmis_search::search::results::QueryResults;

/// Merges stay inline and off so segment layouts are predictable.
pub fn test_config(dir: &Path) -> Config {
    Config {
        auto_merge: false,
        background_merge: false,
        ..Config::default().with_storage_path(dir)
    }
}

pub fn open(dir: &Path, content: Arc<MemoryContentSource>) -> SearchDatabase {
    SearchDatabase::open(test_config(dir), Schema::cmis(), content).unwrap()
}

/// A (folder, root) > B (folder) > C (document).
pub fn abc() -> Arc<MemoryContentSource> {
    Arc::new(MemoryContentSource::with_documents([
        Document::new("A", CMIS_FOLDER, "A"),
        Document::new("B", CMIS_FOLDER, "B").with_parent("A"),
        Document::new("C", CMIS_DOCUMENT, "c.txt").with_parent("B"),
    ]))
}

pub fn sorted_ids(results: &QueryResults, selector: &str) -> Vec<String> {
    let mut ids: Vec<String> = results.ids(selector).iter().map(|id| id.as_str().to_string()).collect();
    ids.sort();
    ids
}

use std::collections::BTreeMap;
use crate::core::error::Error;
use crate::core::types::{ContentId, Value};
use crate::query::ast::SelectorName;

/// Row during execution: one document address per bound selector.
///
/// A selector missing from `nodes` is the null side of an outer join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub nodes: BTreeMap<SelectorName, u32>,
    pub score: f32,
}

impl Row {
    pub fn single(selector: &SelectorName, addr: u32, score: f32) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(selector.clone(), addr);
        Row { nodes, score }
    }

    pub fn node(&self, selector: &SelectorName) -> Option<u32> {
        self.nodes.get(selector).copied()
    }

    /// Both rows side by side; scores add up.
    pub fn merge(&self, other: &Row) -> Row {
        let mut nodes = self.nodes.clone();
        nodes.extend(other.nodes.iter().map(|(k, v)| (k.clone(), *v)));
        Row { nodes, score: self.score + other.score }
    }
}

/// Result row handed to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub ids: BTreeMap<SelectorName, ContentId>,
    pub score: f32,
    /// One entry per result column, `None` where the property is absent.
    pub values: Vec<Option<Value>>,
}

impl ScoredRow {
    pub fn id(&self, selector: &str) -> Option<&ContentId> {
        self.ids.get(&SelectorName::new(selector))
    }
}

/// Search results container
#[derive(Debug)]
pub struct QueryResults {
    pub columns: Vec<String>,
    pub rows: Vec<ScoredRow>,
    pub exceptions: Vec<Error>,
    pub took_ms: u64,
}

impl QueryResults {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_problems(&self) -> bool {
        !self.exceptions.is_empty()
    }

    /// First recorded row failure.
    pub fn top_exception(&self) -> Option<&Error> {
        self.exceptions.first()
    }

    /// Ids bound to `selector`, in row order.
    pub fn ids(&self, selector: &str) -> Vec<&ContentId> {
        self.rows.iter().filter_map(|row| row.id(selector)).collect()
    }

    pub fn column_index(&self, alias: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == alias)
    }
}

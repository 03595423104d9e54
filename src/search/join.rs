//! Row joins for the four join conditions.
//!
//! Value, child and same-node conditions are hash joins on a string key. Descendant
//! joins run one anchored traversal per distinct ancestor document.

use std::collections::{BTreeSet, HashMap};
use roaring::RoaringBitmap;
use crate::core::error::{Error, Result};
use crate::core::types::Value;
use crate::index::fields::{encode_value, NAME_FIELD};
use crate::index::searcher::Searcher;
use crate::query::ast::{JoinCondition, JoinKind, SelectorName};
use crate::search::results::Row;
use crate::search::structural::{children_of, DescendantTraversal};

/// Joins `left` and `right`. Output keeps left order; unmatched right rows of a right
/// outer join follow in right order.
pub fn join_rows(
    searcher: &Searcher,
    kind: JoinKind,
    condition: &JoinCondition,
    left_names: &BTreeSet<SelectorName>,
    left: Vec<Row>,
    right: Vec<Row>,
) -> Result<Vec<Row>> {
    let matches = match_rows(searcher, condition, left_names, &left, &right)?;

    let mut out = Vec::new();
    let mut right_matched = vec![false; right.len()];
    for (i, row) in left.iter().enumerate() {
        for &j in &matches[i] {
            right_matched[j] = true;
            out.push(row.merge(&right[j]));
        }
        if matches[i].is_empty() && kind == JoinKind::LeftOuter {
            out.push(row.clone());
        }
    }
    if kind == JoinKind::RightOuter {
        out.extend(right.into_iter()
            .zip(right_matched)
            .filter(|(_, matched)| !matched)
            .map(|(row, _)| row));
    }

    log::debug!("{:?} join produced {} rows", kind, out.len());
    Ok(out)
}

/// For every left row, the indexes of the right rows it pairs with.
fn match_rows(
    searcher: &Searcher,
    condition: &JoinCondition,
    left_names: &BTreeSet<SelectorName>,
    left: &[Row],
    right: &[Row],
) -> Result<Vec<Vec<usize>>> {
    if let JoinCondition::DescendantNode { ancestor, descendant } = condition {
        let ancestor_on_left = left_names.contains(ancestor);
        return Ok(if ancestor_on_left {
            descendant_matches(searcher, left, ancestor, right, descendant)
        } else {
            let by_right = descendant_matches(searcher, right, ancestor, left, descendant);
            transpose(by_right, left.len())
        });
    }

    let (first, second) = condition_sides(condition)?;
    let (left_sel, right_sel, left_role, right_role) = if left_names.contains(first) {
        (first, second, Side::First, Side::Second)
    } else {
        (second, first, Side::Second, Side::First)
    };

    let mut table: HashMap<String, Vec<usize>> = HashMap::new();
    for (j, row) in right.iter().enumerate() {
        for key in row_keys(searcher, condition, right_role, row.node(right_sel)) {
            table.entry(key).or_default().push(j);
        }
    }

    Ok(left.iter()
        .map(|row| {
            let mut found: Vec<usize> = row_keys(searcher, condition, left_role, row.node(left_sel))
                .iter()
                .filter_map(|key| table.get(key))
                .flatten()
                .copied()
                .collect();
            found.sort_unstable();
            found.dedup();
            found
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    First,
    Second,
}

fn condition_sides(condition: &JoinCondition) -> Result<(&SelectorName, &SelectorName)> {
    match condition {
        JoinCondition::EquiJoin { selector1, selector2, .. }
        | JoinCondition::SameNode { selector1, selector2, .. } => Ok((selector1, selector2)),
        JoinCondition::ChildNode { parent, child } => Ok((parent, child)),
        JoinCondition::DescendantNode { .. } => {
            Err(Error::query_compile("descendant joins have no hash key"))
        }
    }
}

/// Join keys of one side's document; none for a null side.
fn row_keys(searcher: &Searcher, condition: &JoinCondition, side: Side, addr: Option<u32>) -> Vec<String> {
    let Some(doc) = addr.and_then(|a| searcher.document(a)) else {
        return Vec::new();
    };

    match (condition, side) {
        (JoinCondition::EquiJoin { property1, .. }, Side::First) => value_key(doc.property_value(property1)),
        (JoinCondition::EquiJoin { property2, .. }, Side::Second) => value_key(doc.property_value(property2)),
        (JoinCondition::ChildNode { .. }, Side::First) => vec![doc.id.as_str().to_string()],
        (JoinCondition::ChildNode { .. }, Side::Second) => {
            doc.parent_id.iter().map(|p| p.as_str().to_string()).collect()
        }
        (JoinCondition::SameNode { .. }, Side::First) => vec![doc.id.as_str().to_string()],
        (JoinCondition::SameNode { path, .. }, Side::Second) => match path {
            None => vec![doc.id.as_str().to_string()],
            Some(path) => {
                let start: RoaringBitmap = addr.into_iter().collect();
                relative_path(searcher, start, path)
                    .iter()
                    .filter_map(|a| searcher.document(a))
                    .map(|d| d.id.as_str().to_string())
                    .collect()
            }
        },
        (JoinCondition::DescendantNode { .. }, _) => Vec::new(),
    }
}

fn value_key(value: Option<Value>) -> Vec<String> {
    value.map(|v| encode_value(&v)).into_iter().collect()
}

/// Documents reached from `start` by walking child names.
fn relative_path(searcher: &Searcher, start: RoaringBitmap, path: &str) -> RoaringBitmap {
    let mut current = start;
    for name in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if current.is_empty() {
            break;
        }
        let named = searcher.term_docs(NAME_FIELD, &encode_value(&Value::String(name.to_string())));
        current = children_of(searcher, &current) & named;
    }
    current
}

/// For every row of `anchors`, the `targets` rows whose document descends from it.
fn descendant_matches(
    searcher: &Searcher,
    anchors: &[Row],
    ancestor: &SelectorName,
    targets: &[Row],
    descendant: &SelectorName,
) -> Vec<Vec<usize>> {
    let mut by_addr: HashMap<u32, Vec<usize>> = HashMap::new();
    for (j, row) in targets.iter().enumerate() {
        if let Some(addr) = row.node(descendant) {
            by_addr.entry(addr).or_default().push(j);
        }
    }
    let candidates: RoaringBitmap = by_addr.keys().copied().collect();

    let mut cache: HashMap<u32, Vec<usize>> = HashMap::new();
    anchors.iter()
        .map(|row| {
            let Some(addr) = row.node(ancestor) else { return Vec::new() };
            cache.entry(addr)
                .or_insert_with(|| {
                    let Some(doc) = searcher.document(addr) else { return Vec::new() };
                    let mut found: Vec<usize> = DescendantTraversal::from_anchor(searcher, doc.id.clone())
                        .with_filter(candidates.clone())
                        .filter_map(|d| by_addr.get(&d))
                        .flatten()
                        .copied()
                        .collect();
                    found.sort_unstable();
                    found
                })
                .clone()
        })
        .collect()
}

/// Turns per-right-row matches into per-left-row matches.
fn transpose(by_right: Vec<Vec<usize>>, left_len: usize) -> Vec<Vec<usize>> {
    let mut by_left = vec![Vec::new(); left_len];
    for (j, lefts) in by_right.into_iter().enumerate() {
        for i in lefts {
            by_left[i].push(j);
        }
    }
    by_left
}

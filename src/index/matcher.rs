use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use regex::Regex;
use crate::core::error::{Error, Result};
use crate::core::types::{ContentId, Value};
use crate::index::fields::like_to_regex;
use crate::index::searcher::Searcher;
use crate::query::ast::{DynamicOperand, Operator};

/// Per-document predicate for operands the index cannot answer from terms.
pub trait DocumentMatcher: Send + Sync + fmt::Debug {
    /// A row-level error means only this document is skipped.
    fn matches(&self, searcher: &Searcher, addr: u32) -> Result<bool>;
}

/// `operand op literal`, evaluated on the stored document.
#[derive(Debug)]
pub struct OperandMatcher {
    operand: DynamicOperand,
    operator: Operator,
    literal: Value,
    pattern: Option<Regex>,
}

impl DocumentMatcher for OperandMatcher {
    fn matches(&self, searcher: &Searcher, addr: u32) -> Result<bool> {
        let Some(value) = evaluate_operand(searcher, &self.operand, addr)? else {
            return Ok(false);
        };

        if let Some(pattern) = &self.pattern {
            return Ok(pattern.is_match(&value.to_string()));
        }

        Ok(value.compare(&self.literal)
            .map(|ordering| self.operator.accepts(ordering))
            .unwrap_or(false))
    }
}

/// Builds leaf matchers for comparisons.
pub struct DocumentMatcherFactory;

impl DocumentMatcherFactory {
    pub fn comparison(operand: &DynamicOperand, operator: Operator, literal: &Value) -> Result<Arc<dyn DocumentMatcher>> {
        let pattern = match operator {
            Operator::Like => match literal.as_str() {
                Some(p) => Some(like_to_regex(p)?),
                None => {
                    return Err(Error::query_compile(format!(
                        "LIKE needs a string pattern, got {}", literal.type_name()
                    )));
                }
            },
            _ => None,
        };

        Ok(Arc::new(OperandMatcher {
            operand: operand.clone(),
            operator,
            literal: literal.clone(),
            pattern,
        }))
    }
}

/// Value of a dynamic operand for one document; `None` when the property is absent.
pub fn evaluate_operand(searcher: &Searcher, operand: &DynamicOperand, addr: u32) -> Result<Option<Value>> {
    let doc = searcher.document(addr)
        .ok_or_else(|| Error::row(format!("document {} is not live in this snapshot", addr)))?;

    match operand {
        DynamicOperand::PropertyValue { property, .. } => Ok(doc.property_value(property)),
        DynamicOperand::NodeName { .. } => Ok(Some(Value::String(doc.name.clone()))),
        DynamicOperand::NodeLocalName { .. } => Ok(Some(Value::String(doc.local_name().to_string()))),
        DynamicOperand::NodeDepth { .. } => node_depth(searcher, &doc.id, doc.parent_id.as_ref()).map(Some),
        DynamicOperand::UpperCase(inner) => fold_case(searcher, inner, addr, str::to_uppercase),
        DynamicOperand::LowerCase(inner) => fold_case(searcher, inner, addr, str::to_lowercase),
        DynamicOperand::Length(inner) => Ok(evaluate_operand(searcher, inner, addr)?
            .map(|v| Value::Integer(v.to_string().chars().count() as i64))),
    }
}

fn fold_case(
    searcher: &Searcher,
    inner: &DynamicOperand,
    addr: u32,
    fold: fn(&str) -> String,
) -> Result<Option<Value>> {
    match evaluate_operand(searcher, inner, addr)? {
        None => Ok(None),
        Some(value) => match value.as_str() {
            Some(s) => Ok(Some(Value::String(fold(s)))),
            None => Err(Error::row(format!(
                "case conversion applied to a {} value", value.type_name()
            ))),
        },
    }
}

/// Number of ancestors, following parent links through the live index.
fn node_depth(searcher: &Searcher, id: &ContentId, parent: Option<&ContentId>) -> Result<Value> {
    let mut depth = 0i64;
    let mut seen: HashSet<ContentId> = HashSet::new();
    seen.insert(id.clone());
    let mut current = parent.cloned();

    while let Some(parent_id) = current {
        if !seen.insert(parent_id.clone()) {
            return Err(Error::row(format!("parent cycle above {}", id)));
        }
        let parent_doc = searcher.find(&parent_id)
            .and_then(|addr| searcher.document(addr))
            .ok_or_else(|| Error::row(format!("ancestor {} of {} is not indexed", parent_id, id)))?;
        depth += 1;
        current = parent_doc.parent_id.clone();
    }

    Ok(Value::Integer(depth))
}

use std::ops::Bound;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::index::case_insensitive::{CaseFold, CaseInsensitiveQuery, CaseMatch};
use crate::index::fields::{
    encode_value, fulltext_field, like_to_regex, property_field, value_prefix,
    LOCAL_NAME_FIELD, NAME_FIELD, PARENT_FIELD, PROPS_FIELD, STRING_PREFIX, TYPE_FIELD,
};
use crate::index::matcher::DocumentMatcherFactory;
use crate::index::native::{BoolQuery, NativeQuery};
use crate::query::ast::{Comparison, Constraint, DynamicOperand, Operator, Selector, StaticOperand};
use crate::schema::schema::Schema;

/// Translates bound constraints into native queries.
pub struct NativeQueryBuilder<'a> {
    schema: &'a Schema,
}

/// Index field an operand reads directly, with the query matching documents that have it.
struct FieldOperand {
    field: String,
    exists: NativeQuery,
}

impl<'a> NativeQueryBuilder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        NativeQueryBuilder { schema }
    }

    /// Documents of the selector's type or one of its subtypes.
    pub fn source_query(&self, selector: &Selector) -> NativeQuery {
        NativeQuery::Terms {
            field: TYPE_FIELD.to_string(),
            terms: self.schema.query_types(&selector.type_name),
        }
    }

    /// One boolean query for a plan leaf: the type filter plus every constraint on it.
    pub fn leaf_query(&self, selector: &Selector, constraints: &[Constraint]) -> Result<NativeQuery> {
        let must = constraints.iter()
            .map(|c| self.constraint(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(NativeQuery::Bool(BoolQuery {
            must,
            filter: vec![self.source_query(selector)],
            ..BoolQuery::default()
        }))
    }

    pub fn constraint(&self, constraint: &Constraint) -> Result<NativeQuery> {
        Ok(match constraint {
            Constraint::And(a, b) => NativeQuery::Bool(BoolQuery {
                must: vec![self.constraint(a)?, self.constraint(b)?],
                ..BoolQuery::default()
            }),
            Constraint::Or(a, b) => NativeQuery::Bool(BoolQuery {
                should: vec![self.constraint(a)?, self.constraint(b)?],
                ..BoolQuery::default()
            }),
            Constraint::Not(c) => NativeQuery::Bool(BoolQuery {
                must_not: vec![self.constraint(c)?],
                ..BoolQuery::default()
            }),
            Constraint::Comparison(cmp) => self.comparison(cmp)?,
            Constraint::PropertyExistence { property, .. } => NativeQuery::term(PROPS_FIELD, property),
            Constraint::FullTextSearch { property, expression, .. } => NativeQuery::FullText {
                field: fulltext_field(property.as_deref()),
                expression: expression.clone(),
            },
            Constraint::ChildNode { path, .. } => NativeQuery::Children(Box::new(NativeQuery::path(path))),
            Constraint::DescendantNode { path, .. } => {
                NativeQuery::Descendants(Box::new(NativeQuery::path(path)))
            }
            Constraint::InFolder { folder_id, .. } => NativeQuery::term(PARENT_FIELD, folder_id.as_str()),
            Constraint::InTree { folder_id, .. } => NativeQuery::DescendantsOfAnchor(folder_id.clone()),
        })
    }

    fn comparison(&self, cmp: &Comparison) -> Result<NativeQuery> {
        let literal = match &cmp.operand2 {
            StaticOperand::Literal(value) => value,
            StaticOperand::BindVariable(name) => {
                return Err(Error::new(
                    ErrorKind::UnresolvedBindVariable,
                    format!("variable ${} reached the index unbound", name),
                ));
            }
        };

        match &cmp.operand1 {
            DynamicOperand::UpperCase(inner) | DynamicOperand::LowerCase(inner) => {
                let fold = match &cmp.operand1 {
                    DynamicOperand::UpperCase(_) => CaseFold::Upper,
                    _ => CaseFold::Lower,
                };
                if let (Some(target), Some(text)) = (field_operand(inner), literal.as_str()) {
                    return Ok(NativeQuery::CaseInsensitive(CaseInsensitiveQuery::new(
                        &target.field,
                        fold,
                        case_match(cmp.operator, text)?,
                    )));
                }
            }
            operand => {
                if let Some(target) = field_operand(operand) {
                    let indexed = match operand {
                        DynamicOperand::PropertyValue { .. } => true,
                        _ => literal.as_str().is_some(),
                    };
                    if indexed {
                        return field_comparison(target, cmp.operator, literal);
                    }
                }
            }
        }

        Ok(NativeQuery::Matcher(DocumentMatcherFactory::comparison(
            &cmp.operand1,
            cmp.operator,
            literal,
        )?))
    }
}

fn field_operand(operand: &DynamicOperand) -> Option<FieldOperand> {
    match operand {
        DynamicOperand::PropertyValue { property, .. } => Some(FieldOperand {
            field: property_field(property),
            exists: NativeQuery::term(PROPS_FIELD, property),
        }),
        DynamicOperand::NodeName { .. } => Some(FieldOperand {
            field: NAME_FIELD.to_string(),
            exists: NativeQuery::MatchAll,
        }),
        DynamicOperand::NodeLocalName { .. } => Some(FieldOperand {
            field: LOCAL_NAME_FIELD.to_string(),
            exists: NativeQuery::MatchAll,
        }),
        _ => None,
    }
}

fn field_comparison(target: FieldOperand, operator: Operator, literal: &Value) -> Result<NativeQuery> {
    let term = encode_value(literal);
    let range = |lower: Bound<String>, upper: Bound<String>| NativeQuery::Range {
        field: target.field.clone(),
        prefix: value_prefix(literal).to_string(),
        lower,
        upper,
    };

    Ok(match operator {
        Operator::EqualTo => NativeQuery::term(&target.field, &term),
        Operator::NotEqualTo => NativeQuery::Bool(BoolQuery {
            filter: vec![target.exists.clone()],
            must_not: vec![NativeQuery::term(&target.field, &term)],
            ..BoolQuery::default()
        }),
        Operator::LessThan => range(Bound::Unbounded, Bound::Excluded(term)),
        Operator::LessThanOrEqualTo => range(Bound::Unbounded, Bound::Included(term)),
        Operator::GreaterThan => range(Bound::Excluded(term), Bound::Unbounded),
        Operator::GreaterThanOrEqualTo => range(Bound::Included(term), Bound::Unbounded),
        Operator::Like => {
            let pattern = literal.as_str().ok_or_else(|| {
                Error::query_compile(format!("LIKE needs a string pattern, got {}", literal.type_name()))
            })?;
            NativeQuery::Regex {
                field: target.field.clone(),
                prefix: STRING_PREFIX.to_string(),
                pattern: like_to_regex(pattern)?,
            }
        }
    })
}

fn case_match(operator: Operator, text: &str) -> Result<CaseMatch> {
    let value = || text.to_string();
    Ok(match operator {
        Operator::EqualTo => CaseMatch::Range {
            lower: Bound::Included(value()),
            upper: Bound::Included(value()),
        },
        Operator::NotEqualTo => CaseMatch::NotEqual(value()),
        Operator::LessThan => CaseMatch::Range { lower: Bound::Unbounded, upper: Bound::Excluded(value()) },
        Operator::LessThanOrEqualTo => CaseMatch::Range { lower: Bound::Unbounded, upper: Bound::Included(value()) },
        Operator::GreaterThan => CaseMatch::Range { lower: Bound::Excluded(value()), upper: Bound::Unbounded },
        Operator::GreaterThanOrEqualTo => CaseMatch::Range { lower: Bound::Included(value()), upper: Bound::Unbounded },
        Operator::Like => CaseMatch::Pattern(like_to_regex(text)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Document;
    use crate::index::searcher::tests::searcher_over;
    use crate::query::ast::SelectorName;
    use crate::query::context::QueryExecutionExceptions;

    fn run(constraint: Constraint) -> Vec<String> {
        let searcher = searcher_over(vec![vec![
            Document::new("a", "cmis:document", "Alpha").with_property("size", 10i64).with_property("title", "Quarterly Report"),
            Document::new("b", "cmis:document", "beta").with_property("size", 25.5),
            Document::new("c", "cmis:folder", "Gamma"),
        ]]);
        let schema = Schema::cmis();
        let builder = NativeQueryBuilder::new(&schema);
        let selector = Selector { name: SelectorName::new("d"), type_name: "cmis:document".to_string() };
        let query = builder.leaf_query(&selector, &[constraint]).unwrap();
        let hits = searcher.search(&query, &QueryExecutionExceptions::default()).unwrap();
        let mut ids: Vec<String> = hits.docs.iter()
            .map(|addr| searcher.document(addr).unwrap().id.as_str().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn numeric_ranges_mix_integers_and_decimals() {
        let size = || DynamicOperand::property("d", "size");
        assert_eq!(run(Constraint::comparison(size(), Operator::GreaterThan, Value::Integer(10))), vec!["b"]);
        assert_eq!(run(Constraint::comparison(size(), Operator::LessThanOrEqualTo, Value::Decimal(25.5))), vec!["a", "b"]);
    }

    #[test]
    fn integers_beyond_f64_precision_compare_exactly() {
        let searcher = searcher_over(vec![vec![
            Document::new("big", "cmis:document", "big").with_property("n", 9_007_199_254_740_993i64),
            Document::new("edge", "cmis:document", "edge").with_property("n", 9_007_199_254_740_992i64),
        ]]);
        let schema = Schema::cmis();
        let builder = NativeQueryBuilder::new(&schema);
        let selector = Selector { name: SelectorName::new("d"), type_name: "cmis:document".to_string() };
        let matching = |operator, value: i64| {
            let c = Constraint::comparison(DynamicOperand::property("d", "n"), operator, Value::Integer(value));
            let query = builder.leaf_query(&selector, &[c]).unwrap();
            let hits = searcher.search(&query, &QueryExecutionExceptions::default()).unwrap();
            let mut ids: Vec<String> = hits.docs.iter()
                .map(|addr| searcher.document(addr).unwrap().id.as_str().to_string())
                .collect();
            ids.sort();
            ids
        };

        assert_eq!(matching(Operator::EqualTo, 9_007_199_254_740_992), vec!["edge"]);
        assert_eq!(matching(Operator::EqualTo, 9_007_199_254_740_993), vec!["big"]);
        assert_eq!(matching(Operator::GreaterThan, 9_007_199_254_740_992), vec!["big"]);
        assert_eq!(matching(Operator::NotEqualTo, 9_007_199_254_740_993), vec!["edge"]);
    }

    #[test]
    fn not_equal_requires_the_property() {
        let c = Constraint::comparison(DynamicOperand::property("d", "title"), Operator::NotEqualTo, Value::from("x"));
        assert_eq!(run(c), vec!["a"]);
    }

    #[test]
    fn case_insensitive_name_match() {
        let name = DynamicOperand::NodeName { selector: "d".into() }.lower();
        assert_eq!(run(Constraint::comparison(name.clone(), Operator::EqualTo, Value::from("alpha"))), vec!["a"]);
        assert_eq!(run(Constraint::comparison(name, Operator::Like, Value::from("%a"))), vec!["a", "b"]);
    }

    #[test]
    fn type_filter_excludes_folders() {
        let c = Constraint::PropertyExistence { selector: "d".into(), property: "cmis:name".to_string() };
        assert_eq!(run(c), vec!["a", "b"]);
    }

    #[test]
    fn unbound_variables_are_rejected() {
        let schema = Schema::cmis();
        let builder = NativeQueryBuilder::new(&schema);
        let c = Constraint::comparison(DynamicOperand::property("d", "size"), Operator::EqualTo, StaticOperand::BindVariable("v".to_string()));
        assert_eq!(builder.constraint(&c).unwrap_err().kind, ErrorKind::UnresolvedBindVariable);
    }
}

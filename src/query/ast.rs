//! Abstract query model: the parsed, backend-independent form of a CMIS-SQL query.
//!
//! Every type here is an immutable value. Queries are built by an external parser (or
//! by hand through the constructors below) and consumed by the planner.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ContentId, Value};
use crate::query::fulltext::FullTextExpression;

/// Name of one query source, akin to a SQL table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectorName(Arc<str>);

impl SelectorName {
    pub fn new(name: &str) -> Self {
        SelectorName(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SelectorName {
    fn from(name: &str) -> Self {
        SelectorName::new(name)
    }
}

impl fmt::Display for SelectorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub name: SelectorName,
    pub type_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Source,
    pub right: Source,
    pub kind: JoinKind,
    pub condition: JoinCondition,
}

/// Source tree of a query; leaves are selectors.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Selector(Selector),
    Join(Box<Join>),
}

impl Source {
    pub fn selector(name: &str, type_name: &str) -> Self {
        Source::Selector(Selector {
            name: SelectorName::new(name),
            type_name: type_name.to_string(),
        })
    }

    pub fn join(left: Source, right: Source, kind: JoinKind, condition: JoinCondition) -> Self {
        Source::Join(Box::new(Join { left, right, kind, condition }))
    }

    /// Selectors in left-to-right order.
    pub fn selectors(&self) -> Vec<&Selector> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a Selector>) {
        match self {
            Source::Selector(selector) => out.push(selector),
            Source::Join(join) => {
                join.left.collect_selectors(out);
                join.right.collect_selectors(out);
            }
        }
    }

    pub fn selector_names(&self) -> BTreeSet<SelectorName> {
        self.selectors().into_iter().map(|s| s.name.clone()).collect()
    }

    /// The leftmost selector; the one whose ordering can be delegated to the backend.
    pub fn primary_selector(&self) -> &Selector {
        match self {
            Source::Selector(selector) => selector,
            Source::Join(join) => join.left.primary_selector(),
        }
    }

    pub fn find_selector(&self, name: &SelectorName) -> Option<&Selector> {
        self.selectors().into_iter().find(|s| &s.name == name)
    }

    pub fn has_right_outer_join(&self) -> bool {
        match self {
            Source::Selector(_) => false,
            Source::Join(join) => {
                join.kind == JoinKind::RightOuter
                    || join.left.has_right_outer_join()
                    || join.right.has_right_outer_join()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    EquiJoin {
        selector1: SelectorName,
        property1: String,
        selector2: SelectorName,
        property2: String,
    },
    /// `selector1` is the node at `path` relative to `selector2` (or the node itself).
    SameNode {
        selector1: SelectorName,
        selector2: SelectorName,
        path: Option<String>,
    },
    ChildNode {
        parent: SelectorName,
        child: SelectorName,
    },
    DescendantNode {
        ancestor: SelectorName,
        descendant: SelectorName,
    },
}

impl JoinCondition {
    pub fn selector_names(&self) -> BTreeSet<SelectorName> {
        let (a, b) = match self {
            JoinCondition::EquiJoin { selector1, selector2, .. } => (selector1, selector2),
            JoinCondition::SameNode { selector1, selector2, .. } => (selector1, selector2),
            JoinCondition::ChildNode { parent, child } => (parent, child),
            JoinCondition::DescendantNode { ancestor, descendant } => (ancestor, descendant),
        };
        [a.clone(), b.clone()].into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    Like,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::EqualTo => "=",
            Operator::NotEqualTo => "<>",
            Operator::LessThan => "<",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::Like => "LIKE",
        }
    }

    /// Applies an ordering operator to the result of comparing operand to literal.
    /// `LIKE` is pattern based and never satisfied by an ordering.
    pub fn accepts(&self, ordering: CmpOrdering) -> bool {
        match self {
            Operator::EqualTo => ordering == CmpOrdering::Equal,
            Operator::NotEqualTo => ordering != CmpOrdering::Equal,
            Operator::LessThan => ordering == CmpOrdering::Less,
            Operator::LessThanOrEqualTo => ordering != CmpOrdering::Greater,
            Operator::GreaterThan => ordering == CmpOrdering::Greater,
            Operator::GreaterThanOrEqualTo => ordering != CmpOrdering::Less,
            Operator::Like => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DynamicOperand {
    PropertyValue { selector: SelectorName, property: String },
    NodeDepth { selector: SelectorName },
    NodeName { selector: SelectorName },
    NodeLocalName { selector: SelectorName },
    UpperCase(Box<DynamicOperand>),
    LowerCase(Box<DynamicOperand>),
    Length(Box<DynamicOperand>),
}

impl DynamicOperand {
    pub fn property(selector: &str, property: &str) -> Self {
        DynamicOperand::PropertyValue {
            selector: SelectorName::new(selector),
            property: property.to_string(),
        }
    }

    pub fn upper(self) -> Self {
        DynamicOperand::UpperCase(Box::new(self))
    }

    pub fn lower(self) -> Self {
        DynamicOperand::LowerCase(Box::new(self))
    }

    pub fn length(self) -> Self {
        DynamicOperand::Length(Box::new(self))
    }

    /// The selector every leaf of this operand refers to.
    pub fn selector(&self) -> &SelectorName {
        match self {
            DynamicOperand::PropertyValue { selector, .. }
            | DynamicOperand::NodeDepth { selector }
            | DynamicOperand::NodeName { selector }
            | DynamicOperand::NodeLocalName { selector } => selector,
            DynamicOperand::UpperCase(inner)
            | DynamicOperand::LowerCase(inner)
            | DynamicOperand::Length(inner) => inner.selector(),
        }
    }

    pub fn selector_names(&self) -> BTreeSet<SelectorName> {
        [self.selector().clone()].into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticOperand {
    Literal(Value),
    BindVariable(String),
}

impl StaticOperand {
    pub fn resolve(&self, variables: &HashMap<String, Value>) -> Result<Value> {
        match self {
            StaticOperand::Literal(value) => Ok(value.clone()),
            StaticOperand::BindVariable(name) => variables.get(name).cloned().ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedBindVariable,
                    format!("no value bound for variable ${}", name),
                )
            }),
        }
    }
}

impl From<Value> for StaticOperand {
    fn from(value: Value) -> Self {
        StaticOperand::Literal(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub operand1: DynamicOperand,
    pub operator: Operator,
    pub operand2: StaticOperand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
    Not(Box<Constraint>),
    Comparison(Comparison),
    PropertyExistence { selector: SelectorName, property: String },
    FullTextSearch {
        selector: SelectorName,
        property: Option<String>,
        expression: FullTextExpression,
    },
    /// Children of the node(s) at `path`.
    ChildNode { selector: SelectorName, path: String },
    /// Descendants of the node(s) at `path`.
    DescendantNode { selector: SelectorName, path: String },
    InFolder { selector: SelectorName, folder_id: ContentId },
    InTree { selector: SelectorName, folder_id: ContentId },
}

impl Constraint {
    pub fn and(a: Constraint, b: Constraint) -> Self {
        Constraint::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Constraint, b: Constraint) -> Self {
        Constraint::Or(Box::new(a), Box::new(b))
    }

    pub fn not(c: Constraint) -> Self {
        Constraint::Not(Box::new(c))
    }

    pub fn comparison(
        operand1: DynamicOperand,
        operator: Operator,
        operand2: impl Into<StaticOperand>,
    ) -> Self {
        Constraint::Comparison(Comparison {
            operand1,
            operator,
            operand2: operand2.into(),
        })
    }

    pub fn property_equals(selector: &str, property: &str, value: impl Into<Value>) -> Self {
        Self::comparison(
            DynamicOperand::property(selector, property),
            Operator::EqualTo,
            StaticOperand::Literal(value.into()),
        )
    }

    pub fn in_folder(selector: &str, folder_id: &str) -> Self {
        Constraint::InFolder {
            selector: SelectorName::new(selector),
            folder_id: ContentId::new(folder_id),
        }
    }

    pub fn in_tree(selector: &str, folder_id: &str) -> Self {
        Constraint::InTree {
            selector: SelectorName::new(selector),
            folder_id: ContentId::new(folder_id),
        }
    }

    pub fn child_node(selector: &str, path: &str) -> Self {
        Constraint::ChildNode {
            selector: SelectorName::new(selector),
            path: path.to_string(),
        }
    }

    pub fn descendant_node(selector: &str, path: &str) -> Self {
        Constraint::DescendantNode {
            selector: SelectorName::new(selector),
            path: path.to_string(),
        }
    }

    /// Parses a CMIS full-text expression into a `CONTAINS` constraint.
    pub fn full_text(selector: &str, property: Option<&str>, expression: &str) -> Result<Self> {
        Ok(Constraint::FullTextSearch {
            selector: SelectorName::new(selector),
            property: property.map(str::to_string),
            expression: FullTextExpression::parse(expression)?,
        })
    }

    /// Conjunction of all constraints, or `None` for an empty list.
    pub fn all(constraints: Vec<Constraint>) -> Option<Constraint> {
        constraints.into_iter().reduce(Constraint::and)
    }

    pub fn selector_names(&self) -> BTreeSet<SelectorName> {
        match self {
            Constraint::And(a, b) | Constraint::Or(a, b) => {
                let mut names = a.selector_names();
                names.extend(b.selector_names());
                names
            }
            Constraint::Not(c) => c.selector_names(),
            Constraint::Comparison(cmp) => cmp.operand1.selector_names(),
            Constraint::PropertyExistence { selector, .. }
            | Constraint::FullTextSearch { selector, .. }
            | Constraint::ChildNode { selector, .. }
            | Constraint::DescendantNode { selector, .. }
            | Constraint::InFolder { selector, .. }
            | Constraint::InTree { selector, .. } => [selector.clone()].into_iter().collect(),
        }
    }

    /// Splits nested `And`s into their conjuncts, left to right.
    pub fn conjuncts(self) -> Vec<Constraint> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(c) = pending.pop() {
            match c {
                Constraint::And(a, b) => {
                    pending.push(*b);
                    pending.push(*a);
                }
                other => out.push(other),
            }
        }
        out
    }

    pub fn depth(&self) -> usize {
        match self {
            Constraint::And(a, b) | Constraint::Or(a, b) => 1 + a.depth().max(b.depth()),
            Constraint::Not(c) => 1 + c.depth(),
            _ => 1,
        }
    }

    /// Replaces every bind variable with its value.
    pub fn bind(&self, variables: &HashMap<String, Value>) -> Result<Constraint> {
        Ok(match self {
            Constraint::And(a, b) => Constraint::and(a.bind(variables)?, b.bind(variables)?),
            Constraint::Or(a, b) => Constraint::or(a.bind(variables)?, b.bind(variables)?),
            Constraint::Not(c) => Constraint::not(c.bind(variables)?),
            Constraint::Comparison(cmp) => Constraint::Comparison(Comparison {
                operand1: cmp.operand1.clone(),
                operator: cmp.operator,
                operand2: StaticOperand::Literal(cmp.operand2.resolve(variables)?),
            }),
            other => other.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub operand: DynamicOperand,
    pub order: Order,
}

impl Ordering {
    pub fn ascending(operand: DynamicOperand) -> Self {
        Ordering { operand, order: Order::Ascending }
    }

    pub fn descending(operand: DynamicOperand) -> Self {
        Ordering { operand, order: Order::Descending }
    }
}

/// Projection entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub selector: SelectorName,
    pub property: String,
    pub alias: String,
}

impl Column {
    pub fn new(selector: &str, property: &str) -> Self {
        Column {
            selector: SelectorName::new(selector),
            property: property.to_string(),
            alias: property.to_string(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub source: Source,
    pub constraint: Option<Constraint>,
    pub columns: Vec<Column>,
    pub orderings: Vec<Ordering>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new(source: Source) -> Self {
        Query {
            source,
            constraint: None,
            columns: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(match self.constraint.take() {
            Some(existing) => Constraint::and(existing, constraint),
            None => constraint,
        });
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.orderings.push(ordering);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for DynamicOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicOperand::PropertyValue { selector, property } => write!(f, "{}.[{}]", selector, property),
            DynamicOperand::NodeDepth { selector } => write!(f, "DEPTH({})", selector),
            DynamicOperand::NodeName { selector } => write!(f, "NAME({})", selector),
            DynamicOperand::NodeLocalName { selector } => write!(f, "LOCALNAME({})", selector),
            DynamicOperand::UpperCase(inner) => write!(f, "UPPER({})", inner),
            DynamicOperand::LowerCase(inner) => write!(f, "LOWER({})", inner),
            DynamicOperand::Length(inner) => write!(f, "LENGTH({})", inner),
        }
    }
}

impl fmt::Display for StaticOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticOperand::Literal(Value::String(s)) => write!(f, "'{}'", s),
            StaticOperand::Literal(value) => write!(f, "{}", value),
            StaticOperand::BindVariable(name) => write!(f, "${}", name),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::And(a, b) => write!(f, "({} AND {})", a, b),
            Constraint::Or(a, b) => write!(f, "({} OR {})", a, b),
            Constraint::Not(c) => write!(f, "NOT {}", c),
            Constraint::Comparison(cmp) => {
                write!(f, "{} {} {}", cmp.operand1, cmp.operator.symbol(), cmp.operand2)
            }
            Constraint::PropertyExistence { selector, property } => {
                write!(f, "{}.[{}] IS NOT NULL", selector, property)
            }
            Constraint::FullTextSearch { selector, property: Some(p), expression } => {
                write!(f, "CONTAINS({}.[{}], '{}')", selector, p, expression)
            }
            Constraint::FullTextSearch { selector, property: None, expression } => {
                write!(f, "CONTAINS({}, '{}')", selector, expression)
            }
            Constraint::ChildNode { selector, path } => write!(f, "ISCHILDNODE({}, '{}')", selector, path),
            Constraint::DescendantNode { selector, path } => {
                write!(f, "ISDESCENDANTNODE({}, '{}')", selector, path)
            }
            Constraint::InFolder { selector, folder_id } => write!(f, "IN_FOLDER({}, '{}')", selector, folder_id),
            Constraint::InTree { selector, folder_id } => write!(f, "IN_TREE({}, '{}')", selector, folder_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<SelectorName> {
        list.iter().map(|n| SelectorName::new(n)).collect()
    }

    #[test]
    fn composite_constraint_names_union_of_children() {
        let c = Constraint::or(
            Constraint::property_equals("a", "cmis:name", "x"),
            Constraint::not(Constraint::in_folder("b", "f1")),
        );
        assert_eq!(c.selector_names(), names(&["a", "b"]));
    }

    #[test]
    fn operand_names_follow_nesting() {
        let op = DynamicOperand::property("doc", "title").upper().length();
        assert_eq!(op.selector_names(), names(&["doc"]));
    }

    #[test]
    fn conjuncts_flatten_left_to_right() {
        let c = Constraint::and(
            Constraint::and(Constraint::in_folder("a", "1"), Constraint::in_folder("a", "2")),
            Constraint::in_folder("a", "3"),
        );
        let parts = c.conjuncts();
        assert_eq!(parts, vec![
            Constraint::in_folder("a", "1"),
            Constraint::in_folder("a", "2"),
            Constraint::in_folder("a", "3"),
        ]);
    }

    #[test]
    fn unbound_variable_is_reported() {
        let c = Constraint::comparison(
            DynamicOperand::property("a", "p"),
            Operator::EqualTo,
            StaticOperand::BindVariable("missing".to_string()),
        );
        let err = c.bind(&HashMap::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvedBindVariable);

        let mut vars = HashMap::new();
        vars.insert("missing".to_string(), Value::Integer(4));
        let bound = c.bind(&vars).unwrap();
        match bound {
            Constraint::Comparison(cmp) => {
                assert_eq!(cmp.operand2, StaticOperand::Literal(Value::Integer(4)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn primary_selector_is_leftmost() {
        let source = Source::join(
            Source::join(
                Source::selector("f", "cmis:folder"),
                Source::selector("d", "cmis:document"),
                JoinKind::Inner,
                JoinCondition::ChildNode { parent: "f".into(), child: "d".into() },
            ),
            Source::selector("x", "cmis:document"),
            JoinKind::RightOuter,
            JoinCondition::SameNode { selector1: "d".into(), selector2: "x".into(), path: None },
        );
        assert_eq!(source.primary_selector().name.as_str(), "f");
        assert!(source.has_right_outer_join());
        assert_eq!(source.selector_names(), names(&["d", "f", "x"]));
    }
}

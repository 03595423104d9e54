use std::collections::{BTreeSet, HashMap};
use std::fmt;
use crate::core::error::{Error, Result};
use crate::query::ast::{
    Constraint, JoinCondition, JoinKind, Ordering, Query, Selector, SelectorName, Source,
};
use crate::query::context::QueryExecutionContext;
use crate::query::types::ValidationConfig;
use crate::query::validator::QueryValidator;

/// Node of a canonical execution plan: `Limit → Sort → Select* → Source | Join`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Limit { limit: Option<usize>, offset: usize, child: Box<PlanNode> },
    Sort { orderings: Vec<Ordering>, child: Box<PlanNode> },
    Select { constraint: Constraint, child: Box<PlanNode> },
    Source { selector: Selector },
    Join { kind: JoinKind, condition: JoinCondition, left: Box<PlanNode>, right: Box<PlanNode> },
}

impl PlanNode {
    pub fn selector_names(&self) -> BTreeSet<SelectorName> {
        match self {
            PlanNode::Limit { child, .. }
            | PlanNode::Sort { child, .. }
            | PlanNode::Select { child, .. } => child.selector_names(),
            PlanNode::Source { selector } => [selector.name.clone()].into_iter().collect(),
            PlanNode::Join { left, right, .. } => {
                let mut names = left.selector_names();
                names.extend(right.selector_names());
                names
            }
        }
    }

    /// Rebuilds the tree bottom-up, applying `f` to every node after its children.
    pub fn transform_up(self, f: &mut dyn FnMut(PlanNode) -> PlanNode) -> PlanNode {
        let node = match self {
            PlanNode::Limit { limit, offset, child } => PlanNode::Limit {
                limit,
                offset,
                child: Box::new(child.transform_up(f)),
            },
            PlanNode::Sort { orderings, child } => PlanNode::Sort {
                orderings,
                child: Box::new(child.transform_up(f)),
            },
            PlanNode::Select { constraint, child } => PlanNode::Select {
                constraint,
                child: Box::new(child.transform_up(f)),
            },
            PlanNode::Join { kind, condition, left, right } => PlanNode::Join {
                kind,
                condition,
                left: Box::new(left.transform_up(f)),
                right: Box::new(right.transform_up(f)),
            },
            leaf @ PlanNode::Source { .. } => leaf,
        };
        f(node)
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            PlanNode::Limit { limit, offset, child } => {
                match limit {
                    Some(n) => writeln!(f, "{}Limit {} offset {}", pad, n, offset)?,
                    None => writeln!(f, "{}Limit all offset {}", pad, offset)?,
                }
                child.fmt_indented(f, depth + 1)
            }
            PlanNode::Sort { orderings, child } => {
                let keys: Vec<String> = orderings.iter()
                    .map(|o| format!("{} {:?}", o.operand, o.order))
                    .collect();
                writeln!(f, "{}Sort [{}]", pad, keys.join(", "))?;
                child.fmt_indented(f, depth + 1)
            }
            PlanNode::Select { constraint, child } => {
                writeln!(f, "{}Select {}", pad, constraint)?;
                child.fmt_indented(f, depth + 1)
            }
            PlanNode::Source { selector } => {
                writeln!(f, "{}Source {} AS {}", pad, selector.type_name, selector.name)
            }
            PlanNode::Join { kind, condition, left, right } => {
                writeln!(f, "{}Join {:?} {:?}", pad, kind, condition)?;
                left.fmt_indented(f, depth + 1)?;
                right.fmt_indented(f, depth + 1)
            }
        }
    }
}

/// Compiled form of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecutionPlan {
    pub root: PlanNode,
    /// Orderings delegated to the primary selector's leaf when no `Sort` node exists.
    pub pushed_orderings: Vec<Ordering>,
}

impl fmt::Display for QueryExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt_indented(f, 0)?;
        if !self.pushed_orderings.is_empty() {
            let keys: Vec<String> = self.pushed_orderings.iter()
                .map(|o| format!("{} {:?}", o.operand, o.order))
                .collect();
            writeln!(f, "pushed orderings [{}]", keys.join(", "))?;
        }
        Ok(())
    }
}

/// Query planner creates execution plans
pub struct QueryPlanner {
    validator: QueryValidator,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        QueryPlanner::new(ValidationConfig::default())
    }
}

impl QueryPlanner {
    pub fn new(config: ValidationConfig) -> Self {
        QueryPlanner { validator: QueryValidator::new(config) }
    }

    /// Validates the query and builds its canonical plan.
    pub fn plan(&self, context: &QueryExecutionContext, query: &Query) -> Result<QueryExecutionPlan> {
        self.validator.validate(&context.schema, query)?;

        let mut selects: HashMap<SelectorName, Vec<Constraint>> = HashMap::new();
        if let Some(constraint) = &query.constraint {
            for conjunct in constraint.clone().conjuncts() {
                let names = conjunct.selector_names();
                let mut iter = names.iter();
                match (iter.next(), iter.next()) {
                    (Some(name), None) => selects.entry(name.clone()).or_default().push(conjunct),
                    _ => {
                        return Err(Error::query_compile(format!(
                            "predicate {} references selectors {:?}; express it as a join condition",
                            conjunct, names
                        )));
                    }
                }
            }
        }

        let mut root = Self::plan_source(&query.source, &mut selects);

        let pushed_orderings = if Self::needs_sort(query) {
            root = PlanNode::Sort {
                orderings: query.orderings.clone(),
                child: Box::new(root),
            };
            Vec::new()
        } else {
            query.orderings.clone()
        };

        if query.limit.is_some() || query.offset.is_some() {
            root = PlanNode::Limit {
                limit: query.limit,
                offset: query.offset.unwrap_or(0),
                child: Box::new(root),
            };
        }

        let plan = QueryExecutionPlan { root, pushed_orderings };
        log::debug!("planned query:\n{}", plan);
        Ok(plan)
    }

    fn plan_source(source: &Source, selects: &mut HashMap<SelectorName, Vec<Constraint>>) -> PlanNode {
        match source {
            Source::Selector(selector) => {
                let mut node = PlanNode::Source { selector: selector.clone() };
                for constraint in selects.remove(&selector.name).unwrap_or_default() {
                    node = PlanNode::Select { constraint, child: Box::new(node) };
                }
                node
            }
            Source::Join(join) => PlanNode::Join {
                kind: join.kind,
                condition: join.condition.clone(),
                left: Box::new(Self::plan_source(&join.left, selects)),
                right: Box::new(Self::plan_source(&join.right, selects)),
            },
        }
    }

    /// Orderings can only be delegated when they all sort the primary selector and
    /// no right-outer join can reorder rows.
    fn needs_sort(query: &Query) -> bool {
        if query.orderings.is_empty() {
            return false;
        }
        let primary = &query.source.primary_selector().name;
        query.source.has_right_outer_join()
            || query.orderings.iter().any(|o| o.operand.selector() != primary)
    }
}

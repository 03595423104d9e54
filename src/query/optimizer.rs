use crate::core::error::Result;
use crate::query::ast::{Constraint, JoinKind};
use crate::query::context::QueryExecutionContext;
use crate::query::planner::{PlanNode, QueryExecutionPlan};
use crate::query::types::{CostModel, IndexStatistics};
use crate::schema::schema::Schema;

/// What a rule may consult besides the node it rewrites.
pub struct RuleContext<'a> {
    pub statistics: &'a IndexStatistics,
    pub cost_model: &'a CostModel,
    pub schema: &'a Schema,
    pub has_pushed_orderings: bool,
    /// The plan keeps only a window of rows, so row order decides which rows survive.
    pub has_window: bool,
}

/// Trait for query optimization rules
///
/// A rule returns a replacement for `node`, or `None` to leave it alone. Replacements
/// must produce the same rows with the same scores.
pub trait OptimizationRule: Send + Sync {
    fn name(&self) -> &str;
    fn optimize(&self, node: &PlanNode, ctx: &RuleContext<'_>) -> Option<PlanNode>;
}

/// Rule: Collapse stacked selects into one conjunction
pub struct SelectMergeRule;

impl OptimizationRule for SelectMergeRule {
    fn name(&self) -> &str {
        "select_merge"
    }

    fn optimize(&self, node: &PlanNode, _ctx: &RuleContext<'_>) -> Option<PlanNode> {
        match node {
            PlanNode::Select { constraint: outer, child } => {
                if let PlanNode::Select { constraint: inner, child: input } = child.as_ref() {
                    Some(PlanNode::Select {
                        constraint: Constraint::and(inner.clone(), outer.clone()),
                        child: input.clone(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Rule: Put the cheaper input of an inner join on the left
pub struct JoinReorderRule;

impl OptimizationRule for JoinReorderRule {
    fn name(&self) -> &str {
        "join_reorder"
    }

    fn optimize(&self, node: &PlanNode, ctx: &RuleContext<'_>) -> Option<PlanNode> {
        // Pushed orderings rely on the primary selector staying leftmost, and a
        // window over swapped inputs would keep different rows.
        if ctx.has_pushed_orderings || ctx.has_window {
            return None;
        }
        match node {
            PlanNode::Join { kind: JoinKind::Inner, condition, left, right } => {
                let left_rows = ctx.cost_model.estimate_rows(left, ctx.statistics, ctx.schema);
                let right_rows = ctx.cost_model.estimate_rows(right, ctx.statistics, ctx.schema);
                if right_rows < left_rows {
                    Some(PlanNode::Join {
                        kind: JoinKind::Inner,
                        condition: condition.clone(),
                        left: right.clone(),
                        right: left.clone(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Query optimizer
pub struct QueryOptimizer {
    pub rules: Vec<Box<dyn OptimizationRule>>,
    pub cost_model: CostModel,
    pub statistics: IndexStatistics,
}

impl QueryOptimizer {
    pub fn new(statistics: IndexStatistics) -> Self {
        QueryOptimizer {
            rules: vec![
                Box::new(SelectMergeRule),
                Box::new(JoinReorderRule),
            ],
            cost_model: CostModel::default(),
            statistics,
        }
    }

    pub fn optimize(&self, context: &QueryExecutionContext, plan: QueryExecutionPlan) -> Result<QueryExecutionPlan> {
        let ctx = RuleContext {
            statistics: &self.statistics,
            cost_model: &self.cost_model,
            schema: &context.schema,
            has_pushed_orderings: !plan.pushed_orderings.is_empty(),
            has_window: matches!(plan.root, PlanNode::Limit { .. }),
        };

        let mut root = plan.root;
        for rule in &self.rules {
            let mut applied = 0usize;
            root = root.transform_up(&mut |node| match rule.optimize(&node, &ctx) {
                Some(rewritten) => {
                    applied += 1;
                    rewritten
                }
                None => node,
            });
            if applied > 0 {
                log::debug!("rule {} rewrote {} node(s)", rule.name(), applied);
            }
        }

        Ok(QueryExecutionPlan { root, pushed_orderings: plan.pushed_orderings })
    }
}

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::query::ast::JoinKind;
use crate::query::planner::PlanNode;
use crate::schema::schema::Schema;

/// Global index statistics for query planning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_docs: u64,
    pub segment_count: usize,
    pub docs_per_type: HashMap<String, u64>,
}

impl IndexStatistics {
    /// Live documents whose type is one of `types`.
    pub fn docs_of_types(&self, types: &[String]) -> u64 {
        types.iter()
            .filter_map(|t| self.docs_per_type.get(t))
            .sum()
    }
}

/// Cost model for query planning
#[derive(Debug, Clone)]
pub struct CostModel {
    pub select_selectivity: f64,  // Fraction of rows kept by one Select
    pub join_selectivity: f64,    // Fraction of the cross product kept by a join condition
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            select_selectivity: 0.5,
            join_selectivity: 0.1,
        }
    }
}

impl CostModel {
    /// Estimated number of rows produced by a plan node
    pub fn estimate_rows(&self, node: &PlanNode, stats: &IndexStatistics, schema: &Schema) -> f64 {
        match node {
            PlanNode::Source { selector } => {
                stats.docs_of_types(&schema.query_types(&selector.type_name)) as f64
            }
            PlanNode::Select { child, .. } => {
                self.estimate_rows(child, stats, schema) * self.select_selectivity
            }
            PlanNode::Join { kind, left, right, .. } => {
                let l = self.estimate_rows(left, stats, schema);
                let r = self.estimate_rows(right, stats, schema);
                let matched = l * r * self.join_selectivity;
                match kind {
                    JoinKind::Inner => matched,
                    JoinKind::LeftOuter => matched.max(l),
                    JoinKind::RightOuter => matched.max(r),
                }
            }
            PlanNode::Sort { child, .. } => self.estimate_rows(child, stats, schema),
            PlanNode::Limit { limit, child, .. } => {
                let rows = self.estimate_rows(child, stats, schema);
                match limit {
                    Some(n) => rows.min(*n as f64),
                    None => rows,
                }
            }
        }
    }
}

/// Query validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub max_constraint_depth: usize,
    pub max_selectors: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            max_constraint_depth: 64,
            max_selectors: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{JoinCondition, Selector, SelectorName};
    use crate::schema::schema::{CMIS_DOCUMENT, CMIS_FOLDER};

    fn source(name: &str, type_name: &str) -> PlanNode {
        PlanNode::Source {
            selector: Selector { name: SelectorName::new(name), type_name: type_name.to_string() },
        }
    }

    #[test]
    fn join_estimates_follow_join_kind() {
        let mut stats = IndexStatistics::default();
        stats.docs_per_type.insert(CMIS_DOCUMENT.to_string(), 100);
        stats.docs_per_type.insert(CMIS_FOLDER.to_string(), 2);
        let schema = Schema::cmis();
        let model = CostModel::default();

        let join = |kind| PlanNode::Join {
            kind,
            condition: JoinCondition::ChildNode { parent: "f".into(), child: "d".into() },
            left: Box::new(source("f", CMIS_FOLDER)),
            right: Box::new(source("d", CMIS_DOCUMENT)),
        };

        assert_eq!(model.estimate_rows(&join(JoinKind::Inner), &stats, &schema), 20.0);
        assert_eq!(model.estimate_rows(&join(JoinKind::LeftOuter), &stats, &schema), 20.0);
        assert_eq!(model.estimate_rows(&join(JoinKind::RightOuter), &stats, &schema), 100.0);
    }
}

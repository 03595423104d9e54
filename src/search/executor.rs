use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use crate::core::error::{Error, Result};
use crate::core::types::Value;
use crate::index::builder::NativeQueryBuilder;
use crate::index::matcher::evaluate_operand;
use crate::index::searcher::Searcher;
use crate::query::ast::{Column, Constraint, Order, Ordering, Query, Selector};
use crate::query::context::QueryExecutionContext;
use crate::query::optimizer::QueryOptimizer;
use crate::query::planner::{PlanNode, QueryExecutionPlan, QueryPlanner};
use crate::query::types::ValidationConfig;
use crate::search::join::join_rows;
use crate::search::results::{QueryResults, Row, ScoredRow};
use crate::writer::index_writer::IndexManager;

/// Runs one compiled plan against one snapshot.
pub struct QueryProcessor<'a> {
    searcher: &'a Searcher,
    context: &'a QueryExecutionContext,
}

impl<'a> QueryProcessor<'a> {
    pub fn new(searcher: &'a Searcher, context: &'a QueryExecutionContext) -> Self {
        QueryProcessor { searcher, context }
    }

    /// Rows of `plan`, ordered, windowed and with `query`'s columns materialized.
    ///
    /// Failures of single rows are recorded in the context and the row is dropped; any
    /// other error aborts the call.
    pub fn execute(&self, query: &Query, plan: &QueryExecutionPlan) -> Result<Vec<ScoredRow>> {
        let root = bind_plan(&plan.root, self.context)?;

        let (window, body) = match root {
            PlanNode::Limit { limit, offset, child } => (Some((limit, offset)), *child),
            other => (None, other),
        };

        let sorted = matches!(body, PlanNode::Sort { .. }) || !plan.pushed_orderings.is_empty();
        let mut rows = self.run(&body, &plan.pushed_orderings)?;
        if !sorted {
            rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(CmpOrdering::Equal));
        }
        if let Some((limit, offset)) = window {
            rows = apply_window(rows, limit, offset);
        }

        let columns = expand_columns(query, self.context);
        Ok(rows.into_iter()
            .filter_map(|row| self.materialize(row, &columns))
            .collect())
    }

    fn run(&self, node: &PlanNode, pushed: &[Ordering]) -> Result<Vec<Row>> {
        match node {
            PlanNode::Limit { limit, offset, child } => {
                Ok(apply_window(self.run(child, pushed)?, *limit, *offset))
            }
            PlanNode::Sort { orderings, child } => {
                let rows = self.run(child, pushed)?;
                self.sort_rows(rows, orderings)
            }
            PlanNode::Select { .. } | PlanNode::Source { .. } => {
                let (selector, constraints) = leaf_of(node);
                let rows = self.run_leaf(selector, &constraints)?;
                if pushed.first().is_some_and(|o| o.operand.selector() == &selector.name) {
                    self.sort_rows(rows, pushed)
                } else {
                    Ok(rows)
                }
            }
            PlanNode::Join { kind, condition, left, right } => {
                let (left_rows, right_rows) = rayon::join(
                    || self.run(left, pushed),
                    || self.run(right, pushed),
                );
                join_rows(self.searcher, *kind, condition, &left.selector_names(), left_rows?, right_rows?)
            }
        }
    }

    fn run_leaf(&self, selector: &Selector, constraints: &[Constraint]) -> Result<Vec<Row>> {
        let builder = NativeQueryBuilder::new(&self.context.schema);
        let native = builder.leaf_query(selector, constraints)?;
        let hits = self.searcher.search(&native, &self.context.exceptions)?;
        log::debug!("selector {} matched {} documents", selector.name, hits.len());

        Ok(hits.docs.iter()
            .map(|addr| Row::single(&selector.name, addr, hits.score(addr)))
            .collect())
    }

    /// Stable sort by `orderings`; absent values sort first in ascending order.
    fn sort_rows(&self, rows: Vec<Row>, orderings: &[Ordering]) -> Result<Vec<Row>> {
        let mut keyed: Vec<(Vec<Option<Value>>, Row)> = Vec::with_capacity(rows.len());
        'rows: for row in rows {
            let mut keys = Vec::with_capacity(orderings.len());
            for ordering in orderings {
                let key = match row.node(ordering.operand.selector()) {
                    None => None,
                    Some(addr) => match evaluate_operand(self.searcher, &ordering.operand, addr) {
                        Ok(value) => value,
                        Err(e) if !e.is_fatal() => {
                            self.context.exceptions.record(e);
                            continue 'rows;
                        }
                        Err(e) => return Err(e),
                    },
                };
                keys.push(key);
            }
            keyed.push((keys, row));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), ordering) in a.iter().zip(b.iter()).zip(orderings) {
                let cmp = match (x, y) {
                    (None, None) => CmpOrdering::Equal,
                    (None, Some(_)) => CmpOrdering::Less,
                    (Some(_), None) => CmpOrdering::Greater,
                    (Some(x), Some(y)) => x.sort_cmp(y),
                };
                let cmp = match ordering.order {
                    Order::Ascending => cmp,
                    Order::Descending => cmp.reverse(),
                };
                if cmp != CmpOrdering::Equal {
                    return cmp;
                }
            }
            CmpOrdering::Equal
        });

        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    fn materialize(&self, row: Row, columns: &[Column]) -> Option<ScoredRow> {
        let mut ids = BTreeMap::new();
        for (selector, addr) in &row.nodes {
            match self.searcher.document(*addr) {
                Some(doc) => {
                    ids.insert(selector.clone(), doc.id.clone());
                }
                None => {
                    self.context.exceptions.record(Error::row(format!(
                        "document {} vanished from the snapshot", addr
                    )));
                    return None;
                }
            }
        }

        let values = columns.iter()
            .map(|column| {
                row.node(&column.selector)
                    .and_then(|addr| self.searcher.document(addr))
                    .and_then(|doc| doc.property_value(&column.property))
            })
            .collect();

        Some(ScoredRow { ids, score: row.score, values })
    }
}

/// Walks a `Select* → Source` chain.
fn leaf_of(node: &PlanNode) -> (&Selector, Vec<Constraint>) {
    let mut constraints = Vec::new();
    let mut current = node;
    loop {
        match current {
            PlanNode::Select { constraint, child } => {
                constraints.push(constraint.clone());
                current = child.as_ref();
            }
            PlanNode::Source { selector } => {
                // Innermost select first, as planned.
                constraints.reverse();
                return (selector, constraints);
            }
            // The planner only puts selects directly above a source.
            PlanNode::Limit { child, .. } | PlanNode::Sort { child, .. } => current = child.as_ref(),
            PlanNode::Join { left, .. } => current = left.as_ref(),
        }
    }
}

fn bind_plan(node: &PlanNode, context: &QueryExecutionContext) -> Result<PlanNode> {
    Ok(match node {
        PlanNode::Limit { limit, offset, child } => PlanNode::Limit {
            limit: *limit,
            offset: *offset,
            child: Box::new(bind_plan(child, context)?),
        },
        PlanNode::Sort { orderings, child } => PlanNode::Sort {
            orderings: orderings.clone(),
            child: Box::new(bind_plan(child, context)?),
        },
        PlanNode::Select { constraint, child } => PlanNode::Select {
            constraint: constraint.bind(&context.bind_variables)?,
            child: Box::new(bind_plan(child, context)?),
        },
        PlanNode::Source { selector } => PlanNode::Source { selector: selector.clone() },
        PlanNode::Join { kind, condition, left, right } => PlanNode::Join {
            kind: *kind,
            condition: condition.clone(),
            left: Box::new(bind_plan(left, context)?),
            right: Box::new(bind_plan(right, context)?),
        },
    })
}

fn apply_window(rows: Vec<Row>, limit: Option<usize>, offset: usize) -> Vec<Row> {
    let rows = rows.into_iter().skip(offset);
    match limit {
        Some(n) => rows.take(n).collect(),
        None => rows.collect(),
    }
}

/// Result columns with `selector.*` replaced by the selector type's properties.
fn expand_columns(query: &Query, context: &QueryExecutionContext) -> Vec<Column> {
    let mut columns = Vec::new();
    for column in &query.columns {
        if column.property != "*" {
            columns.push(column.clone());
            continue;
        }
        let Some(selector) = query.source.find_selector(&column.selector) else { continue };
        let properties = context.schema.properties_of(&selector.type_name);
        if properties.is_empty() {
            for name in ["cmis:objectId", "cmis:name", "cmis:objectTypeId"] {
                columns.push(Column::new(column.selector.as_str(), name));
            }
        } else {
            columns.extend(properties.into_iter()
                .map(|p| Column::new(column.selector.as_str(), &p.name)));
        }
    }
    columns
}

/// Query entry point: plans, optimizes and executes against the current snapshot.
pub struct QueryEngine {
    index: Arc<IndexManager>,
    planner: QueryPlanner,
}

impl QueryEngine {
    pub fn new(index: Arc<IndexManager>, config: ValidationConfig) -> Self {
        QueryEngine {
            index,
            planner: QueryPlanner::new(config),
        }
    }

    pub fn plan(&self, context: &QueryExecutionContext, query: &Query) -> Result<QueryExecutionPlan> {
        self.planner.plan(context, query)
    }

    pub fn optimize(
        &self,
        context: &QueryExecutionContext,
        searcher: &Searcher,
        plan: QueryExecutionPlan,
    ) -> Result<QueryExecutionPlan> {
        QueryOptimizer::new(searcher.statistics()).optimize(context, plan)
    }

    /// Every row is computed from one snapshot taken when the call starts.
    pub fn execute(&self, context: &QueryExecutionContext, query: &Query) -> Result<QueryResults> {
        let start = Instant::now();
        let searcher = self.index.searcher();

        let plan = self.plan(context, query)?;
        let plan = self.optimize(context, &searcher, plan)?;
        let rows = QueryProcessor::new(&searcher, context).execute(query, &plan)?;

        let columns = expand_columns(query, context).into_iter().map(|c| c.alias).collect();
        let exceptions = context.exceptions.take();
        if !exceptions.is_empty() {
            log::warn!("query skipped {} row(s); first: {}", exceptions.len(), exceptions[0]);
        }

        Ok(QueryResults {
            columns,
            rows,
            exceptions,
            took_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::Document;
    use crate::index::searcher::tests::searcher_over;
    use crate::query::ast::{DynamicOperand, JoinCondition, JoinKind, Operator, Source, StaticOperand};
    use crate::schema::schema::{Schema, CMIS_DOCUMENT, CMIS_FOLDER};

    fn searcher() -> Searcher {
        searcher_over(vec![
            vec![
                Document::new("A", CMIS_FOLDER, "A"),
                Document::new("B", CMIS_FOLDER, "B").with_parent("A"),
            ],
            vec![
                Document::new("C", CMIS_DOCUMENT, "c.txt").with_parent("B").with_property("size", 3i64),
                Document::new("D", CMIS_DOCUMENT, "d.txt").with_parent("A").with_property("size", 1i64),
                Document::new("E", CMIS_DOCUMENT, "e.txt").with_parent("A"),
            ],
        ])
    }

    fn run(context: &QueryExecutionContext, query: &Query) -> Result<Vec<ScoredRow>> {
        let searcher = searcher();
        let plan = QueryPlanner::default().plan(context, query)?;
        let plan = QueryOptimizer::new(searcher.statistics()).optimize(context, plan)?;
        QueryProcessor::new(&searcher, context).execute(query, &plan)
    }

    fn context() -> QueryExecutionContext {
        QueryExecutionContext::new(Arc::new(Schema::cmis()))
    }

    fn ids(rows: &[ScoredRow], selector: &str) -> Vec<String> {
        rows.iter().filter_map(|r| r.id(selector)).map(|id| id.as_str().to_string()).collect()
    }

    #[test]
    fn unconstrained_selector_returns_every_document_with_uniform_score() {
        let rows = run(&context(), &Query::new(Source::selector("d", CMIS_DOCUMENT))).unwrap();
        assert_eq!(ids(&rows, "d"), vec!["C", "D", "E"]);
        assert!(rows.iter().all(|r| r.score == 1.0));
    }

    #[test]
    fn orderings_and_window() {
        let query = Query::new(Source::selector("d", CMIS_DOCUMENT))
            .with_ordering(Ordering::descending(DynamicOperand::property("d", "size")))
            .with_offset(1)
            .with_limit(1);
        let rows = run(&context(), &query).unwrap();
        assert_eq!(ids(&rows, "d"), vec!["D"]);
    }

    #[test]
    fn bind_variables_are_resolved() {
        let query = Query::new(Source::selector("d", CMIS_DOCUMENT)).with_constraint(Constraint::comparison(
            DynamicOperand::property("d", "size"),
            Operator::GreaterThan,
            StaticOperand::BindVariable("min".to_string()),
        ));
        let rows = run(&context().bind("min", 2i64), &query).unwrap();
        assert_eq!(ids(&rows, "d"), vec!["C"]);

        let err = run(&context(), &query).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvedBindVariable);
    }

    #[test]
    fn child_join_rows_point_at_parents() {
        let query = Query::new(Source::join(
            Source::selector("f", CMIS_FOLDER),
            Source::selector("d", CMIS_DOCUMENT),
            JoinKind::Inner,
            JoinCondition::ChildNode { parent: "f".into(), child: "d".into() },
        ))
        .with_column(Column::new("d", "cmis:parentId"))
        .with_column(Column::new("f", "cmis:objectId"));

        let rows = run(&context(), &query).unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(row.values[0], row.values[1]);
        }
    }

    #[test]
    fn limited_join_returns_the_same_rows_with_or_without_optimization() {
        let searcher = searcher_over(vec![vec![
            Document::new("F1", CMIS_FOLDER, "F1"),
            Document::new("F2", CMIS_FOLDER, "F2"),
            Document::new("D1", CMIS_DOCUMENT, "d1").with_parent("F2"),
            Document::new("D2", CMIS_DOCUMENT, "d2").with_parent("F1"),
            Document::new("D3", CMIS_DOCUMENT, "d3").with_parent("F1"),
        ]]);
        let context = context();
        let query = Query::new(Source::join(
            Source::selector("d", CMIS_DOCUMENT),
            Source::selector("f", CMIS_FOLDER),
            JoinKind::Inner,
            JoinCondition::ChildNode { parent: "f".into(), child: "d".into() },
        ))
        .with_limit(1);

        let plan = QueryPlanner::default().plan(&context, &query).unwrap();
        let plain = QueryProcessor::new(&searcher, &context).execute(&query, &plan).unwrap();
        let optimized = QueryOptimizer::new(searcher.statistics()).optimize(&context, plan).unwrap();
        let rows = QueryProcessor::new(&searcher, &context).execute(&query, &optimized).unwrap();

        assert_eq!(ids(&plain, "d"), vec!["D1"]);
        assert_eq!(ids(&rows, "d"), ids(&plain, "d"));
        assert_eq!(ids(&rows, "f"), ids(&plain, "f"));
    }

    #[test]
    fn failing_rows_are_skipped_and_recorded() {
        let searcher = searcher_over(vec![vec![
            Document::new("ok", CMIS_DOCUMENT, "ok"),
            Document::new("orphan", CMIS_DOCUMENT, "orphan").with_parent("missing"),
        ]]);
        let context = context();
        let query = Query::new(Source::selector("d", CMIS_DOCUMENT)).with_constraint(Constraint::comparison(
            DynamicOperand::NodeDepth { selector: "d".into() },
            Operator::EqualTo,
            Value::Integer(0),
        ));
        let plan = QueryPlanner::default().plan(&context, &query).unwrap();
        let rows = QueryProcessor::new(&searcher, &context).execute(&query, &plan).unwrap();

        assert_eq!(ids(&rows, "d"), vec!["ok"]);
        assert!(context.exceptions.has_problems());
        assert_eq!(context.exceptions.top_exception().unwrap().kind, ErrorKind::RowExecution);
    }

    #[test]
    fn star_columns_expand_from_the_schema() {
        let query = Query::new(Source::selector("f", CMIS_FOLDER)).with_column(Column::new("f", "*"));
        let columns = expand_columns(&query, &context());
        assert!(columns.iter().any(|c| c.property == "cmis:path"));
    }
}

use std::sync::Arc;
use crate::content::ContentSource;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::transaction::{IndexTransaction, TransactionReport};
use crate::query::ast::Query;
use crate::query::context::QueryExecutionContext;
use crate::schema::schema::Schema;
use crate::search::executor::QueryEngine;
use crate::search::results::QueryResults;
use crate::writer::index_writer::IndexManager;
use crate::writer::recovery::{RecoveryManager, RecoveryReport};

pub struct SearchDatabase {
    config: Config,

    schema: Arc<Schema>,

    index: Arc<IndexManager>,          // segments + writer lock + merges
    engine: QueryEngine,               // planner + optimizer + processor
    recovery: Arc<RecoveryManager>,    // marker file + reindex
}

impl SearchDatabase {
    /// Opens the index and, if the marker file is present or nothing was ever indexed,
    /// rebuilds it from `content` before returning.
    pub fn open(config: Config, schema: Schema, content: Arc<dyn ContentSource>) -> Result<Self> {
        let database = Self::open_without_recovery(config, schema, content)?;
        if let Some(report) = database.recovery.recover()? {
            log::info!("startup reindex visited {} nodes", report.visited);
        }
        Ok(database)
    }

    /// Opens the index as it is on disk. Callers decide when to run `recovery()`.
    pub fn open_without_recovery(
        config: Config,
        schema: Schema,
        content: Arc<dyn ContentSource>,
    ) -> Result<Self> {
        let index = Arc::new(IndexManager::open(config.clone(), content)?);
        let engine = QueryEngine::new(index.clone(), config.validation.clone());
        let recovery = Arc::new(RecoveryManager::for_index(index.clone()));

        Ok(SearchDatabase {
            config,
            schema: Arc::new(schema),
            index,
            engine,
            recovery,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Fresh execution context for one query.
    pub fn context(&self) -> QueryExecutionContext {
        QueryExecutionContext::new(self.schema.clone())
    }

    pub fn execute(&self, query: &Query) -> Result<QueryResults> {
        self.engine.execute(&self.context(), query)
    }

    /// Executes with caller-supplied bind variables.
    pub fn execute_with(&self, context: &QueryExecutionContext, query: &Query) -> Result<QueryResults> {
        self.engine.execute(context, query)
    }

    pub fn save(&self, tx: &IndexTransaction) -> Result<TransactionReport> {
        self.index.save(tx)
    }

    pub fn reindex(&self) -> Result<RecoveryReport> {
        self.recovery.reindex()
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }
}

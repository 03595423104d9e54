use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::core::error::Error;
use crate::core::types::Value;
use crate::schema::schema::Schema;

/// Per-call state handed to the planner, optimizer and processor.
///
/// A context is created for one query execution and never shared between calls.
#[derive(Debug)]
pub struct QueryExecutionContext {
    pub schema: Arc<Schema>,
    pub bind_variables: HashMap<String, Value>,
    pub exceptions: QueryExecutionExceptions,
}

impl QueryExecutionContext {
    pub fn new(schema: Arc<Schema>) -> Self {
        QueryExecutionContext {
            schema,
            bind_variables: HashMap::new(),
            exceptions: QueryExecutionExceptions::default(),
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.bind_variables = variables;
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bind_variables.insert(name.to_string(), value.into());
        self
    }
}

/// Non-fatal problems collected while evaluating individual rows.
#[derive(Debug, Default)]
pub struct QueryExecutionExceptions {
    problems: Mutex<Vec<Error>>,
}

impl QueryExecutionExceptions {
    pub fn record(&self, error: Error) {
        log::debug!("skipping row: {}", error);
        self.problems.lock().push(error);
    }

    pub fn has_problems(&self) -> bool {
        !self.problems.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First recorded problem.
    pub fn top_exception(&self) -> Option<Error> {
        self.problems.lock().first().cloned()
    }

    pub fn take(&self) -> Vec<Error> {
        std::mem::take(&mut *self.problems.lock())
    }
}

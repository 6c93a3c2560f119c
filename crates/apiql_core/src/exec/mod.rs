//! Statement execution.

pub mod catalog;
pub mod eval;
pub mod http;
pub mod local;
pub mod query;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::HandlerContext;
use crate::errors::{ApiqlError, ExecutionError};
use crate::router::RoutedStatement;

/// Result of a single statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Acknowledgement messages for statements without a result set.
    pub messages: Vec<String>,
}

impl QueryResult {
    pub fn ack(message: impl Into<String>) -> Self {
        QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            messages: vec![message.into()],
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        QueryResult {
            columns,
            rows,
            messages: Vec::new(),
        }
    }
}

/// Outcome of one statement of a compound query.
#[derive(Debug)]
pub struct ExecutorOutput {
    result: Result<QueryResult, ApiqlError>,
}

impl ExecutorOutput {
    pub fn ack(message: impl Into<String>) -> Self {
        ExecutorOutput {
            result: Ok(QueryResult::ack(message)),
        }
    }

    pub fn error(err: impl Into<ApiqlError>) -> Self {
        ExecutorOutput {
            result: Err(err.into()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }

    pub fn result(&self) -> &Result<QueryResult, ApiqlError> {
        &self.result
    }

    pub fn into_result(self) -> Result<QueryResult, ApiqlError> {
        self.result
    }

    /// Acknowledgement messages, empty for errors and result sets.
    pub fn messages(&self) -> &[String] {
        match &self.result {
            Ok(result) => &result.messages,
            Err(_) => &[],
        }
    }
}

impl From<Result<QueryResult, ApiqlError>> for ExecutorOutput {
    fn from(result: Result<QueryResult, ApiqlError>) -> Self {
        ExecutorOutput { result }
    }
}

impl From<QueryResult> for ExecutorOutput {
    fn from(result: QueryResult) -> Self {
        ExecutorOutput { result: Ok(result) }
    }
}

/// Executes statements against remote providers.
#[async_trait]
pub trait QueryExecutor: Debug + Sync + Send {
    async fn execute(
        &self,
        stmt: &RoutedStatement<'_>,
        ctx: &HandlerContext,
    ) -> Result<QueryResult, ExecutionError>;
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Executor acknowledging every statement with its kind.
    #[derive(Debug)]
    pub(crate) struct NoopExecutor;

    #[async_trait]
    impl QueryExecutor for NoopExecutor {
        async fn execute(
            &self,
            stmt: &RoutedStatement<'_>,
            _ctx: &HandlerContext,
        ) -> Result<QueryResult, ExecutionError> {
            Ok(QueryResult::ack(stmt.statement.kind()))
        }
    }
}

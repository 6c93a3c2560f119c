//! A single statement of a compound query.

use apiql_parser::Statement as AstStatement;
use apiql_parser::{ParseError, parse_statement};
use tracing::debug;

use crate::context::HandlerContext;
use crate::errors::{ApiqlError, ExecutionError, internal};
use crate::exec::catalog::InternalCatalog;
use crate::exec::query::QueryRunner;
use crate::exec::{ExecutorOutput, QueryResult, local};
use crate::router::{RoutedStatement, route_statement};
use crate::txn::TxnContext;

/// Transaction control carried by a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    None,
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug)]
pub struct Statement {
    raw: String,
    parsed: Option<AstStatement>,
    ctx: HandlerContext,
    txn: TxnContext,
}

impl Statement {
    pub fn new(raw: impl Into<String>, mut ctx: HandlerContext, txn: TxnContext) -> Self {
        let raw = raw.into();
        ctx.set_query(raw.clone());
        Statement {
            raw,
            parsed: None,
            ctx,
            txn,
        }
    }

    /// Parse the statement. Calling this again after a successful parse does
    /// nothing.
    pub fn prepare(&mut self) -> Result<(), ParseError> {
        if self.parsed.is_some() {
            return Ok(());
        }
        let parsed = parse_statement(&self.raw)?;
        debug!(kind = parsed.kind(), txn_id = self.txn.txn_id, "prepared statement");
        self.parsed = Some(parsed);
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> Option<&AstStatement> {
        self.parsed.as_ref()
    }

    pub fn txn(&self) -> TxnContext {
        self.txn
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub fn control_kind(&self) -> ControlKind {
        match &self.parsed {
            Some(AstStatement::Begin) => ControlKind::Begin,
            Some(AstStatement::Commit) => ControlKind::Commit,
            Some(AstStatement::Rollback) => ControlKind::Rollback,
            _ => ControlKind::None,
        }
    }

    pub fn is_begin(&self) -> bool {
        self.control_kind() == ControlKind::Begin
    }

    pub fn is_commit(&self) -> bool {
        self.control_kind() == ControlKind::Commit
    }

    pub fn is_rollback(&self) -> bool {
        self.control_kind() == ControlKind::Rollback
    }

    /// Check if executing the statement leaves every provider untouched.
    /// Unprepared statements are never read only.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self.parsed,
            Some(
                AstStatement::Query(_)
                    | AstStatement::Show(_)
                    | AstStatement::Describe(_)
                    | AstStatement::Explain(_)
                    | AstStatement::Use(_)
                    | AstStatement::SetVariable(_)
                    | AstStatement::Sleep(_)
            )
        )
    }

    /// Execute the statement, stopping early if the session is cancelled.
    pub async fn execute(&self) -> ExecutorOutput {
        let token = self.ctx.child_token();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(txn_id = self.txn.txn_id, "statement cancelled");
                ExecutorOutput::error(ExecutionError::Cancelled)
            }
            result = self.execute_inner() => result.into(),
        }
    }

    async fn execute_inner(&self) -> Result<QueryResult, ApiqlError> {
        let parsed = self
            .parsed
            .as_ref()
            .ok_or_else(|| internal!("statement executed before being prepared"))?;

        let routes = route_statement(parsed, &self.ctx)?;

        let result = match parsed {
            AstStatement::Show(show) => local::show(show, &self.ctx)?,
            AstStatement::Describe(describe) => local::describe(describe, &self.ctx)?,
            AstStatement::Explain(_) => local::explain(&routes),
            AstStatement::Use(use_stmt) => local::use_provider(use_stmt, &self.ctx)?,
            AstStatement::SetVariable(set) => local::set_variable(set, &self.ctx)?,
            AstStatement::Sleep(sleep) => local::sleep(sleep).await?,
            AstStatement::Begin | AstStatement::Commit | AstStatement::Rollback => {
                return Err(internal!(
                    "transaction control statements are handled by the session"
                ));
            }
            AstStatement::Query(query) if routes.is_pg_internal_only() => {
                debug!("answering query from the internal catalog");
                QueryRunner::new(&routes, &InternalCatalog, &self.ctx)
                    .run(query)
                    .await?
            }
            _ => {
                let routed = RoutedStatement {
                    statement: parsed,
                    routes,
                    query: &self.raw,
                };
                self.ctx.executor().execute(&routed, &self.ctx).await?
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::exec::testutil::NoopExecutor;
    use crate::registry::testutil::test_registry;

    fn statement(sql: &str) -> Statement {
        let ctx = HandlerContext::new(
            RuntimeConfig::default(),
            Arc::new(test_registry()),
            Arc::new(NoopExecutor),
        );
        Statement::new(sql, ctx, TxnContext { depth: 0, txn_id: 1 })
    }

    #[test]
    fn classify() {
        let cases = [
            ("SELECT 1", true, ControlKind::None),
            ("SHOW PROVIDERS", true, ControlKind::None),
            ("UPDATE github.repos.issues SET state = 'closed'", false, ControlKind::None),
            ("BEGIN", false, ControlKind::Begin),
            ("COMMIT", false, ControlKind::Commit),
            ("ROLLBACK", false, ControlKind::Rollback),
        ];

        for (sql, read_only, control) in cases {
            let mut stmt = statement(sql);
            assert!(!stmt.is_read_only(), "{sql}");
            stmt.prepare().unwrap();
            assert_eq!(read_only, stmt.is_read_only(), "{sql}");
            assert_eq!(control, stmt.control_kind(), "{sql}");
        }
    }

    #[test]
    fn prepare_is_idempotent() {
        let mut stmt = statement("SELECT 1");
        stmt.prepare().unwrap();
        stmt.prepare().unwrap();
        assert!(stmt.is_prepared());
        assert_eq!("SELECT 1", stmt.context().query());
    }

    #[test]
    fn prepare_invalid() {
        let mut stmt = statement("SELEC 1");
        stmt.prepare().unwrap_err();
        assert!(!stmt.is_prepared());
    }

    #[tokio::test]
    async fn execute_unprepared() {
        let stmt = statement("SELECT 1");
        let output = stmt.execute().await;
        assert!(matches!(output.result(), Err(ApiqlError::Internal(_))));
    }

    #[tokio::test]
    async fn execute_dispatches_to_executor() {
        let mut stmt = statement("DELETE FROM github.repos.issues WHERE number = 1");
        stmt.prepare().unwrap();
        let output = stmt.execute().await;
        assert_eq!(&["DELETE".to_string()], output.messages());
    }

    #[tokio::test]
    async fn execute_internal_query_locally() {
        let mut stmt = statement("SELECT nspname FROM pg_catalog.pg_namespace WHERE oid = 11");
        stmt.prepare().unwrap();
        let result = stmt.execute().await.into_result().unwrap();
        assert_eq!(vec![vec![serde_json::json!("pg_catalog")]], result.rows);
    }

    #[tokio::test]
    async fn execute_overflowing_predicate() {
        let mut stmt = statement(
            "SELECT nspname FROM pg_catalog.pg_namespace \
             WHERE oid = (-9223372036854775807 - 1) / -1",
        );
        stmt.prepare().unwrap();
        let result = stmt.execute().await.into_result().unwrap();
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn execute_cancelled() {
        let mut stmt = statement("SLEEP 10000");
        stmt.prepare().unwrap();
        let ctx = stmt.context().clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            ctx.cancel();
        });
        let output = stmt.execute().await;
        handle.await.unwrap();
        assert!(matches!(
            output.result(),
            Err(ApiqlError::Execution(ExecutionError::Cancelled))
        ));
    }
}

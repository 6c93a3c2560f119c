//! Sessions drive compound queries through splitting, transaction handling
//! and execution.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::HandlerContext;
use crate::engine::{SqlEngine, TxnCounterManager};
use crate::errors::{ApiqlError, Result};
use crate::exec::{ExecutorOutput, QueryResult};
use crate::render::ResponseHandler;
use crate::splitter::StatementSplitter;
use crate::statement::{ControlKind, Statement};
use crate::txn::{CommitResult, TransactionManager, TxnContext, TxnCoordinator};

pub const BEGIN_ACK: &str = "OK";
pub const COMMIT_ACK: &str = "OK";
pub const ROLLBACK_ACK: &str = "Rollback OK";
pub const QUEUED_ACK: &str = "mutating statement queued";

/// Creates sessions sharing an engine and a base context.
#[derive(Debug)]
pub struct SessionFactory {
    engine: Arc<dyn SqlEngine>,
    coordinator: TxnCoordinator,
    ctx: HandlerContext,
}

impl SessionFactory {
    pub fn new(engine: Arc<dyn SqlEngine>, ctx: HandlerContext) -> Result<Self> {
        let coordinator = TxnCoordinator::new(ctx.config().max_transaction_depth)?;
        Ok(SessionFactory {
            engine,
            coordinator,
            ctx,
        })
    }

    pub fn new_session(&self) -> Result<Session> {
        let counter = TxnCounterManager::new(&self.engine)?;
        let txn = self.coordinator.new_root();
        let ctx = self.ctx.fork();
        info!(
            generation_id = counter.generation_id,
            session_id = counter.session_id,
            "created session"
        );
        Ok(Session { counter, txn, ctx })
    }
}

/// Handle for cancelling a session from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    ctx: HandlerContext,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.ctx.cancel();
    }
}

#[derive(Debug)]
pub struct Session {
    counter: TxnCounterManager,
    txn: TransactionManager,
    ctx: HandlerContext,
}

impl Session {
    pub fn session_id(&self) -> u64 {
        self.counter.session_id
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub fn transaction_depth(&self) -> usize {
        self.txn.depth()
    }

    /// Cancel statements currently executing in this session.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            ctx: self.ctx.clone(),
        }
    }

    /// Execute every statement of a compound query in order.
    ///
    /// Returns one output per statement, plus the outputs of statements run
    /// by a COMMIT. Failing statements produce erroneous outputs without
    /// stopping the remaining ones.
    pub async fn execute_query(&mut self, text: &str) -> Vec<ExecutorOutput> {
        let mut outputs = Vec::new();

        for segment in StatementSplitter::new(text) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut ctx = self.ctx.clone();
            ctx.set_raw_query(text);
            let txn = TxnContext {
                depth: self.txn.depth(),
                txn_id: self.counter.next_txn_id(),
            };

            let mut stmt = Statement::new(segment, ctx, txn);
            if let Err(e) = stmt.prepare() {
                debug!(%e, query = segment, "failed to prepare statement");
                outputs.push(ExecutorOutput::error(e));
                continue;
            }

            match stmt.control_kind() {
                ControlKind::Begin => match self.txn.begin() {
                    Ok(_) => outputs.push(ExecutorOutput::ack(BEGIN_ACK)),
                    Err(e) => outputs.push(ExecutorOutput::error(e)),
                },
                ControlKind::Commit => {
                    let CommitResult { outputs: committed, result } = self.txn.commit().await;
                    outputs.extend(committed);
                    match result {
                        Ok(()) => outputs.push(ExecutorOutput::ack(COMMIT_ACK)),
                        Err(e) => outputs.push(ExecutorOutput::error(e)),
                    }
                }
                ControlKind::Rollback => match self.txn.rollback() {
                    Ok(_) => outputs.push(ExecutorOutput::ack(ROLLBACK_ACK)),
                    Err(e) => outputs.push(ExecutorOutput::error(e)),
                },
                ControlKind::None => {
                    if stmt.is_read_only() || self.txn.is_root() {
                        outputs.push(stmt.execute().await);
                    } else {
                        match self.txn.enqueue(stmt) {
                            Ok(()) => outputs.push(ExecutorOutput::ack(QUEUED_ACK)),
                            Err(e) => outputs.push(ExecutorOutput::error(e)),
                        }
                    }
                }
            }
        }

        outputs
    }

    /// Execute a query and render each output. Returns the number of
    /// erroneous outputs.
    pub async fn process_query(&mut self, text: &str, handler: &mut dyn ResponseHandler) -> usize {
        let outputs = self.execute_query(text).await;
        let failed = outputs.iter().filter(|output| output.is_err()).count();
        for output in &outputs {
            if let Err(e) = handler.handle(output) {
                warn!(%e, "failed to render output");
            }
        }
        failed
    }

    /// Render the query text instead of executing it.
    pub fn process_dry_run(&self, text: &str, handler: &mut dyn ResponseHandler) {
        let output = ExecutorOutput::from(QueryResult::with_rows(
            vec!["query".to_string()],
            vec![vec![json!(text)]],
        ));
        if let Err(e) = handler.handle(&output) {
            warn!(%e, "failed to render dry run");
        }
    }

    /// Execute a query, returning the result of its first statement.
    pub async fn handle_simple_query(&mut self, text: &str) -> Result<QueryResult> {
        self.execute_query(text)
            .await
            .into_iter()
            .next()
            .ok_or(ApiqlError::NoOutput)?
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::engine::InMemoryEngine;
    use crate::errors::TransactionStateError;
    use crate::exec::testutil::NoopExecutor;
    use crate::registry::testutil::test_registry;
    use crate::render::CollectingHandler;
    use pretty_assertions::assert_eq;

    fn factory(config: RuntimeConfig) -> SessionFactory {
        let ctx = HandlerContext::new(config, Arc::new(test_registry()), Arc::new(NoopExecutor));
        SessionFactory::new(Arc::new(InMemoryEngine::new()), ctx).unwrap()
    }

    fn messages(outputs: &[ExecutorOutput]) -> Vec<String> {
        outputs
            .iter()
            .map(|output| match output.result() {
                Ok(result) => result.messages.join(","),
                Err(e) => format!("error: {e}"),
            })
            .collect()
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let factory = factory(RuntimeConfig::default());
        let a = factory.new_session().unwrap();
        let b = factory.new_session().unwrap();
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn factory_rejects_zero_depth() {
        let ctx = HandlerContext::new(
            RuntimeConfig {
                max_transaction_depth: Some(0),
                ..Default::default()
            },
            Arc::new(test_registry()),
            Arc::new(NoopExecutor),
        );
        SessionFactory::new(Arc::new(InMemoryEngine::new()), ctx).unwrap_err();
    }

    #[tokio::test]
    async fn queued_until_commit() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session
            .execute_query("BEGIN; DELETE FROM github.repos.issues; COMMIT;")
            .await;
        assert_eq!(vec!["OK", QUEUED_ACK, "DELETE", "OK"], messages(&outputs));
        assert_eq!(0, session.transaction_depth());
    }

    #[tokio::test]
    async fn rollback_discards() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session
            .execute_query("BEGIN; DELETE FROM github.repos.issues; ROLLBACK")
            .await;
        assert_eq!(vec!["OK", QUEUED_ACK, ROLLBACK_ACK], messages(&outputs));
    }

    #[tokio::test]
    async fn commit_at_root_is_error() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session.execute_query("COMMIT").await;
        assert_eq!(1, outputs.len());
        assert!(matches!(
            outputs[0].result(),
            Err(ApiqlError::TransactionState(TransactionStateError::NoParent))
        ));
    }

    #[tokio::test]
    async fn rollback_at_root_is_error() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session.execute_query("ROLLBACK;").await;
        assert_eq!(1, outputs.len());
        assert!(matches!(
            outputs[0].result(),
            Err(ApiqlError::TransactionState(TransactionStateError::NoParent))
        ));
    }

    #[tokio::test]
    async fn selects_execute_in_order() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session.execute_query("SELECT 1; SELECT 2;").await;
        assert_eq!(vec!["SELECT", "SELECT"], messages(&outputs));
    }

    #[tokio::test]
    async fn max_depth_reported_as_output() {
        let mut session = factory(RuntimeConfig {
            max_transaction_depth: Some(1),
            ..Default::default()
        })
        .new_session()
        .unwrap();
        let outputs = session.execute_query("BEGIN; BEGIN").await;
        assert!(!outputs[0].is_err());
        assert!(outputs[1].is_err());
        assert_eq!(1, session.transaction_depth());
    }

    #[tokio::test]
    async fn whitespace_segments_skipped() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session.execute_query(" ;\n; SHOW PROVIDERS; ").await;
        assert_eq!(1, outputs.len());
        assert!(session.execute_query(" ; ").await.is_empty());
    }

    #[tokio::test]
    async fn parse_errors_do_not_stop_processing() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let outputs = session.execute_query("SELEC 1; USE github").await;
        assert!(matches!(outputs[0].result(), Err(ApiqlError::Parse(_))));
        assert_eq!(&["USE".to_string()], outputs[1].messages());
    }

    #[tokio::test]
    async fn simple_query() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let result = session.handle_simple_query("SHOW PROVIDERS; SELEC").await.unwrap();
        assert_eq!(1, result.rows.len());

        let err = session.handle_simple_query("  ").await.unwrap_err();
        assert!(matches!(err, ApiqlError::NoOutput));
    }

    #[tokio::test]
    async fn process_query_counts_failures() {
        let mut session = factory(RuntimeConfig::default()).new_session().unwrap();
        let mut handler = CollectingHandler::default();
        let failed = session.process_query("SHOW PROVIDERS; COMMIT", &mut handler).await;
        assert_eq!(1, failed);
        assert_eq!(2, handler.results.len());
    }

    #[test]
    fn dry_run_renders_query() {
        let session = factory(RuntimeConfig::default()).new_session().unwrap();
        let mut handler = CollectingHandler::default();
        session.process_dry_run("SELECT 1", &mut handler);
        let result = handler.results.remove(0).unwrap();
        assert_eq!(vec!["query".to_string()], result.columns);
        assert_eq!(vec![vec![json!("SELECT 1")]], result.rows);
    }
}

use std::sync::Arc;
use std::time::Duration;

use apiql_core::config::RuntimeConfig;
use apiql_core::engine::InMemoryEngine;
use apiql_core::errors::{ApiqlError, ExecutionError};
use apiql_core::exec::{ExecutorOutput, QueryExecutor, QueryResult};
use apiql_core::registry::ProviderRegistry;
use apiql_core::router::RoutedStatement;
use apiql_core::session::{QUEUED_ACK, ROLLBACK_ACK};
use apiql_core::{HandlerContext, Session, SessionFactory};
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

const REGISTRY: &str = r#"{
  "providers": {
    "crm": {
      "base_url": "http://127.0.0.1:1",
      "services": {
        "core": {
          "resources": {
            "contacts": { "path": "/contacts" },
            "deals": { "path": "/deals" }
          }
        }
      }
    }
  }
}"#;

/// Records the text of every statement it executes.
///
/// Statements mentioning `fail` return an error, statements mentioning
/// `slow` never finish on their own.
#[derive(Debug, Default)]
struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(
        &self,
        stmt: &RoutedStatement<'_>,
        _ctx: &HandlerContext,
    ) -> Result<QueryResult, ExecutionError> {
        self.executed.lock().push(stmt.query.to_string());

        if stmt.query.contains("slow") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if stmt.query.contains("fail") {
            return Err(ExecutionError::Http {
                status: 500,
                body: "boom".to_string(),
            });
        }
        match stmt.statement {
            apiql_parser::Statement::Query(_) => Ok(QueryResult::with_rows(
                vec!["n".to_string()],
                vec![vec![json!(1)]],
            )),
            other => Ok(QueryResult::ack(other.kind())),
        }
    }
}

fn new_session() -> (Session, Arc<RecordingExecutor>) {
    logutil::init_test();
    let executor = Arc::new(RecordingExecutor::default());
    let registry = ProviderRegistry::from_json(REGISTRY).unwrap();
    let ctx = HandlerContext::new(RuntimeConfig::default(), Arc::new(registry), executor.clone());
    let factory = SessionFactory::new(Arc::new(InMemoryEngine::new()), ctx).unwrap();
    (factory.new_session().unwrap(), executor)
}

fn describe(outputs: &[ExecutorOutput]) -> Vec<String> {
    outputs
        .iter()
        .map(|output| match output.result() {
            Ok(result) if result.columns.is_empty() => result.messages.join(","),
            Ok(result) => format!("{} rows", result.rows.len()),
            Err(e) => format!("error: {e}"),
        })
        .collect()
}

#[tokio::test]
async fn nested_commits_run_queues_in_order() {
    let (mut session, executor) = new_session();
    let outputs = session
        .execute_query(
            "BEGIN;
             INSERT INTO crm.core.contacts (name) VALUES ('a');
             BEGIN;
             DELETE FROM crm.core.deals WHERE id = 1;
             COMMIT;
             UPDATE crm.core.contacts SET name = 'b';
             COMMIT;",
        )
        .await;

    assert_eq!(
        vec![
            "OK",
            QUEUED_ACK,
            "OK",
            QUEUED_ACK,
            "DELETE",
            "OK",
            QUEUED_ACK,
            "INSERT",
            "UPDATE",
            "OK",
        ],
        describe(&outputs)
    );
    assert_eq!(
        vec![
            "DELETE FROM crm.core.deals WHERE id = 1",
            "INSERT INTO crm.core.contacts (name) VALUES ('a')",
            "UPDATE crm.core.contacts SET name = 'b'",
        ],
        *executor.executed.lock()
    );
    assert_eq!(0, session.transaction_depth());
}

#[tokio::test]
async fn read_only_statements_run_eagerly() {
    let (mut session, executor) = new_session();
    let outputs = session
        .execute_query(
            "BEGIN; SELECT * FROM crm.core.contacts; SHOW RESOURCES IN crm.core; ROLLBACK",
        )
        .await;

    assert_eq!(
        vec!["OK", "1 rows", "2 rows", ROLLBACK_ACK],
        describe(&outputs)
    );
    assert_eq!(
        vec!["SELECT * FROM crm.core.contacts"],
        *executor.executed.lock()
    );
}

#[tokio::test]
async fn root_level_mutations_run_immediately() {
    let (mut session, executor) = new_session();
    let outputs = session
        .execute_query("DELETE FROM crm.core.deals WHERE id = 2")
        .await;
    assert_eq!(vec!["DELETE"], describe(&outputs));
    assert_eq!(1, executor.executed.lock().len());
}

#[tokio::test]
async fn rollback_keeps_outer_queue() {
    let (mut session, executor) = new_session();
    let outputs = session
        .execute_query(
            "BEGIN;
             DELETE FROM crm.core.contacts WHERE id = 1;
             BEGIN;
             DELETE FROM crm.core.deals WHERE id = 1;
             ROLLBACK;
             COMMIT",
        )
        .await;

    assert_eq!(
        vec!["OK", QUEUED_ACK, "OK", QUEUED_ACK, ROLLBACK_ACK, "DELETE", "OK"],
        describe(&outputs)
    );
    assert_eq!(
        vec!["DELETE FROM crm.core.contacts WHERE id = 1"],
        *executor.executed.lock()
    );
}

#[tokio::test]
async fn commit_continues_after_failure() {
    let (mut session, executor) = new_session();
    let outputs = session
        .execute_query(
            "BEGIN;
             DELETE FROM crm.core.fail;
             DELETE FROM crm.core.deals;
             COMMIT",
        )
        .await;

    assert_eq!(6, outputs.len());
    assert!(matches!(
        outputs[3].result(),
        Err(ApiqlError::Execution(ExecutionError::Http { status: 500, .. }))
    ));
    assert_eq!(&["DELETE".to_string()], outputs[4].messages());
    assert_eq!(&["OK".to_string()], outputs[5].messages());
    assert_eq!(2, executor.executed.lock().len());
}

#[tokio::test]
async fn cancel_stops_in_flight_statement() {
    let (mut session, executor) = new_session();
    let handle = session.cancel_handle();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let outputs = session
        .execute_query("DELETE FROM crm.core.slow; DELETE FROM crm.core.deals")
        .await;
    canceller.await.unwrap();

    assert!(matches!(
        outputs[0].result(),
        Err(ApiqlError::Execution(ExecutionError::Cancelled))
    ));
    assert_eq!(&["DELETE".to_string()], outputs[1].messages());
    assert_eq!(2, executor.executed.lock().len());
}

#[tokio::test]
async fn sessions_have_independent_variables() {
    let executor = Arc::new(RecordingExecutor::default());
    let registry = ProviderRegistry::from_json(REGISTRY).unwrap();
    let ctx = HandlerContext::new(RuntimeConfig::default(), Arc::new(registry), executor);
    let factory = SessionFactory::new(Arc::new(InMemoryEngine::new()), ctx).unwrap();

    let mut a = factory.new_session().unwrap();
    let mut b = factory.new_session().unwrap();

    a.execute_query("USE crm").await;
    let result = a.handle_simple_query("SHOW RESOURCES IN core").await.unwrap();
    assert_eq!(2, result.rows.len());

    let err = b.handle_simple_query("SHOW RESOURCES IN core").await.unwrap_err();
    assert!(matches!(err, ApiqlError::Execution(_)));
}

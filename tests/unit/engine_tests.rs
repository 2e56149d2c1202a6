//! Unit tests for the execution engine
//!
//! These drive whole scripts through [`ExecutionEngine`] against the mock
//! connection and assert on the aggregate result, the delivered events, and
//! the statements the connection actually saw.

use std::time::Duration;

use pretty_assertions::assert_eq;

use rust_sqlbatch::{
    ExecutionEngine, ExecutionEngineConditions, MemoryVariableResolver, ScriptExecutionArgs,
    ScriptExecutionResult,
};

use crate::common::{MockConnection, RecordingEventHandler};

fn sqlcmd_conditions() -> ExecutionEngineConditions {
    ExecutionEngineConditions { is_sql_cmd: true }
}

fn args_for(script: &str, handler: RecordingEventHandler) -> ScriptExecutionArgs {
    ScriptExecutionArgs::new(script, Duration::ZERO, sqlcmd_conditions(), Box::new(handler))
}

#[tokio::test]
async fn test_successful_script() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let events = handler.events();
    let connection = MockConnection::new();
    let log = connection.log();

    let result = engine
        .execute_batch(
            args_for("SELECT 1\nGO\nSELECT 2\nGO\n", handler),
            Box::new(connection),
        )
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.statements(), vec!["SELECT 1\n", "SELECT 2\n"]);
    assert_eq!(events.result_sets(), vec![1, 1]);
    assert!(events.errors().is_empty());
}

#[tokio::test]
async fn test_repeat_count_executes_batch_repeatedly() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::new();
    let log = connection.log();

    let result = engine
        .execute_batch(args_for("SELECT 1\nGO 3\n", handler), Box::new(connection))
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.call_count(), 3);
}

#[tokio::test]
async fn test_whitespace_only_batches_are_skipped() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::new();
    let log = connection.log();

    let result = engine
        .execute_batch(
            args_for("GO\n\n   \nGO\nSELECT 1\nGO\n", handler),
            Box::new(connection),
        )
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.statements(), vec!["SELECT 1\n"]);
}

#[tokio::test]
async fn test_failure_with_exit_policy_stops_the_script() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let events = handler.events();
    let connection = MockConnection::failing_on("databases_wrong");
    let log = connection.log();

    let result = engine
        .execute_batch(
            args_for(
                "SELECT 1\nGO\nSELECT * FROM databases_wrong\nGO\nSELECT 2\nGO\n",
                handler,
            ),
            Box::new(connection),
        )
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Failure);
    // The third batch never runs.
    assert_eq!(log.call_count(), 2);
    assert_eq!(events.errors().len(), 1);
    assert!(events.errors()[0].contains("databases_wrong"));
}

#[tokio::test]
async fn test_failure_with_ignore_policy_continues() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let events = handler.events();
    let connection = MockConnection::failing_on("databases_wrong");
    let log = connection.log();

    let result = engine
        .execute_batch(
            args_for(
                ":on error ignore\nSELECT * FROM databases_wrong\nGO\nSELECT * FROM databases_wrong\nGO\nSELECT 1\nGO\n",
                handler,
            ),
            Box::new(connection),
        )
        .await
        .unwrap();

    // Failed batches are reported but do not fail the script.
    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.call_count(), 3);
    assert_eq!(events.errors().len(), 2);
    assert_eq!(events.result_sets(), vec![1]);
}

#[tokio::test]
async fn test_on_error_policy_can_switch_back() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::failing_on("databases_wrong");
    let log = connection.log();

    let result = engine
        .execute_batch(
            args_for(
                ":on error ignore\nSELECT * FROM databases_wrong\nGO\n:on error exit\nSELECT * FROM databases_wrong\nGO\nSELECT 1\nGO\n",
                handler,
            ),
            Box::new(connection),
        )
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Failure);
    assert_eq!(log.call_count(), 2);
}

#[tokio::test]
async fn test_parse_error_fails_the_script() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let events = handler.events();
    let connection = MockConnection::new();
    let log = connection.log();

    let result = engine
        .execute_batch(args_for("SELECT 1\nGO bad\n", handler), Box::new(connection))
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Failure);
    assert_eq!(log.call_count(), 0);
    assert_eq!(events.errors().len(), 1);
    assert!(events.errors()[0].contains("Incorrect syntax"));
}

#[tokio::test]
async fn test_cancel_before_execute() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::new();
    let log = connection.log();

    engine.cancel();
    let result = engine
        .execute_batch(args_for("SELECT 1\nGO\n", handler), Box::new(connection))
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Cancel);
    assert_eq!(log.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_interrupts_a_running_batch() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let mut connection = MockConnection::new();
    connection.block_until_cancelled = true;
    let log = connection.log();

    let receiver = engine.execute_batch(
        args_for("SELECT 1\nGO\nSELECT 2\nGO\n", handler),
        Box::new(connection),
    );

    // Wait for the first batch to reach the connection, then cancel.
    tokio::time::timeout(Duration::from_secs(5), async {
        while log.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("batch should start");
    engine.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), receiver)
        .await
        .expect("run should finish after cancel")
        .unwrap();
    assert_eq!(result, ScriptExecutionResult::Cancel);
    assert_eq!(log.call_count(), 1);
}

#[tokio::test]
async fn test_setvar_flows_into_executed_sql() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::new();
    let log = connection.log();

    let result = engine
        .execute_batch(
            args_for(":setvar TableName sys.objects\nSELECT * FROM $(TableName)\nGO\n", handler),
            Box::new(connection),
        )
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.statements(), vec!["SELECT * FROM sys.objects\n"]);
}

#[tokio::test]
async fn test_predefined_variables_are_used() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::new();
    let log = connection.log();

    let mut variables = MemoryVariableResolver::new();
    variables.define("DatabaseName", "master");
    let mut args = args_for("USE [$(DatabaseName)]\nGO\n", handler);
    args.variables = Some(Box::new(variables));

    let result = engine
        .execute_batch(args, Box::new(connection))
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.statements(), vec!["USE [master]\n"]);
}

#[tokio::test]
async fn test_sqlcmd_mode_off_sends_directives_as_text() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let connection = MockConnection::new();
    let log = connection.log();

    let mut args = args_for(":setvar A 1\nSELECT '$(A)'\nGO\n", handler);
    args.conditions = ExecutionEngineConditions { is_sql_cmd: false };

    let result = engine
        .execute_batch(args, Box::new(connection))
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(log.statements(), vec![":setvar A 1\nSELECT '$(A)'\n"]);
}

#[tokio::test]
async fn test_connect_directive_emits_a_message() {
    let engine = ExecutionEngine::new();
    let handler = RecordingEventHandler::new();
    let events = handler.events();
    let connection = MockConnection::new();

    let result = engine
        .execute_batch(
            args_for(":connect otherserver\nSELECT 1\nGO\n", handler),
            Box::new(connection),
        )
        .await
        .unwrap();

    assert_eq!(result, ScriptExecutionResult::Success);
    assert_eq!(events.messages(), vec!["Connecting to otherserver..."]);
}

//! A single executable unit of script text.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::connection::{ConnectionError, ScriptConnection};

/// Outcome of executing a batch or a whole script. `All` is the sentinel
/// "not yet determined" default, never a true outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptExecutionResult {
    #[default]
    All,
    Success,
    Failure,
    Cancel,
    Halted,
}

impl fmt::Display for ScriptExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One batch of SQL text with a repeat count and timeout. Owned by the
/// execution engine for its execution lifetime.
pub struct Batch {
    sql_text: String,
    is_result_expected: bool,
    execution_timeout: Duration,
    repeat_count: u32,
    cancellation: CancellationToken,
    rows_affected: u64,
    result_sets: Vec<u64>,
    error_message: Option<String>,
}

impl Batch {
    pub fn new(
        sql_text: impl Into<String>,
        is_result_expected: bool,
        execution_timeout: Duration,
    ) -> Self {
        Batch {
            sql_text: sql_text.into(),
            is_result_expected,
            execution_timeout,
            repeat_count: 1,
            cancellation: CancellationToken::new(),
            rows_affected: 0,
            result_sets: Vec::new(),
            error_message: None,
        }
    }

    pub fn with_repeat_count(mut self, repeat_count: u32) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    /// Tie this batch's cancellation into an externally owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn sql_text(&self) -> &str {
        &self.sql_text
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Total rows affected, observable after execution.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Row counts of the result sets produced so far.
    pub fn result_sets(&self) -> &[u64] {
        &self.result_sets
    }

    /// The driver error that failed this batch, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Request cancellation. Observable by a concurrently running
    /// `execute`; when requested before execution begins, `execute`
    /// short-circuits without touching the connection.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Run the batch `repeat_count` times against `connection`, stopping
    /// at the first failure or cancellation.
    pub fn execute(&mut self, connection: &mut dyn ScriptConnection) -> ScriptExecutionResult {
        if self.cancellation.is_cancelled() {
            return ScriptExecutionResult::Cancel;
        }
        if self.sql_text.trim().is_empty() {
            self.error_message = Some("The batch contains no executable text.".to_string());
            return ScriptExecutionResult::Failure;
        }
        for _ in 0..self.repeat_count {
            if self.cancellation.is_cancelled() {
                return ScriptExecutionResult::Cancel;
            }
            match connection.execute(&self.sql_text, self.execution_timeout, &self.cancellation) {
                Ok(result) => {
                    self.rows_affected += result.rows_affected;
                    if self.is_result_expected {
                        self.result_sets.extend(result.result_sets);
                    }
                }
                Err(ConnectionError::Cancelled) => return ScriptExecutionResult::Cancel,
                Err(err) => {
                    self.error_message = Some(err.to_string());
                    return ScriptExecutionResult::Failure;
                }
            }
        }
        if self.cancellation.is_cancelled() {
            return ScriptExecutionResult::Cancel;
        }
        ScriptExecutionResult::Success
    }
}

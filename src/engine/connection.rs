//! The connection boundary: an opaque executable-connection capability.
//!
//! This core never constructs or configures connections; callers hand one
//! in and the engine drives it one batch at a time.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors a connection can report while executing one batch.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The in-flight call observed the cancellation token and aborted.
    #[error("Execution was cancelled.")]
    Cancelled,

    #[error("Execution timed out after {0:?}.")]
    Timeout(Duration),

    /// Any driver-reported failure (malformed SQL, constraint violation...).
    #[error("{0}")]
    Execution(String),
}

/// What one round of execution produced.
#[derive(Debug, Default, Clone)]
pub struct StatementResult {
    pub rows_affected: u64,
    /// Row counts of each result set produced, in order.
    pub result_sets: Vec<u64>,
}

/// Executes batch text against some database.
///
/// Implementations must watch `cancel` while blocked: a cancellation
/// request has to interrupt the call and surface as
/// [`ConnectionError::Cancelled`] rather than waiting for natural
/// completion. A zero `timeout` means no timeout.
pub trait ScriptConnection: Send {
    fn execute(
        &mut self,
        sql: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<StatementResult, ConnectionError>;
}

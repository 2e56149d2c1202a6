//! Script execution orchestration.
//!
//! The engine feeds a script to the parser, acting as its command handler:
//! each parsed batch is executed immediately, in script order, so that a
//! `:setvar` in one batch affects substitution in the next. Batch failures
//! are subject to the ambient `:on error` policy; cancellation is
//! cooperative and can interrupt an in-flight batch. The whole run happens
//! on a worker task and completion is published exactly once through a
//! one-shot channel.

pub mod batch;
pub mod conditions;
pub mod connection;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BatchParserError, ErrorKind};
use crate::lexer::token::{Position, TokenKind};
use crate::parser::commands::{
    CommandHandler, IncludeSource, OnErrorAction, ParseAction, ParsedBatch,
};
use crate::parser::include::{read_script_file, resolve_include_path};
use crate::parser::variables::{MemoryVariableResolver, VariableResolver};
use crate::parser::Parser;

pub use batch::{Batch, ScriptExecutionResult};
pub use conditions::ExecutionEngineConditions;
pub use connection::{ConnectionError, ScriptConnection, StatementResult};

/// Observer of per-batch outcomes during a script run.
pub trait BatchEventHandler: Send {
    /// A result set finished processing with this many rows.
    fn on_result_set(&mut self, row_count: u64);

    /// A batch (or the parse itself) reported an error.
    fn on_error_message(&mut self, message: &str);

    /// An informational message (server output, connect notices...).
    fn on_message(&mut self, _message: &str) {}
}

/// Everything one script run needs besides the connection.
pub struct ScriptExecutionArgs {
    pub script: String,
    /// Per-batch execution timeout; zero means no timeout.
    pub timeout: Duration,
    pub conditions: ExecutionEngineConditions,
    pub event_handler: Box<dyn BatchEventHandler>,
    /// Resolver seeded with any predefined variables. Defaults to an empty
    /// in-memory resolver.
    pub variables: Option<Box<dyn VariableResolver + Send>>,
    /// Base directory for relative `:r` paths. Defaults to the process
    /// working directory.
    pub include_directory: Option<PathBuf>,
}

impl ScriptExecutionArgs {
    pub fn new(
        script: impl Into<String>,
        timeout: Duration,
        conditions: ExecutionEngineConditions,
        event_handler: Box<dyn BatchEventHandler>,
    ) -> Self {
        ScriptExecutionArgs {
            script: script.into(),
            timeout,
            conditions,
            event_handler,
            variables: None,
            include_directory: None,
        }
    }
}

/// Orchestrates running whole scripts against a connection.
#[derive(Default)]
pub struct ExecutionEngine {
    cancellation: CancellationToken,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the in-flight script run. The current batch
    /// is interrupted; remaining batches are not started.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Parse and run a script asynchronously on a worker task. The returned
    /// receiver resolves exactly once with the aggregate result.
    pub fn execute_batch(
        &self,
        args: ScriptExecutionArgs,
        connection: Box<dyn ScriptConnection>,
    ) -> oneshot::Receiver<ScriptExecutionResult> {
        let cancel = self.cancellation.child_token();
        let (sender, receiver) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let result = run_script(args, connection, &cancel);
            // The caller may have dropped the receiver; nothing to do then.
            let _ = sender.send(result);
        });
        receiver
    }

    /// Synchronous variant for callers that already own a worker thread.
    pub fn execute_batch_blocking(
        &self,
        args: ScriptExecutionArgs,
        connection: Box<dyn ScriptConnection>,
    ) -> ScriptExecutionResult {
        let cancel = self.cancellation.child_token();
        run_script(args, connection, &cancel)
    }
}

fn run_script(
    args: ScriptExecutionArgs,
    mut connection: Box<dyn ScriptConnection>,
    cancel: &CancellationToken,
) -> ScriptExecutionResult {
    let ScriptExecutionArgs {
        script,
        timeout,
        conditions,
        mut event_handler,
        variables,
        include_directory,
    } = args;

    if !conditions.is_sql_cmd && conditions::script_has_sqlcmd_directives(&script) {
        warn!("script appears to use sqlcmd syntax, but sqlcmd mode is off");
    }

    let include_directory = include_directory
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut resolver: Box<dyn VariableResolver + Send> =
        variables.unwrap_or_else(|| Box::new(MemoryVariableResolver::new()));

    let mut dispatcher = BatchDispatcher {
        connection: connection.as_mut(),
        events: event_handler.as_mut(),
        cancel,
        timeout,
        on_error: OnErrorAction::Exit,
        include_directory,
        aggregate: ScriptExecutionResult::All,
    };

    let mut parser = Parser::new(
        &mut dispatcher,
        Some(resolver.as_mut()),
        script,
        "script",
    );
    parser.recognize_sqlcmd_commands = conditions.is_sql_cmd;
    if !conditions.is_sql_cmd {
        parser.disable_variable_substitution = true;
    }
    let parse_outcome = parser.parse();
    drop(parser);

    let mut aggregate = dispatcher.aggregate;
    if let Err(error) = parse_outcome {
        info!(
            kind = ?error.kind,
            line = error.begin.line,
            column = error.begin.column,
            "script parsing failed"
        );
        event_handler.as_mut().on_error_message(&error.to_string());
        aggregate = ScriptExecutionResult::Failure;
    }
    if cancel.is_cancelled() && aggregate != ScriptExecutionResult::Failure {
        aggregate = ScriptExecutionResult::Cancel;
    }
    match aggregate {
        ScriptExecutionResult::All => ScriptExecutionResult::Success,
        other => other,
    }
}

/// The engine's parser-facing command handler: turns parsed batches into
/// [`Batch`] executions and tracks the ambient on-error policy.
struct BatchDispatcher<'e> {
    connection: &'e mut dyn ScriptConnection,
    events: &'e mut dyn BatchEventHandler,
    cancel: &'e CancellationToken,
    timeout: Duration,
    on_error: OnErrorAction,
    include_directory: PathBuf,
    aggregate: ScriptExecutionResult,
}

impl CommandHandler for BatchDispatcher<'_> {
    fn on_batch(&mut self, parsed: &ParsedBatch<'_>) -> Result<ParseAction, BatchParserError> {
        if self.cancel.is_cancelled() {
            self.aggregate = ScriptExecutionResult::Cancel;
            return Ok(ParseAction::Stop);
        }
        // Batches with nothing executable are delivered by the parser but
        // never sent to the connection.
        if parsed.resolved_text.trim().is_empty() {
            return Ok(ParseAction::Continue);
        }
        let mut batch = Batch::new(parsed.resolved_text, true, self.timeout)
            .with_repeat_count(parsed.repeat_count)
            .with_cancellation(self.cancel.child_token());
        debug!(
            repeat_count = parsed.repeat_count,
            line = parsed.begin.line,
            "executing batch"
        );
        let result = batch.execute(self.connection);
        for row_count in batch.result_sets() {
            self.events.on_result_set(*row_count);
        }
        match result {
            ScriptExecutionResult::Success => Ok(ParseAction::Continue),
            ScriptExecutionResult::Cancel => {
                self.aggregate = ScriptExecutionResult::Cancel;
                Ok(ParseAction::Stop)
            }
            _ => {
                let message = batch
                    .error_message()
                    .unwrap_or("The batch failed.")
                    .to_string();
                self.events.on_error_message(&message);
                match self.on_error {
                    OnErrorAction::Ignore => {
                        debug!("batch failed; continuing per on-error policy");
                        Ok(ParseAction::Continue)
                    }
                    OnErrorAction::Exit => {
                        info!("batch failed; halting per on-error policy");
                        self.aggregate = ScriptExecutionResult::Failure;
                        Ok(ParseAction::Stop)
                    }
                }
            }
        }
    }

    fn on_include(
        &mut self,
        filename: &str,
        position: &Position,
    ) -> Result<IncludeSource, BatchParserError> {
        let path = resolve_include_path(filename, &self.include_directory);
        info!(file = %path.display(), "including script file");
        let text = read_script_file(&path).map_err(|err| {
            BatchParserError::new(
                ErrorKind::IncorrectSyntax,
                TokenKind::Include,
                *position,
                *position,
                filename.to_string(),
                format!("The file '{}' could not be read: {}.", path.display(), err),
                String::new(),
            )
        })?;
        Ok(IncludeSource {
            text,
            source_name: path.display().to_string(),
        })
    }

    fn on_connect(
        &mut self,
        server: &str,
        user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), BatchParserError> {
        // Building connections is outside this core; the directive is
        // validated, reported, and the current connection keeps serving.
        info!(server, user = user.unwrap_or(""), ":connect directive");
        self.events
            .on_message(&format!("Connecting to {}...", server));
        Ok(())
    }

    fn on_error_action(&mut self, action: OnErrorAction) {
        debug!(?action, "on-error policy changed");
        self.on_error = action;
    }

    fn on_unsupported_command(&mut self, message: &str) {
        warn!(detail = message, "unsupported sqlcmd command");
    }
}

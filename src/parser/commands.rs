//! Command-handler protocol: the callbacks the parser raises as it
//! recognizes batches, comments, and colon-directives. Implementations
//! decide what execution means; the parser stays decoupled from it.

use crate::error::{BatchParserError, ErrorKind};
use crate::lexer::token::{Position, TokenKind};

/// Ambient policy for batches that fail during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnErrorAction {
    /// Continue with the next batch.
    Ignore,
    /// Stop processing remaining batches.
    #[default]
    Exit,
}

/// Returned by [`CommandHandler::on_batch`] to continue or end the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAction {
    Continue,
    Stop,
}

/// A completed batch as delivered to the command handler. Both renderings
/// of the batch text are available: with `$(name)` references substituted
/// and with them left literal.
#[derive(Debug)]
pub struct ParsedBatch<'a> {
    pub resolved_text: &'a str,
    pub unresolved_text: &'a str,
    pub repeat_count: u32,
    pub begin: Position,
}

/// A nested character stream supplied in response to a `:r` directive.
#[derive(Debug)]
pub struct IncludeSource {
    pub text: String,
    pub source_name: String,
}

/// External capability invoked by the parser for each completed batch,
/// comment, or directive.
pub trait CommandHandler {
    /// A batch separator (or end of input) completed a batch.
    fn on_batch(&mut self, batch: &ParsedBatch<'_>) -> Result<ParseAction, BatchParserError>;

    /// A comment token was scanned. Comments also remain part of the batch
    /// text; this callback is informational.
    fn on_comment(&mut self, _text: &str) {}

    /// A `:r` directive requests inclusion of another file at this point.
    /// The handler supplies the nested stream; the parser never opens files
    /// itself.
    fn on_include(
        &mut self,
        filename: &str,
        position: &Position,
    ) -> Result<IncludeSource, BatchParserError> {
        Err(BatchParserError::new(
            ErrorKind::CommandNotSupported,
            TokenKind::Include,
            *position,
            *position,
            filename.to_string(),
            "Command Include is not supported.",
            String::new(),
        ))
    }

    /// A `:connect` directive was parsed.
    fn on_connect(
        &mut self,
        _server: &str,
        _user: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), BatchParserError> {
        Ok(())
    }

    /// A `:on error` directive toggled the ambient on-error policy.
    fn on_error_action(&mut self, _action: OnErrorAction) {}

    /// A recognized-but-unsupported directive (`:!!` and friends) is about
    /// to abort the parse with `CommandNotSupported`.
    fn on_unsupported_command(&mut self, _message: &str) {}
}

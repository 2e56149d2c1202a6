//! Error types for rust-sqlbatch

use thiserror::Error;

use crate::lexer::token::{Position, Token, TokenKind};

/// The closed set of failures the lexer and parser can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    VariableNotDefined,
    InvalidVariableName,
    InvalidNumber,
    CommandNotSupported,
    IncorrectSyntax,
    UnterminatedComment,
    UnterminatedString,
}

/// A lexing or parsing failure carrying the offending token's kind, its
/// extent, and the exact text fragment that could not be processed.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BatchParserError {
    pub kind: ErrorKind,
    pub token_kind: TokenKind,
    pub begin: Position,
    pub end: Position,
    /// The offending fragment, truncated at the point of failure.
    pub text: String,
    pub message: String,
    pub source_name: String,
}

impl BatchParserError {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: ErrorKind,
        token_kind: TokenKind,
        begin: Position,
        end: Position,
        text: impl Into<String>,
        message: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        BatchParserError {
            kind,
            token_kind,
            begin,
            end,
            text: text.into(),
            message: message.into(),
            source_name: source_name.into(),
        }
    }

    /// Error spanning a whole token, with the token's text as the fragment.
    pub fn for_token(kind: ErrorKind, token: &Token, message: impl Into<String>) -> Self {
        BatchParserError::new(
            kind,
            token.kind,
            token.begin,
            token.end,
            token.text.clone(),
            message,
            token.source_name.to_string(),
        )
    }
}

/// The message sqlcmd emits for an argument it cannot make sense of.
pub(crate) fn incorrect_syntax_message(fragment: &str) -> String {
    format!(
        "Incorrect syntax was encountered while {} was being parsed.",
        fragment
    )
}

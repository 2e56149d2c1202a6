//! Token and source-position value types produced by the lexer.

use std::fmt;
use std::sync::Arc;

/// A location in a script source, with 1-based line/column and a byte offset
/// from the start of that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    /// Position of the first character of a source.
    pub fn start() -> Self {
        Position {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Advance past `c`. A CRLF pair counts as a single line break, so a
    /// `\r` only breaks the line when it is not followed by `\n`.
    pub(crate) fn advance(&mut self, c: char, next: Option<char>) {
        self.offset += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\r' => {
                if next == Some('\n') {
                    self.column += 1;
                } else {
                    self.line += 1;
                    self.column = 1;
                }
            }
            _ => self.column += 1,
        }
    }

    /// Position after walking every character of `text`.
    pub(crate) fn advanced_through(self, text: &str) -> Position {
        let mut pos = self;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            pos.advance(c, chars.peek().copied());
        }
        pos
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}]", self.line, self.column, self.offset)
    }
}

/// Classifies a scanned unit of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Opaque script text, including quoted strings and bracketed identifiers.
    Text,
    /// A run of non-newline whitespace.
    Whitespace,
    /// A single line break (`\r\n`, `\n`, or a lone `\r`).
    NewLine,
    /// A `--` line comment or `/* */` block comment (nestable).
    Comment,
    /// The `GO [count]` batch separator.
    Go,
    /// `:setvar name value`
    Setvar,
    /// `:r filename`
    Include,
    /// `:connect server [-U user -P password]`
    Connect,
    /// `:on error ignore|exit`
    OnError,
    /// `:!!` or any other colon-command this core does not implement.
    Execute,
    /// End of input; zero-width and terminal.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A scanned unit of text together with its exact source extent.
///
/// `text` preserves the original characters verbatim; concatenating the
/// texts of all tokens in scan order reconstructs the input exactly.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub begin: Position,
    pub end: Position,
    pub source_name: Arc<str>,
}

//! Variable-resolution protocol and `$(name)` reference scanning.
//!
//! The parser is agnostic to the resolver's backing store; in-memory and
//! environment-backed resolvers are provided. Reference scanning walks the
//! accumulated batch text, validates candidate names, and splices resolved
//! values into a second rendering of the text.

use std::collections::HashMap;

use crate::error::{BatchParserError, ErrorKind};
use crate::lexer::token::{Position, Token, TokenKind};

/// External capability queried by the parser to look up and define named
/// variables.
pub trait VariableResolver {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, position: &Position, name: &str, value: &str);
}

/// Map-backed resolver.
#[derive(Debug, Default)]
pub struct MemoryVariableResolver {
    variables: HashMap<String, String>,
}

impl MemoryVariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }
}

impl VariableResolver for MemoryVariableResolver {
    fn get(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn set(&mut self, _position: &Position, name: &str, value: &str) {
        self.define(name, value);
    }
}

/// Resolver that falls back to process environment variables, the way
/// `sqlcmd` treats the environment as an outer variable scope. `:setvar`
/// definitions shadow the environment without mutating it.
#[derive(Debug, Default)]
pub struct EnvVariableResolver {
    overrides: MemoryVariableResolver,
}

impl EnvVariableResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableResolver for EnvVariableResolver {
    fn get(&self, name: &str) -> Option<String> {
        self.overrides
            .get(name)
            .or_else(|| std::env::var(name).ok())
    }

    fn set(&mut self, position: &Position, name: &str, value: &str) {
        self.overrides.set(position, name, value);
    }
}

fn is_name_char(c: char, first: bool) -> bool {
    if first {
        c.is_alphabetic() || c == '_'
    } else {
        c.is_alphanumeric() || c == '_'
    }
}

/// Validate a candidate variable name, returning the byte index of the
/// first invalid character on failure.
pub(crate) fn validate_variable_name(name: &str) -> Result<(), usize> {
    for (i, c) in name.char_indices() {
        if !is_name_char(c, i == 0) {
            return Err(i);
        }
    }
    if name.is_empty() {
        return Err(0);
    }
    Ok(())
}

/// A `$(name)` occurrence located in a block of accumulated token text,
/// addressed by byte range into the concatenated text.
struct VariableReference {
    name: String,
    start: usize,
    len: usize,
}

/// Character cursor over the concatenated text of a token slice, tracking
/// the source position of every character. Position jumps across token
/// boundaries, which keeps coordinates correct when tokens come from
/// different include sources.
struct BlockCursor<'t> {
    tokens: &'t [Token],
    token_index: usize,
    byte_in_token: usize,
    /// Byte offset into the concatenated block text.
    global: usize,
    position: Position,
}

impl<'t> BlockCursor<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        let mut cursor = BlockCursor {
            tokens,
            token_index: 0,
            byte_in_token: 0,
            global: 0,
            position: tokens.first().map(|t| t.begin).unwrap_or_default(),
        };
        cursor.normalize();
        cursor
    }

    /// Skip empty/exhausted tokens so `peek` looks at a real character.
    fn normalize(&mut self) {
        while let Some(token) = self.tokens.get(self.token_index) {
            if self.byte_in_token < token.text.len() {
                return;
            }
            self.token_index += 1;
            self.byte_in_token = 0;
            if let Some(next) = self.tokens.get(self.token_index) {
                self.position = next.begin;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        let token = self.tokens.get(self.token_index)?;
        token.text[self.byte_in_token..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let token = self.tokens.get(self.token_index)?;
        let mut rest = token.text[self.byte_in_token..].chars();
        rest.next();
        if let Some(c) = rest.next() {
            return Some(c);
        }
        self.tokens
            .get(self.token_index + 1)
            .and_then(|t| t.text.chars().next())
    }

    /// Whether the current character belongs to opaque script text (as
    /// opposed to whitespace, newlines, or comments).
    fn in_text(&self) -> bool {
        self.tokens
            .get(self.token_index)
            .is_some_and(|t| t.kind == TokenKind::Text)
    }

    fn source_name(&self) -> String {
        self.tokens
            .get(self.token_index)
            .map(|t| t.source_name.to_string())
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        let Some(c) = self.peek() else { return };
        let next = self.peek_next();
        self.position.advance(c, next);
        self.byte_in_token += c.len_utf8();
        self.global += c.len_utf8();
        self.normalize();
    }
}

/// Scan the concatenated text of `tokens` for `$(name)` references.
///
/// References only begin inside `Text` tokens, so comments are never
/// scanned. Once inside a reference, any character that is not valid in a
/// name (including `(`, whitespace, or end of input) raises
/// `InvalidVariableName` with the fragment consumed so far — this
/// deliberately reproduces the upstream behavior on SQL-Agent forms like
/// `$(ESCAPE_SQUOTE(SRVR))`.
fn scan_references(
    tokens: &[Token],
    block: &str,
) -> Result<Vec<VariableReference>, BatchParserError> {
    let mut references = Vec::new();
    let mut cursor = BlockCursor::new(tokens);
    while let Some(c) = cursor.peek() {
        if c != '$' || !cursor.in_text() || cursor.peek_next() != Some('(') {
            cursor.advance();
            continue;
        }
        let start = cursor.global;
        let begin = cursor.position;
        let source_name = cursor.source_name();
        cursor.advance();
        cursor.advance();
        let mut name = String::new();
        loop {
            match cursor.peek() {
                Some(')') if !name.is_empty() => {
                    cursor.advance();
                    references.push(VariableReference {
                        name,
                        start,
                        len: cursor.global - start,
                    });
                    break;
                }
                Some(c) if is_name_char(c, name.is_empty()) => {
                    name.push(c);
                    cursor.advance();
                }
                other => {
                    if other.is_some() {
                        // Include the offending character in the fragment.
                        cursor.advance();
                    }
                    return Err(BatchParserError::new(
                        ErrorKind::InvalidVariableName,
                        TokenKind::Text,
                        begin,
                        cursor.position,
                        block[start..cursor.global].to_string(),
                        "Invalid variable name.",
                        source_name,
                    ));
                }
            }
        }
    }
    Ok(references)
}

/// Produce the resolved rendering of a token block: every `$(name)` whose
/// name the resolver knows is replaced with its value; unresolved
/// references stay literal unless `throw_on_unresolved` is set.
pub(crate) fn substitute(
    tokens: &[Token],
    block: &str,
    resolver: &dyn VariableResolver,
    throw_on_unresolved: bool,
) -> Result<String, BatchParserError> {
    let references = scan_references(tokens, block)?;
    if references.is_empty() {
        return Ok(block.to_string());
    }
    let mut resolved = String::with_capacity(block.len());
    let mut copied = 0;
    for reference in &references {
        resolved.push_str(&block[copied..reference.start]);
        match resolver.get(&reference.name) {
            Some(value) => resolved.push_str(&value),
            None if throw_on_unresolved => {
                let begin = tokens.first().map(|t| t.begin).unwrap_or_default();
                let end = tokens.last().map(|t| t.end).unwrap_or_default();
                let source_name = tokens
                    .first()
                    .map(|t| t.source_name.to_string())
                    .unwrap_or_default();
                return Err(BatchParserError::new(
                    ErrorKind::VariableNotDefined,
                    TokenKind::Text,
                    begin,
                    end,
                    block.to_string(),
                    format!("Variable {} is not defined.", reference.name),
                    source_name,
                ));
            }
            None => resolved.push_str(&block[reference.start..reference.start + reference.len]),
        }
        copied = reference.start + reference.len;
    }
    resolved.push_str(&block[copied..]);
    Ok(resolved)
}

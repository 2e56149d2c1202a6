//! Hand-written single-pass lexer for T-SQL scripts with sqlcmd directives.
//!
//! Most T-SQL is treated as opaque [`TokenKind::Text`]; the lexer owns all
//! character-class, quoting, and comment logic, plus recognition of the
//! `GO [count]` batch separator and line-leading colon-commands. Token text
//! is preserved verbatim so the token stream round-trips to the original
//! input.

pub mod token;

use std::sync::Arc;

use crate::error::{BatchParserError, ErrorKind};

pub use token::{Position, Token, TokenKind};

/// Stateful character scanner over one script source.
///
/// [`Lexer::advance_token`] consumes the next token and makes it current;
/// once `Eof` has been produced, further calls keep returning `Eof`.
pub struct Lexer {
    src: String,
    source_name: Arc<str>,
    cursor: Position,
    at_line_start: bool,
    current: Option<Token>,
}

impl Lexer {
    pub fn new(text: impl Into<String>, source_name: &str) -> Self {
        Lexer {
            src: text.into(),
            source_name: Arc::from(source_name),
            cursor: Position::start(),
            at_line_start: true,
            current: None,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// The most recently scanned token, if any.
    pub fn current_token(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    pub fn current_kind(&self) -> Option<TokenKind> {
        self.current.as_ref().map(|t| t.kind)
    }

    /// Consume the next token from the input and make it current.
    pub fn advance_token(&mut self) -> Result<&Token, BatchParserError> {
        if self.current_kind() == Some(TokenKind::Eof) {
            return Ok(self.current.as_ref().expect("eof token is current"));
        }
        let was_line_start = self.at_line_start;
        let token = self.scan_token(was_line_start)?;
        self.at_line_start = match token.kind {
            TokenKind::NewLine => true,
            TokenKind::Whitespace | TokenKind::Eof => was_line_start,
            _ => false,
        };
        self.current = Some(token);
        Ok(self.current.as_ref().expect("token just scanned"))
    }

    /// Tokenize a whole source, failing on the first lexer error.
    pub fn tokenize(text: &str, source_name: &str) -> Result<Vec<Token>, BatchParserError> {
        let mut lexer = Lexer::new(text, source_name);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.advance_token()?.clone();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn scan_token(&mut self, at_line_start: bool) -> Result<Token, BatchParserError> {
        let begin = self.cursor;
        let Some(c) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, begin));
        };
        match c {
            '\n' | '\r' => {
                self.scan_newline();
                Ok(self.token(TokenKind::NewLine, begin))
            }
            c if c.is_whitespace() => {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' || !c.is_whitespace() {
                        break;
                    }
                    self.bump();
                }
                Ok(self.token(TokenKind::Whitespace, begin))
            }
            '/' if self.peek_at(1) == Some('*') => self.scan_block_comment(begin),
            '-' if self.peek_at(1) == Some('-') => {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.bump();
                }
                Ok(self.token(TokenKind::Comment, begin))
            }
            ':' if at_line_start => self.scan_colon_command(begin),
            'g' | 'G' if at_line_start && self.is_go_separator() => self.scan_go(begin),
            _ => self.scan_text(begin),
        }
    }

    /// True when the input at the cursor is the word `GO` followed by a
    /// line-ending or whitespace boundary.
    fn is_go_separator(&self) -> bool {
        matches!(self.peek_at(1), Some('o') | Some('O'))
            && match self.peek_at(2) {
                None | Some('\n') | Some('\r') => true,
                Some(c) => c.is_whitespace(),
            }
    }

    fn scan_go(&mut self, begin: Position) -> Result<Token, BatchParserError> {
        self.bump();
        self.bump();
        // Fold a trailing repeat count into the token; leave plain trailing
        // whitespace to the next token.
        let mark = self.cursor;
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' || !c.is_whitespace() {
                break;
            }
            self.bump();
        }
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        } else {
            self.cursor = mark;
        }
        Ok(self.token(TokenKind::Go, begin))
    }

    fn scan_colon_command(&mut self, begin: Position) -> Result<Token, BatchParserError> {
        self.bump(); // ':'
        if self.peek() == Some('!') && self.peek_at(1) == Some('!') {
            self.bump();
            self.bump();
            return Ok(self.token(TokenKind::Execute, begin));
        }
        let word_start = self.cursor.offset;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.bump();
        }
        let word = &self.src[word_start..self.cursor.offset];
        if word.is_empty() {
            // A bare ':' is ordinary text.
            return self.scan_text(begin);
        }
        let kind = if word.eq_ignore_ascii_case("setvar") {
            TokenKind::Setvar
        } else if word.eq_ignore_ascii_case("r") {
            TokenKind::Include
        } else if word.eq_ignore_ascii_case("connect") {
            TokenKind::Connect
        } else if word.eq_ignore_ascii_case("on") {
            TokenKind::OnError
        } else {
            // Unrecognized colon-commands still tokenize so the parser can
            // decide support.
            TokenKind::Execute
        };
        Ok(self.token(kind, begin))
    }

    fn scan_block_comment(&mut self, begin: Position) -> Result<Token, BatchParserError> {
        self.bump();
        self.bump();
        let mut depth = 1u32;
        loop {
            match self.peek() {
                None => {
                    return Err(BatchParserError::new(
                        ErrorKind::UnterminatedComment,
                        TokenKind::Comment,
                        begin,
                        self.cursor,
                        self.src[begin.offset..].to_string(),
                        "Missing end comment mark '*/'.",
                        self.source_name.to_string(),
                    ));
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.token(TokenKind::Comment, begin));
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn scan_text(&mut self, begin: Position) -> Result<Token, BatchParserError> {
        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => break,
                Some(c) if c.is_whitespace() => break,
                Some('-') if self.peek_at(1) == Some('-') => break,
                Some('/') if self.peek_at(1) == Some('*') => break,
                Some('\'') => self.scan_quoted('\'')?,
                Some('"') => self.scan_quoted('"')?,
                Some('[') => self.scan_bracketed()?,
                Some(_) => {
                    self.bump();
                }
            }
        }
        Ok(self.token(TokenKind::Text, begin))
    }

    /// Consume a `'...'` or `"..."` run, with the doubled quote as escape.
    /// Newlines inside the quotes are part of the run.
    fn scan_quoted(&mut self, quote: char) -> Result<(), BatchParserError> {
        let begin = self.cursor;
        self.bump();
        loop {
            match self.peek() {
                None => return Err(self.unterminated_string(begin)),
                Some(c) if c == quote => {
                    self.bump();
                    if self.peek() == Some(quote) {
                        self.bump();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Consume a `[...]` identifier, with `]]` as the escape for `]`.
    fn scan_bracketed(&mut self) -> Result<(), BatchParserError> {
        let begin = self.cursor;
        self.bump();
        loop {
            match self.peek() {
                None => return Err(self.unterminated_string(begin)),
                Some(']') => {
                    self.bump();
                    if self.peek() == Some(']') {
                        self.bump();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn unterminated_string(&self, begin: Position) -> BatchParserError {
        BatchParserError::new(
            ErrorKind::UnterminatedString,
            TokenKind::Text,
            begin,
            self.cursor,
            self.src[begin.offset..].to_string(),
            "Unclosed quotation mark after the character string.",
            self.source_name.to_string(),
        )
    }

    fn scan_newline(&mut self) {
        if self.peek() == Some('\r') {
            self.bump();
            if self.peek() == Some('\n') {
                self.bump();
            }
        } else {
            self.bump();
        }
    }

    fn token(&self, kind: TokenKind, begin: Position) -> Token {
        Token {
            kind,
            text: self.src[begin.offset..self.cursor.offset].to_string(),
            begin,
            end: self.cursor,
            source_name: Arc::clone(&self.source_name),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.cursor.offset..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.cursor.offset..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        let next = self.peek_at(1);
        self.cursor.advance(c, next);
        Some(c)
    }
}

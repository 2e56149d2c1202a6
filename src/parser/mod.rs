//! Recursive-descent parser over the lexer's token stream.
//!
//! The parser accumulates opaque tokens into the current batch, substitutes
//! `$(name)` variable references, recognizes `GO [count]` separators and
//! colon-directives, and calls into a [`CommandHandler`] for everything
//! that has an execution-side effect. `:r` includes are parsed as nested
//! token streams on a lexer stack.

pub mod commands;
pub mod include;
pub mod variables;

use crate::error::{incorrect_syntax_message, BatchParserError, ErrorKind};
use crate::lexer::token::{Position, Token, TokenKind};
use crate::lexer::Lexer;

pub use commands::{CommandHandler, IncludeSource, OnErrorAction, ParseAction, ParsedBatch};
pub use variables::{EnvVariableResolver, MemoryVariableResolver, VariableResolver};

use variables::{substitute, validate_variable_name};

/// Nested `:r` includes deeper than this abort the parse; it exists to
/// catch scripts that include themselves.
const MAX_INCLUDE_DEPTH: usize = 32;

/// Drives the lexer to completion for a single `parse()` pass.
///
/// Constructible with no variable resolver, which forces substitution off.
/// A parser is good for one script; build a new one per pass.
pub struct Parser<'a> {
    handler: &'a mut dyn CommandHandler,
    resolver: Option<&'a mut dyn VariableResolver>,
    lexers: Vec<Lexer>,
    block: Vec<Token>,
    /// When set, `$(name)` references are left untouched.
    pub disable_variable_substitution: bool,
    /// When set, a reference to an undefined variable is an error rather
    /// than being left literal in the resolved rendering.
    pub throw_on_unresolved_variable: bool,
    /// When cleared (non-sqlcmd mode), colon-directives are ordinary text;
    /// `GO` separators are still honored.
    pub recognize_sqlcmd_commands: bool,
}

impl<'a> Parser<'a> {
    pub fn new(
        handler: &'a mut dyn CommandHandler,
        resolver: Option<&'a mut dyn VariableResolver>,
        script: impl Into<String>,
        source_name: &str,
    ) -> Self {
        let disable_variable_substitution = resolver.is_none();
        Parser {
            handler,
            resolver,
            lexers: vec![Lexer::new(script, source_name)],
            block: Vec::new(),
            disable_variable_substitution,
            throw_on_unresolved_variable: false,
            recognize_sqlcmd_commands: true,
        }
    }

    /// Parse the whole script, delivering batches and directives to the
    /// command handler. Any error aborts the pass; there is no recovery
    /// within one call.
    pub fn parse(&mut self) -> Result<(), BatchParserError> {
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::Text | TokenKind::Whitespace | TokenKind::NewLine => {
                    self.block.push(token);
                }
                TokenKind::Comment => {
                    self.handler.on_comment(&token.text);
                    self.block.push(token);
                }
                TokenKind::Go => {
                    let repeat_count = self.parse_repeat_count(&token)?;
                    self.finish_directive_line()?;
                    if self.dispatch_batch(repeat_count, token.begin)? == ParseAction::Stop {
                        return Ok(());
                    }
                }
                TokenKind::Setvar
                | TokenKind::Include
                | TokenKind::Connect
                | TokenKind::OnError
                | TokenKind::Execute
                    if !self.recognize_sqlcmd_commands =>
                {
                    self.block.push(token);
                }
                TokenKind::Setvar => self.parse_setvar(&token)?,
                TokenKind::Include => self.parse_include(&token)?,
                TokenKind::Connect => self.parse_connect(&token)?,
                TokenKind::OnError => self.parse_on_error(&token)?,
                TokenKind::Execute => {
                    let message = "Command Execute is not supported.";
                    self.handler.on_unsupported_command(message);
                    return Err(BatchParserError::for_token(
                        ErrorKind::CommandNotSupported,
                        &token,
                        message,
                    ));
                }
                TokenKind::Eof => {
                    if self.lexers.len() > 1 {
                        self.lexers.pop();
                        continue;
                    }
                    if !self.block.is_empty() {
                        self.dispatch_batch(1, token.begin)?;
                    }
                    return Ok(());
                }
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, BatchParserError> {
        let lexer = self.lexers.last_mut().expect("at least the root lexer");
        Ok(lexer.advance_token()?.clone())
    }

    /// Deliver the accumulated batch to the handler and reset the
    /// accumulator. Batches containing only whitespace or comments still
    /// count and are delivered.
    fn dispatch_batch(
        &mut self,
        repeat_count: u32,
        fallback_begin: Position,
    ) -> Result<ParseAction, BatchParserError> {
        let unresolved: String = self.block.iter().map(|t| t.text.as_str()).collect();
        let resolved = match (&self.resolver, self.disable_variable_substitution) {
            (Some(resolver), false) => substitute(
                &self.block,
                &unresolved,
                &**resolver,
                self.throw_on_unresolved_variable,
            )?,
            _ => unresolved.clone(),
        };
        let begin = self
            .block
            .first()
            .map(|t| t.begin)
            .unwrap_or(fallback_begin);
        let action = self.handler.on_batch(&ParsedBatch {
            resolved_text: &resolved,
            unresolved_text: &unresolved,
            repeat_count,
            begin,
        })?;
        self.block.clear();
        Ok(action)
    }

    /// Extract the optional repeat count folded into a `GO` token. Counts
    /// above `i32::MAX` are rejected the way sqlcmd rejects them.
    fn parse_repeat_count(&self, token: &Token) -> Result<u32, BatchParserError> {
        let rest = &token.text[2..];
        let numeral = rest.trim_start();
        if numeral.is_empty() {
            return Ok(1);
        }
        let leading = &rest[..rest.len() - numeral.len()];
        match numeral.parse::<i32>() {
            Ok(count) => Ok(count as u32),
            Err(_) => {
                let begin = token.begin.advanced_through(&token.text[..2]).advanced_through(leading);
                let end = begin.advanced_through(numeral);
                Err(BatchParserError::new(
                    ErrorKind::InvalidNumber,
                    TokenKind::Text,
                    begin,
                    end,
                    numeral.to_string(),
                    format!("Invalid number {}.", numeral),
                    token.source_name.to_string(),
                ))
            }
        }
    }

    /// Collect the remaining tokens of a directive line, consuming the
    /// terminating newline. Only text and whitespace may follow a
    /// directive on its line.
    fn read_directive_args(&mut self) -> Result<Vec<Token>, BatchParserError> {
        let mut args = Vec::new();
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::NewLine | TokenKind::Eof => return Ok(args),
                TokenKind::Text | TokenKind::Whitespace => args.push(token),
                _ => {
                    return Err(BatchParserError::for_token(
                        ErrorKind::IncorrectSyntax,
                        &token,
                        incorrect_syntax_message(&token.text),
                    ))
                }
            }
        }
    }

    /// Require nothing but whitespace through the end of the line.
    fn finish_directive_line(&mut self) -> Result<(), BatchParserError> {
        for token in self.read_directive_args()? {
            if token.kind == TokenKind::Text {
                return Err(BatchParserError::for_token(
                    ErrorKind::IncorrectSyntax,
                    &token,
                    incorrect_syntax_message(&token.text),
                ));
            }
        }
        Ok(())
    }

    fn parse_setvar(&mut self, directive: &Token) -> Result<(), BatchParserError> {
        let args = self.read_directive_args()?;
        let words: Vec<&Token> = args.iter().filter(|t| t.kind == TokenKind::Text).collect();
        let Some(name_token) = words.first() else {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                directive,
                incorrect_syntax_message(&directive.text),
            ));
        };
        if let Some(extra) = words.get(2) {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                extra,
                incorrect_syntax_message(&extra.text),
            ));
        }
        let name = name_token.text.as_str();
        if let Err(index) = validate_variable_name(name) {
            let bad_end = name[index..]
                .chars()
                .next()
                .map(|c| index + c.len_utf8())
                .unwrap_or(index);
            return Err(BatchParserError::new(
                ErrorKind::InvalidVariableName,
                TokenKind::Text,
                name_token.begin,
                name_token.end,
                name[..bad_end].to_string(),
                "Invalid variable name.",
                name_token.source_name.to_string(),
            ));
        }
        let value = words.get(1).map(|t| unquote(&t.text)).unwrap_or("");
        if let Some(resolver) = self.resolver.as_deref_mut() {
            resolver.set(&name_token.begin, name, value);
        }
        Ok(())
    }

    fn parse_include(&mut self, directive: &Token) -> Result<(), BatchParserError> {
        let args = self.read_directive_args()?;
        let words: Vec<&Token> = args.iter().filter(|t| t.kind == TokenKind::Text).collect();
        let Some(filename_token) = words.first() else {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                directive,
                incorrect_syntax_message(&directive.text),
            ));
        };
        if let Some(extra) = words.get(1) {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                extra,
                incorrect_syntax_message(&extra.text),
            ));
        }
        // Variable references are legal in the filename.
        let raw = match (&self.resolver, self.disable_variable_substitution) {
            (Some(resolver), false) => {
                let single = std::slice::from_ref(*filename_token);
                substitute(
                    single,
                    &filename_token.text,
                    &**resolver,
                    self.throw_on_unresolved_variable,
                )?
            }
            _ => filename_token.text.clone(),
        };
        let filename = unquote(&raw);
        if self.lexers.len() >= MAX_INCLUDE_DEPTH {
            return Err(BatchParserError::new(
                ErrorKind::IncorrectSyntax,
                TokenKind::Include,
                directive.begin,
                directive.end,
                filename.to_string(),
                format!("Include nesting is too deep at {}.", filename),
                directive.source_name.to_string(),
            ));
        }
        let source = self.handler.on_include(filename, &filename_token.begin)?;
        self.lexers.push(Lexer::new(source.text, &source.source_name));
        Ok(())
    }

    fn parse_connect(&mut self, directive: &Token) -> Result<(), BatchParserError> {
        let args = self.read_directive_args()?;
        let words: Vec<&Token> = args.iter().filter(|t| t.kind == TokenKind::Text).collect();
        let Some(server) = words.first() else {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                directive,
                incorrect_syntax_message(&directive.text),
            ));
        };
        let mut user: Option<&str> = None;
        let mut password: Option<&str> = None;
        let mut index = 1;
        while index < words.len() {
            let flag = words[index];
            // sqlcmd accepts exactly -U and -P here; a case mismatch or an
            // unknown flag is a syntax error naming the flag.
            let target = match flag.text.as_str() {
                "-U" => &mut user,
                "-P" => &mut password,
                _ => {
                    return Err(BatchParserError::for_token(
                        ErrorKind::IncorrectSyntax,
                        flag,
                        incorrect_syntax_message(&flag.text),
                    ))
                }
            };
            let Some(value) = words.get(index + 1) else {
                return Err(BatchParserError::for_token(
                    ErrorKind::IncorrectSyntax,
                    flag,
                    incorrect_syntax_message(&flag.text),
                ));
            };
            *target = Some(value.text.as_str());
            index += 2;
        }
        self.handler
            .on_connect(unquote(&server.text), user, password)
    }

    fn parse_on_error(&mut self, directive: &Token) -> Result<(), BatchParserError> {
        let args = self.read_directive_args()?;
        let words: Vec<&Token> = args.iter().filter(|t| t.kind == TokenKind::Text).collect();
        match words.first() {
            Some(word) if word.text.eq_ignore_ascii_case("error") => {}
            Some(word) => {
                return Err(BatchParserError::for_token(
                    ErrorKind::IncorrectSyntax,
                    word,
                    incorrect_syntax_message(&word.text),
                ))
            }
            None => {
                return Err(BatchParserError::for_token(
                    ErrorKind::IncorrectSyntax,
                    directive,
                    incorrect_syntax_message(&directive.text),
                ))
            }
        }
        if let Some(extra) = words.get(2) {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                extra,
                incorrect_syntax_message(&extra.text),
            ));
        }
        let Some(mode) = words.get(1) else {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                directive,
                incorrect_syntax_message(&directive.text),
            ));
        };
        let action = if mode.text.eq_ignore_ascii_case("ignore") {
            OnErrorAction::Ignore
        } else if mode.text.eq_ignore_ascii_case("exit") {
            OnErrorAction::Exit
        } else {
            return Err(BatchParserError::for_token(
                ErrorKind::IncorrectSyntax,
                mode,
                incorrect_syntax_message(&mode.text),
            ));
        };
        self.handler.on_error_action(action);
        Ok(())
    }
}

/// Strip one layer of surrounding double quotes, if present.
fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

//! Batch parsing and execution for SQL Server scripts.
//!
//! T-SQL tooling scripts are not a single statement stream: they carry
//! `GO [count]` batch separators and sqlcmd colon-directives (`:setvar`,
//! `:r`, `:connect`, `:on error`) that the server never sees. This crate
//! splits such scripts into batches, substitutes `$(name)` variable
//! references, and optionally drives the batches against a connection.
//!
//! The layers compose bottom-up:
//!
//! - [`lexer`] turns source text into lossless tokens with positions;
//! - [`parser`] accumulates tokens into batches, resolves variables, and
//!   raises directives through a [`parser::CommandHandler`];
//! - [`engine`] is a ready-made handler that executes each batch against
//!   a [`engine::ScriptConnection`] with cancellation and on-error policy.
//!
//! Parsing alone needs no connection: implement `CommandHandler` and walk
//! the script with [`parser::Parser`].

pub mod engine;
pub mod error;
pub mod lexer;
pub mod parser;

pub use engine::{
    Batch, BatchEventHandler, ExecutionEngine, ExecutionEngineConditions, ScriptConnection,
    ScriptExecutionArgs, ScriptExecutionResult,
};
pub use error::{BatchParserError, ErrorKind};
pub use lexer::Lexer;
pub use parser::{
    CommandHandler, EnvVariableResolver, MemoryVariableResolver, Parser, VariableResolver,
};

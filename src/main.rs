use anyhow::{Context, Result};
use clap::{Parser as CliParser, Subcommand};
use std::path::{Path, PathBuf};

use rust_sqlbatch::error::BatchParserError;
use rust_sqlbatch::lexer::token::{Position, TokenKind};
use rust_sqlbatch::parser::commands::{
    CommandHandler, IncludeSource, OnErrorAction, ParseAction, ParsedBatch,
};
use rust_sqlbatch::parser::include::{read_script_file, resolve_include_path};
use rust_sqlbatch::{EnvVariableResolver, Lexer, MemoryVariableResolver, Parser, VariableResolver};

#[derive(CliParser)]
#[command(name = "rust-sqlbatch")]
#[command(author, version, about = "Batch parser for SQL Server sqlcmd scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize a script and print one token per line
    Lex {
        /// Path to the script file
        script: PathBuf,
    },
    /// Split a script into batches and print them
    Parse {
        /// Path to the script file
        script: PathBuf,

        /// Predefine a scripting variable (NAME=VALUE, repeatable)
        #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
        define: Vec<String>,

        /// Fall back to environment variables for undefined references
        #[arg(long)]
        env: bool,

        /// Treat colon-directives as plain text (sqlcmd mode off)
        #[arg(long)]
        no_sqlcmd: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lex { script } => lex(&script),
        Commands::Parse {
            script,
            define,
            env,
            no_sqlcmd,
        } => parse(&script, &define, env, no_sqlcmd),
    }
}

fn lex(script: &Path) -> Result<()> {
    let text = read_script_file(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let tokens = Lexer::tokenize(&text, &script.display().to_string())?;
    for token in tokens {
        println!("{:?} {}..{} {:?}", token.kind, token.begin, token.end, token.text);
    }
    Ok(())
}

fn parse(script: &Path, define: &[String], env: bool, no_sqlcmd: bool) -> Result<()> {
    let text = read_script_file(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let base_dir = script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut resolver: Box<dyn VariableResolver> = if env {
        Box::new(EnvVariableResolver::new())
    } else {
        Box::new(MemoryVariableResolver::new())
    };
    for pair in define {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("--define expects NAME=VALUE, got {:?}", pair))?;
        resolver.set(&Position::start(), name, value);
    }

    let mut handler = PrintingCommandHandler {
        batch_number: 0,
        base_dir,
    };
    let mut parser = Parser::new(
        &mut handler,
        Some(resolver.as_mut()),
        text,
        &script.display().to_string(),
    );
    parser.recognize_sqlcmd_commands = !no_sqlcmd;
    if no_sqlcmd {
        parser.disable_variable_substitution = true;
    }
    parser.parse()?;
    Ok(())
}

/// Prints each batch the way sqlcmd's trace output does and reads `:r`
/// includes from disk relative to the script.
struct PrintingCommandHandler {
    batch_number: u32,
    base_dir: PathBuf,
}

impl CommandHandler for PrintingCommandHandler {
    fn on_batch(&mut self, batch: &ParsedBatch<'_>) -> Result<ParseAction, BatchParserError> {
        self.batch_number += 1;
        if batch.repeat_count == 1 {
            println!("*** Batch {} ***", self.batch_number);
        } else {
            println!(
                "*** Batch {} (executed {} times) ***",
                self.batch_number, batch.repeat_count
            );
        }
        println!("{}", batch.resolved_text);
        Ok(ParseAction::Continue)
    }

    fn on_include(
        &mut self,
        filename: &str,
        position: &Position,
    ) -> Result<IncludeSource, BatchParserError> {
        let path = resolve_include_path(filename, &self.base_dir);
        let text = read_script_file(&path).map_err(|err| {
            BatchParserError::new(
                rust_sqlbatch::ErrorKind::IncorrectSyntax,
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
        match user {
            Some(user) => println!("*** Connect to {} as {} ***", server, user),
            None => println!("*** Connect to {} ***", server),
        }
        Ok(())
    }

    fn on_error_action(&mut self, action: OnErrorAction) {
        println!("*** On error: {:?} ***", action);
    }
}

//! Execution conditions for a script run.

use once_cell::sync::Lazy;
use regex::Regex;

/// Settings that shape how the engine processes a script.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngineConditions {
    /// Enables recognition of colon-prefixed sqlcmd directives. When off,
    /// colon-prefixed lines are ordinary batch text.
    pub is_sql_cmd: bool,
}

/// Coarse line-anchored scan for sqlcmd directive syntax, used to warn
/// when a script looks like it needs sqlcmd mode but it is off.
static SQLCMD_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*:(setvar|connect|on[ \t]+error|r[ \t]|!!)").expect("valid regex")
});

pub(crate) fn script_has_sqlcmd_directives(script: &str) -> bool {
    SQLCMD_DIRECTIVE.is_match(script)
}

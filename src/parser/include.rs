//! Script-file reading for `:r` includes and the CLI.
//!
//! SQL files created on Windows are frequently not UTF-8, so reading tries
//! UTF-8 first and falls back to Windows-1252. A leading BOM is stripped.

use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;

/// Read a script file as a string, trying UTF-8 first, then Windows-1252.
pub fn read_script_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => {
            let (decoded, _, had_errors) = WINDOWS_1252.decode(err.as_bytes());
            if had_errors {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "File contains invalid characters",
                ));
            }
            decoded.into_owned()
        }
    };
    Ok(text
        .strip_prefix('\u{FEFF}')
        .map(str::to_string)
        .unwrap_or(text))
}

/// Resolve a `:r` argument against the including script's directory.
/// Windows-style separators are normalized; absolute paths pass through.
pub fn resolve_include_path(filename: &str, base_dir: &Path) -> PathBuf {
    let normalized = filename.replace('\\', "/");
    let path = Path::new(&normalized);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

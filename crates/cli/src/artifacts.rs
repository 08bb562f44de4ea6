//! Reading and writing the JSON artifacts passed between commands.

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use kinsync_recon::{parse_contacts, Contact};

use crate::exit_codes::EXIT_INPUT_UNREADABLE;
use crate::CliError;

pub fn read_text(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|e| CliError {
        code: EXIT_INPUT_UNREADABLE,
        message: format!("cannot read {}: {e}", path.display()),
        hint: None,
    })
}

/// Read a contacts artifact (JSON array of contacts).
pub fn read_contacts(path: &Path) -> Result<Vec<Contact>, CliError> {
    let text = read_text(path)?;
    parse_contacts(&text).map_err(|e| CliError::merge(e).with_hint(path.display().to_string()))
}

/// Write pretty JSON to `path`, or to stdout when `path` is `None`.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;

    match path {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").map_err(|e| CliError::io(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes;

    #[test]
    fn missing_file_is_input_unreadable() {
        let err = read_contacts(Path::new("/nonexistent/contacts.json")).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_INPUT_UNREADABLE);
    }

    #[test]
    fn malformed_artifact_is_input_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        let err = read_contacts(&path).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_INPUT_UNREADABLE);
    }

    #[test]
    fn writes_pretty_json_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&serde_json::json!({"a": 1}), Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\n  \"a\": 1\n}\n");
    }
}

//! JSON I/O handling for CLI
//!
//! - Input: operation logs, one JSON object per line
//! - Output: single JSON object via stdout
//! - UTF-8 only

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use serde_json::Value;

use crate::leaderboard::RacingEventServiceOperation;

use super::errors::{CliError, CliResult};

/// Read an operation log. Blank lines are skipped; each operation is
/// returned with its 1-based line number.
pub fn read_operations(path: &Path) -> CliResult<Vec<(usize, RacingEventServiceOperation)>> {
    let file = File::open(path).map_err(|e| {
        CliError::io_error(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let mut operations = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let operation = parse_operation(&line)
            .map_err(|e| CliError::invalid_operation(format!("line {}: {}", index + 1, e.message())))?;
        operations.push((index + 1, operation));
    }
    Ok(operations)
}

/// Parse one JSON-encoded operation
pub fn parse_operation(json: &str) -> CliResult<RacingEventServiceOperation> {
    serde_json::from_str(json)
        .map_err(|e| CliError::invalid_operation(format!("not an operation: {}", e)))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

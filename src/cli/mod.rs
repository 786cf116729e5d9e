//! CLI module
//!
//! Provides command-line interface for:
//! - apply: Apply an operation log on a master, write its initial load
//! - inspect: Print an initial load
//! - transform: Show how two concurrent operations are reconciled

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{apply, inspect, run, run_command, transform};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_operation, read_operations, write_error, write_response};

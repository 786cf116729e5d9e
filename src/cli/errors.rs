//! CLI-specific error types
//!
//! Every CLI error ends the command with a non-zero exit status.

use std::fmt;
use std::io;

use crate::replication::{ReplicationError, ReplicationErrorKind};

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (files, stdout)
    IoError,
    /// An operation log line or argument is not a valid operation
    InvalidOperation,
    /// An operation failed to apply
    ApplyFailed,
    /// Snapshot could not be written or read
    SnapshotError,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "REGATTA_CLI_CONFIG_ERROR",
            Self::IoError => "REGATTA_CLI_IO_ERROR",
            Self::InvalidOperation => "REGATTA_CLI_INVALID_OPERATION",
            Self::ApplyFailed => "REGATTA_CLI_APPLY_FAILED",
            Self::SnapshotError => "REGATTA_CLI_SNAPSHOT_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidOperation, msg)
    }

    pub fn apply_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ApplyFailed, msg)
    }

    pub fn snapshot_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::SnapshotError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ReplicationError> for CliError {
    fn from(e: ReplicationError) -> Self {
        let code = match e.kind {
            ReplicationErrorKind::ConfigurationError => CliErrorCode::ConfigError,
            ReplicationErrorKind::ApplyFailed => CliErrorCode::ApplyFailed,
            ReplicationErrorKind::Codec => CliErrorCode::SnapshotError,
            _ => CliErrorCode::IoError,
        };
        Self::new(code, e.message)
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

//! # Operation Errors
//!
//! Failures of applying one operation to domain state.

use thiserror::Error;

/// Result type for operation application
pub type OperationResult<T> = Result<T, OperationError>;

/// Errors raised by `Operation::apply_to`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    // ==================
    // Leaderboards
    // ==================

    #[error("Leaderboard '{0}' not found")]
    LeaderboardNotFound(String),

    #[error("Leaderboard '{0}' already exists")]
    LeaderboardExists(String),

    // ==================
    // Columns
    // ==================

    #[error("Column '{column}' not found in leaderboard '{leaderboard}'")]
    ColumnNotFound { leaderboard: String, column: String },

    #[error("Column '{column}' already exists in leaderboard '{leaderboard}'")]
    ColumnExists { leaderboard: String, column: String },

    /// The positional index an operation carries does not hold the named column
    #[error("Column '{column}' expected at index {index} in leaderboard '{leaderboard}'")]
    ColumnPositionMismatch {
        leaderboard: String,
        column: String,
        index: usize,
    },

    // ==================
    // Groups
    // ==================

    #[error("Leaderboard group '{0}' not found")]
    GroupNotFound(String),

    #[error("Leaderboard group '{0}' already exists")]
    GroupExists(String),

    #[error("Invalid operation: {0}")]
    Invalid(String),
}

impl OperationError {
    pub fn column_not_found(leaderboard: &str, column: &str) -> Self {
        Self::ColumnNotFound {
            leaderboard: leaderboard.to_string(),
            column: column.to_string(),
        }
    }

    pub fn column_exists(leaderboard: &str, column: &str) -> Self {
        Self::ColumnExists {
            leaderboard: leaderboard.to_string(),
            column: column.to_string(),
        }
    }

    pub fn position_mismatch(leaderboard: &str, column: &str, index: usize) -> Self {
        Self::ColumnPositionMismatch {
            leaderboard: leaderboard.to_string(),
            column: column.to_string(),
            index,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Stable error code for logs and CLI output
    pub fn code(&self) -> &'static str {
        match self {
            Self::LeaderboardNotFound(_) => "LEADERBOARD_NOT_FOUND",
            Self::LeaderboardExists(_) => "LEADERBOARD_EXISTS",
            Self::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
            Self::ColumnExists { .. } => "COLUMN_EXISTS",
            Self::ColumnPositionMismatch { .. } => "COLUMN_POSITION_MISMATCH",
            Self::GroupNotFound(_) => "GROUP_NOT_FOUND",
            Self::GroupExists(_) => "GROUP_EXISTS",
            Self::Invalid(_) => "INVALID_OPERATION",
        }
    }
}

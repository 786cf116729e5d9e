//! Replication Error Types
//!
//! - Local application failures are fatal to the call, never to the container
//! - Transport failures are recoverable and end in the retry queue
//! - Divergence and halts require operator intervention

use std::fmt;
use thiserror::Error;

use crate::operation::OperationError;

/// Replication error type
#[derive(Debug, Clone)]
pub struct ReplicationError {
    /// Error kind
    pub kind: ReplicationErrorKind,
    /// Error message
    pub message: String,
    /// Domain failure behind an `ApplyFailed`
    pub operation_error: Option<OperationError>,
}

/// Replication error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationErrorKind {
    /// An operation failed to apply to local state
    ApplyFailed,

    /// Sending to the master failed
    Transport,

    /// A frame or initial load could not be encoded or decoded
    Codec,

    /// Initial load started while a load or master-applied operation is in progress
    NestedInitialLoad,

    /// Illegal state transition attempted
    IllegalTransition,

    /// Replicable is halted, requires operator intervention
    Halted,

    /// Replica state no longer matches the master's history
    HistoryDivergence,

    /// Configuration error
    ConfigurationError,

    /// No replicable registered under the routed id
    UnknownReplicable,
}

impl ReplicationError {
    /// Create a new replication error.
    pub fn new(kind: ReplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation_error: None,
        }
    }

    /// Wrap a local application failure.
    pub fn apply_failed(operation: &str, source: OperationError) -> Self {
        Self {
            kind: ReplicationErrorKind::ApplyFailed,
            message: format!("{} failed to apply: {}", operation, source),
            operation_error: Some(source),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::Transport, message)
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::Codec, message)
    }

    pub fn nested_initial_load(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::NestedInitialLoad, message)
    }

    /// Create an illegal transition error.
    pub fn illegal_transition(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::IllegalTransition, message)
    }

    /// Create a halted error.
    pub fn halted(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::Halted, message)
    }

    /// Create a history divergence error.
    pub fn history_divergence(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::HistoryDivergence, message)
    }

    /// Create a configuration error.
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::ConfigurationError, message)
    }

    pub fn unknown_replicable(id: &str) -> Self {
        Self::new(
            ReplicationErrorKind::UnknownReplicable,
            format!("no replicable registered with id '{}'", id),
        )
    }

    /// Check if this error is fatal (requires operator intervention).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ReplicationErrorKind::Halted | ReplicationErrorKind::HistoryDivergence
        )
    }
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicationError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ReplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.operation_error
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<TransportError> for ReplicationError {
    fn from(e: TransportError) -> Self {
        Self::transport(e.to_string())
    }
}

impl From<CodecError> for ReplicationError {
    fn from(e: CodecError) -> Self {
        Self::codec(e.to_string())
    }
}

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Failure to hand bytes to a peer. Always recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection to {0} unavailable")]
    Unavailable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Peer rejected operation: {0}")]
    Rejected(String),
}

/// Failure to frame or parse replication bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(u64),

    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected stream content: {0}")]
    Unexpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(ReplicationError::halted("test").is_fatal());
        assert!(ReplicationError::history_divergence("test").is_fatal());
    }

    #[test]
    fn test_non_fatal_errors() {
        assert!(!ReplicationError::transport("test").is_fatal());
        assert!(!ReplicationError::illegal_transition("test").is_fatal());
        assert!(!ReplicationError::nested_initial_load("test").is_fatal());
        assert!(!ReplicationError::unknown_replicable("x").is_fatal());
    }

    #[test]
    fn test_apply_failed_keeps_source() {
        let err = ReplicationError::apply_failed(
            "RemoveLeaderboardColumn",
            OperationError::column_not_found("KW2017", "R9"),
        );
        assert_eq!(err.kind, ReplicationErrorKind::ApplyFailed);
        assert!(err.message.contains("RemoveLeaderboardColumn"));
        assert!(matches!(
            err.operation_error,
            Some(OperationError::ColumnNotFound { .. })
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transport_conversion() {
        let err: ReplicationError = TransportError::Unavailable("master:8888".into()).into();
        assert_eq!(err.kind, ReplicationErrorKind::Transport);
        assert!(err.message.contains("master:8888"));
    }

    #[test]
    fn test_display() {
        let err = ReplicationError::halted("divergent");
        assert_eq!(err.to_string(), "ReplicationError(Halted): divergent");
    }
}

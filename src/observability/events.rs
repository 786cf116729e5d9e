//! Observable replication events
//!
//! Events are explicit and typed. Every log line the replication core
//! writes names one of them.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Operation flow
    /// Operation applied to local state
    OperationApplied,
    /// Operation failed to apply to local state
    OperationFailed,
    /// Operation handed to the master
    OperationForwarded,
    /// Sending to the master failed, operation queued
    ForwardFailed,
    /// Queued operation accepted by the master on retry
    RetrySucceeded,
    /// Echo of an own operation recognized and ignored
    EchoSuppressed,
    /// Operation transformed away and not applied
    OperationDropped,
    /// Listener notification failed
    ListenerFailed,

    // Initial load
    /// Initial load begins (scope name, expands to `_BEGIN`)
    InitialLoad,
    /// Initial load serialized for a new replica
    SnapshotSerialized,

    // Lifecycle
    /// Replicable started following a master
    ReplicationStarted,
    /// Replicable stopped following a master
    ReplicationStopped,
    /// Replica state cleared
    ReplicaStateCleared,
    /// Master dropped its bookkeeping for a replica that went away
    ReplicaDetached,
    /// Inbound operations suspended or resumed
    InboundSuspended,
    InboundResumed,
    /// Replicable halted (FATAL)
    ReplicationHalted,
    /// Retry worker started or stopped
    RetryWorkerStarted,
    RetryWorkerStopped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::OperationApplied => "OPERATION_APPLIED",
            Event::OperationFailed => "OPERATION_FAILED",
            Event::OperationForwarded => "OPERATION_FORWARDED",
            Event::ForwardFailed => "FORWARD_FAILED",
            Event::RetrySucceeded => "RETRY_SUCCEEDED",
            Event::EchoSuppressed => "ECHO_SUPPRESSED",
            Event::OperationDropped => "OPERATION_DROPPED",
            Event::ListenerFailed => "LISTENER_FAILED",

            Event::InitialLoad => "INITIAL_LOAD",
            Event::SnapshotSerialized => "SNAPSHOT_SERIALIZED",

            Event::ReplicationStarted => "REPLICATION_STARTED",
            Event::ReplicationStopped => "REPLICATION_STOPPED",
            Event::ReplicaStateCleared => "REPLICA_STATE_CLEARED",
            Event::ReplicaDetached => "REPLICA_DETACHED",
            Event::InboundSuspended => "INBOUND_SUSPENDED",
            Event::InboundResumed => "INBOUND_RESUMED",
            Event::ReplicationHalted => "REPLICATION_HALTED",
            Event::RetryWorkerStarted => "RETRY_WORKER_STARTED",
            Event::RetryWorkerStopped => "RETRY_WORKER_STOPPED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ReplicationHalted)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Replication Subsystem
//!
//! - A `Replicable` is either the master of its state or a replica of one
//! - Replicas apply optimistically, forward to the master, and reconcile
//!   through operational transformation
//! - The master's fan-out order is authoritative and numbered
//! - Echoes of a replica's own operations are suppressed by id
//! - Sending to the master retries in submission order
//! - Divergence halts the replica until its state is cleared
//!
//! Transport is not part of this crate. Listeners and senders hand frames to
//! whatever carries them; `ReplicableRegistry` routes received frames back
//! to the replicable they address.

mod codec;
mod config;
mod descriptor;
mod errors;
mod flags;
mod listener;
mod registry;
mod replicable;
mod resolving;
mod retry;
mod role;
mod sending_queue;

pub use codec::{
    decode, encode, read_frame, routing_key, write_frame, OperationFrame, FRAME_HEADER_LEN,
    MAX_FRAME_LEN,
};
pub use config::{
    ReplicationConfig, ReplicationRole, DEFAULT_ECHO_RETENTION, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_RETRY_INTERVAL_MS,
};
pub use descriptor::MasterDescriptor;
pub use errors::{
    CodecError, ReplicationError, ReplicationErrorKind, ReplicationResult, TransportError,
};
pub use flags::{FlagGuard, InstanceKey};
pub use listener::{ListenerRegistry, OperationExecutionListener, ReplicatedOperation};
pub use registry::{
    FrameKind, FrameTransport, FramingListener, FramingSender, RegistryInbox,
    ReplicableRegistry, ReplicationEndpoint,
};
pub use replicable::{
    InboundOutcome, InitialLoadHeader, Replicable, ReplicableState, SubmissionOutcome,
};
pub use resolving::ResolvingContext;
pub use retry::RetryWorker;
pub use role::{HaltReason, ReplicationState};
pub use sending_queue::{
    MasterSubmission, OperationsToMasterSender, RetryOutcome, ScheduleResult, SendingQueue,
};

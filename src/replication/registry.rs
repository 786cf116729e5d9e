//! Replicable registry and frame routing
//!
//! Replicables are discovered by their id. Incoming frames carry that id
//! first, so the registry dispatches raw bytes without knowing any
//! operation type. Initial loads are requested for a named id.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::operation::Operation;
use crate::transform::Transformable;

use super::codec::{self, OperationFrame};
use super::errors::{ReplicationError, ReplicationErrorKind, ReplicationResult, TransportError};
use super::listener::{OperationExecutionListener, ReplicatedOperation};
use super::replicable::{
    InboundOutcome, InitialLoadHeader, Replicable, ReplicableState, SubmissionOutcome,
};
use super::sending_queue::{MasterSubmission, OperationsToMasterSender};

/// Type-erased view of a replicable, as seen by the transport.
pub trait ReplicationEndpoint: Send + Sync {
    fn id(&self) -> &str;

    /// Decode and apply an `OperationFrame` fanned out by the master.
    fn receive_operation_frame(&self, bytes: &[u8]) -> ReplicationResult<InboundOutcome>;

    /// Decode and apply a `MasterSubmission` sent by a replica.
    fn receive_submission_frame(&self, bytes: &[u8]) -> ReplicationResult<SubmissionOutcome>;

    fn initially_fill_from(&self, reader: &mut dyn Read) -> ReplicationResult<InitialLoadHeader>;

    fn serialize_for_initial_replication(&self, writer: &mut dyn Write) -> ReplicationResult<u64>;

    /// Forget master-side bookkeeping for a replica that went away.
    fn replica_detached(&self, replica_id: &Uuid) -> bool;
}

impl<O> ReplicationEndpoint for Replicable<O>
where
    O: Operation + Transformable,
    O::State: ReplicableState,
{
    fn id(&self) -> &str {
        Replicable::id(self)
    }

    fn receive_operation_frame(&self, bytes: &[u8]) -> ReplicationResult<InboundOutcome> {
        let frame: OperationFrame<O> = codec::decode(bytes)?;
        if frame.replicable_id != Replicable::id(self) {
            return Err(ReplicationError::unknown_replicable(&frame.replicable_id));
        }
        self.apply_received_replicated(frame.operation)
    }

    fn receive_submission_frame(&self, bytes: &[u8]) -> ReplicationResult<SubmissionOutcome> {
        let submission: MasterSubmission<O> = codec::decode(bytes)?;
        if submission.replicable_id != Replicable::id(self) {
            return Err(ReplicationError::unknown_replicable(&submission.replicable_id));
        }
        self.receive_submission(submission)
    }

    fn initially_fill_from(&self, reader: &mut dyn Read) -> ReplicationResult<InitialLoadHeader> {
        Replicable::initially_fill_from(self, reader)
    }

    fn serialize_for_initial_replication(&self, writer: &mut dyn Write) -> ReplicationResult<u64> {
        Replicable::serialize_for_initial_replication(self, writer)
    }

    fn replica_detached(&self, replica_id: &Uuid) -> bool {
        Replicable::replica_detached(self, replica_id)
    }
}

/// In-process directory of replicables by id.
#[derive(Default)]
pub struct ReplicableRegistry {
    endpoints: RwLock<BTreeMap<String, Arc<dyn ReplicationEndpoint>>>,
}

impl ReplicableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. Ids are unique within one registry.
    pub fn register(&self, endpoint: Arc<dyn ReplicationEndpoint>) -> ReplicationResult<()> {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        let id = endpoint.id().to_string();
        if endpoints.contains_key(&id) {
            return Err(ReplicationError::configuration_error(format!(
                "replicable '{}' is already registered",
                id
            )));
        }
        endpoints.insert(id, endpoint);
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn ReplicationEndpoint>> {
        self.endpoints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ReplicationEndpoint>> {
        self.endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Registered ids in order.
    pub fn ids(&self) -> Vec<String> {
        self.endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn resolve(&self, id: &str) -> ReplicationResult<Arc<dyn ReplicationEndpoint>> {
        self.get(id)
            .ok_or_else(|| ReplicationError::unknown_replicable(id))
    }

    pub fn route_operation_frame(&self, bytes: &[u8]) -> ReplicationResult<InboundOutcome> {
        let id = codec::routing_key(bytes)?;
        self.resolve(&id)?.receive_operation_frame(bytes)
    }

    pub fn route_submission_frame(&self, bytes: &[u8]) -> ReplicationResult<SubmissionOutcome> {
        let id = codec::routing_key(bytes)?;
        self.resolve(&id)?.receive_submission_frame(bytes)
    }

    pub fn initially_fill(&self, id: &str, reader: &mut dyn Read) -> ReplicationResult<InitialLoadHeader> {
        self.resolve(id)?.initially_fill_from(reader)
    }

    pub fn serialize_initial_load(&self, id: &str, writer: &mut dyn Write) -> ReplicationResult<u64> {
        self.resolve(id)?.serialize_for_initial_replication(writer)
    }

    /// Tell every registered replicable that `replica_id` disconnected.
    /// Returns how many of them had been tracking it.
    pub fn replica_detached(&self, replica_id: &Uuid) -> usize {
        self.ids()
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|endpoint| endpoint.replica_detached(replica_id))
            .count()
    }
}

/// Byte channel towards a peer.
pub trait FrameTransport: Send + Sync {
    fn deliver(&self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Which kind of frame an inbox accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Operation,
    Submission,
}

/// Transport delivering straight into a registry in the same process.
pub struct RegistryInbox {
    registry: Arc<ReplicableRegistry>,
    kind: FrameKind,
}

impl RegistryInbox {
    /// Inbox for frames a master fans out.
    pub fn operations(registry: Arc<ReplicableRegistry>) -> Self {
        Self {
            registry,
            kind: FrameKind::Operation,
        }
    }

    /// Inbox for submissions replicas send.
    pub fn submissions(registry: Arc<ReplicableRegistry>) -> Self {
        Self {
            registry,
            kind: FrameKind::Submission,
        }
    }
}

impl FrameTransport for RegistryInbox {
    fn deliver(&self, frame: &[u8]) -> Result<(), TransportError> {
        let routed = match self.kind {
            FrameKind::Operation => self.registry.route_operation_frame(frame).map(|_| ()),
            FrameKind::Submission => match self.registry.route_submission_frame(frame) {
                // The verdict already reached the origin as a Rejected envelope
                Err(e) if is_verdict(&e) => Ok(()),
                other => other.map(|_| ()),
            },
        };
        routed.map_err(|e| TransportError::Rejected(e.message))
    }
}

fn is_verdict(error: &ReplicationError) -> bool {
    matches!(
        error.kind,
        ReplicationErrorKind::ApplyFailed | ReplicationErrorKind::HistoryDivergence
    )
}

/// Listener encoding every fanned-out operation as an `OperationFrame`.
pub struct FramingListener<T> {
    transport: T,
}

impl<T> FramingListener<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<O, T> OperationExecutionListener<O> for FramingListener<T>
where
    O: Serialize + Clone + Send + Sync,
    T: FrameTransport,
{
    fn executed(
        &self,
        replicable_id: &str,
        operation: &ReplicatedOperation<O>,
    ) -> Result<(), TransportError> {
        let frame = OperationFrame {
            replicable_id: replicable_id.to_string(),
            operation: operation.clone(),
        };
        let bytes = codec::encode(&frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.deliver(&bytes)
    }
}

/// Sender encoding every submission as a frame.
pub struct FramingSender<T> {
    transport: T,
}

impl<T> FramingSender<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<O, T> OperationsToMasterSender<O> for FramingSender<T>
where
    O: Serialize + Send + Sync,
    T: FrameTransport,
{
    fn send_to_master(&self, submission: &MasterSubmission<O>) -> Result<(), TransportError> {
        let bytes =
            codec::encode(submission).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.transport.deliver(&bytes)
    }
}

//! Replicable state container
//!
//! A `Replicable` owns one piece of domain state and mediates every
//! mutation through operations.
//!
//! Master:
//! - applies operations and fans each one out to its listeners, numbered
//!   by a monotonically increasing sequence
//! - rebases replica submissions onto its history before applying them
//!
//! Replica:
//! - applies local operations immediately and forwards them to the master
//!   through the sending queue
//! - transforms inbound operations against its pending (forwarded but not
//!   yet echoed) operations before applying them
//! - recognizes echoes of its own operations by id and ignores them
//!
//! Lock order is forward → inbound → sequencer. No lock of this replicable
//! is held while a submission is handed to the master, so a synchronous
//! echo can re-enter the inbound path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::observability::{
    log_event_with_fields, Event, Logger, MetricsSnapshot, ObservationScope, ReplicationMetrics,
};
use crate::operation::{
    ApplyContext, Causation, Envelope, IdWrapper, Operation, OperationId,
};
use crate::transform::{
    OriginTracker, PendingOperation, ServerHistory, Transformable, Transformer,
};

use super::codec;
use super::config::{
    ReplicationConfig, DEFAULT_ECHO_RETENTION, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_RETRY_INTERVAL_MS,
};
use super::descriptor::MasterDescriptor;
use super::errors::{CodecError, ReplicationError, ReplicationResult};
use super::flags::{self, FlagGuard, InstanceKey};
use super::listener::{ListenerRegistry, OperationExecutionListener, ReplicatedOperation};
use super::resolving::ResolvingContext;
use super::retry::RetryWorker;
use super::role::{HaltReason, ReplicationState};
use super::sending_queue::{
    MasterSubmission, OperationsToMasterSender, RetryOutcome, SendingQueue,
};

/// Domain state that can be transferred as an initial load.
pub trait ReplicableState: Send + Sync + 'static {
    /// Write everything a fresh replica needs. Transient, locally-only
    /// elements are left out.
    fn serialize_for_initial_replication(&self, writer: &mut dyn Write) -> Result<(), CodecError>;

    /// Replace the current contents with the stream's. Objects that occur
    /// more than once in the stream resolve through `context`.
    fn initially_fill_from(
        &self,
        reader: &mut dyn Read,
        context: &mut ResolvingContext,
    ) -> Result<(), CodecError>;

    /// Drop all replicated contents.
    fn clear_replica_state(&self);
}

/// First frame of every initial load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialLoadHeader {
    pub replicable_id: String,
    /// Last sequence the master had fanned out when the load was written
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

/// What happened to an operation received from the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Applied,
    /// Echo of an own operation
    EchoSuppressed,
    /// Transformed away by a pending local operation
    Dropped,
    /// Sequence already applied
    Duplicate,
    /// Held until inbound processing resumes
    Queued,
    /// Acknowledgement addressed to another replica
    Ignored,
}

/// What happened to a replica's submission on the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Applied { sequence: u64 },
    Dropped { sequence: u64 },
}

struct Sequencer<O> {
    history: ServerHistory<O>,
    origins: OriginTracker<O>,
}

/// Bounded set of ids whose echo already arrived.
struct EchoWindow {
    order: VecDeque<OperationId>,
    ids: HashSet<OperationId>,
    capacity: usize,
}

impl EchoWindow {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity,
        }
    }

    fn remember(&mut self, id: OperationId) {
        if self.ids.insert(id) {
            self.order.push_back(id);
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.ids.remove(&evicted);
                }
            }
        }
    }

    fn contains(&self, id: &OperationId) -> bool {
        self.ids.contains(id)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

struct Inbound<O> {
    pending: Vec<PendingOperation<O>>,
    echoed: EchoWindow,
    last_received: u64,
    suspended: bool,
    queued: VecDeque<ReplicatedOperation<O>>,
}

impl<O> Inbound<O> {
    fn new(echo_retention: usize) -> Self {
        Self {
            pending: Vec::new(),
            echoed: EchoWindow::new(echo_retention),
            last_received: 0,
            suspended: false,
            queued: VecDeque::new(),
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.echoed.clear();
        self.last_received = 0;
        self.suspended = false;
        self.queued.clear();
    }

    fn is_pending(&self, id: &OperationId) -> bool {
        self.pending.iter().any(|p| &p.id == id)
    }

    /// Retire a pending operation whose echo arrived.
    fn retire(&mut self, id: OperationId) -> bool {
        match self.pending.iter().position(|p| p.id == id) {
            Some(position) => {
                self.pending.remove(position);
                self.echoed.remember(id);
                true
            }
            None => false,
        }
    }
}

/// State container taking part in master/replica replication.
pub struct Replicable<O: Operation> {
    id: String,
    instance: InstanceKey,
    state: Arc<O::State>,
    replication: RwLock<ReplicationState>,
    listeners: ListenerRegistry<O>,
    sending_queue: Arc<SendingQueue<O>>,
    sequencer: Mutex<Sequencer<O>>,
    inbound: Mutex<Inbound<O>>,
    forward_order: Mutex<()>,
    metrics: Arc<ReplicationMetrics>,
    retry_interval: Duration,
}

impl<O> Replicable<O>
where
    O: Operation + Transformable,
    O::State: ReplicableState,
{
    /// Standalone master with default bookkeeping sizes.
    pub fn new(id: impl Into<String>, state: O::State) -> Self {
        Self::build(
            id.into(),
            Arc::new(state),
            Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            DEFAULT_ECHO_RETENTION,
            DEFAULT_HISTORY_CAPACITY,
        )
    }

    /// Replicable configured by `config`. A replica configuration starts
    /// out following its master.
    pub fn from_config(config: &ReplicationConfig, state: Arc<O::State>) -> ReplicationResult<Self> {
        config.validate()?;
        let replicable = Self::build(
            config.replicable_id.clone(),
            state,
            config.retry_interval(),
            config.echo_retention,
            config.history_capacity,
        );
        if let Some(master) = config.master_descriptor() {
            replicable.started_replicating_from(master)?;
        }
        Ok(replicable)
    }

    fn build(
        id: String,
        state: Arc<O::State>,
        retry_interval: Duration,
        echo_retention: usize,
        history_capacity: usize,
    ) -> Self {
        let metrics = Arc::new(ReplicationMetrics::new());
        Self {
            sending_queue: Arc::new(SendingQueue::new(id.clone(), Arc::clone(&metrics))),
            id,
            instance: InstanceKey::next(),
            state,
            replication: RwLock::new(ReplicationState::Master),
            listeners: ListenerRegistry::new(),
            sequencer: Mutex::new(Sequencer {
                history: ServerHistory::new(history_capacity),
                origins: OriginTracker::new(),
            }),
            inbound: Mutex::new(Inbound::new(echo_retention)),
            forward_order: Mutex::new(()),
            metrics,
            retry_interval,
        }
    }

    // ==================
    // Accessors
    // ==================

    /// Id this replicable is discovered and routed by.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &O::State {
        &self.state
    }

    pub fn state_handle(&self) -> Arc<O::State> {
        Arc::clone(&self.state)
    }

    pub fn replication_state(&self) -> ReplicationState {
        self.replication
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_replica(&self) -> bool {
        self.replication_state().is_replica()
    }

    pub fn master_descriptor(&self) -> Option<MasterDescriptor> {
        self.replication_state().master().cloned()
    }

    /// Whether the calling thread is inside `initially_fill_from` of this
    /// replicable.
    pub fn is_currently_filling_from_initial_load(&self) -> bool {
        flags::current(self.instance).filling_from_initial_load
    }

    /// Whether the calling thread is applying an operation on this
    /// replicable.
    pub fn is_currently_applying_operation_received_from_master(&self) -> bool {
        flags::current(self.instance).applying_from_master
    }

    /// Last master sequence applied by this replica.
    pub fn last_received_sequence(&self) -> u64 {
        self.lock_inbound().last_received
    }

    /// Last sequence this replicable fanned out.
    pub fn last_sequence(&self) -> u64 {
        self.lock_sequencer().history.last_sequence()
    }

    /// Operations forwarded to the master whose echo has not arrived.
    pub fn pending_len(&self) -> usize {
        self.lock_inbound().pending.len()
    }

    /// Submissions waiting in the sending queue.
    pub fn queued_for_sending(&self) -> usize {
        self.sending_queue.len()
    }

    /// Inbound operations held while suspended.
    pub fn inbound_queued_len(&self) -> usize {
        self.lock_inbound().queued.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn lock_inbound(&self) -> std::sync::MutexGuard<'_, Inbound<O>> {
        self.inbound.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_sequencer(&self) -> std::sync::MutexGuard<'_, Sequencer<O>> {
        self.sequencer.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================
    // Listeners
    // ==================

    pub fn add_operation_execution_listener(&self, listener: Arc<dyn OperationExecutionListener<O>>) {
        self.listeners.add(listener);
    }

    pub fn remove_operation_execution_listener(
        &self,
        listener: &Arc<dyn OperationExecutionListener<O>>,
    ) -> bool {
        self.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ==================
    // Sending to the master
    // ==================

    pub fn set_sender(&self, sender: Arc<dyn OperationsToMasterSender<O>>) {
        self.sending_queue.set_sender(sender);
    }

    pub fn retry_pending(&self) -> RetryOutcome {
        self.sending_queue.retry_pending()
    }

    /// Background thread retrying queued submissions every configured interval.
    pub fn spawn_retry_worker(&self) -> RetryWorker {
        RetryWorker::spawn(Arc::clone(&self.sending_queue), self.retry_interval)
    }

    // ==================
    // Applying
    // ==================

    /// Apply a client operation.
    ///
    /// On a replica the operation is applied locally and forwarded to the
    /// master. A failed send queues it for retry and is not an error.
    pub fn apply(&self, operation: O) -> ReplicationResult<O::Output> {
        self.apply_identified(operation, None)
    }

    /// Apply an operation that already carries an id.
    pub fn apply_wrapped(&self, wrapper: IdWrapper<O>) -> ReplicationResult<O::Output> {
        let id = wrapper.parent_id();
        self.apply_identified(wrapper.into_inner(), Some(id))
    }

    fn apply_identified(&self, operation: O, id: Option<OperationId>) -> ReplicationResult<O::Output> {
        let state = self.replication_state();
        if !state.can_apply() {
            return Err(ReplicationError::halted(format!(
                "{} is halted; clear replica state first",
                self.id
            )));
        }

        let master = match state.master() {
            Some(master) if !flags::current(self.instance).any() => master.clone(),
            _ => {
                let causation = Causation {
                    operation_id: id,
                    origin: None,
                };
                return self.execute(&operation, causation);
            }
        };

        let id = id.unwrap_or_default();
        let _order = self.forward_order.lock().unwrap_or_else(|e| e.into_inner());
        let (output, based_on) = {
            let mut inbound = self.lock_inbound();
            let output = self.execute(&operation, Causation::of(id))?;
            inbound.pending.push(PendingOperation::new(id, operation.clone()));
            (output, inbound.last_received)
        };

        self.sending_queue.schedule_for_sending(MasterSubmission {
            replicable_id: self.id.clone(),
            origin: master.replica_id,
            based_on,
            operation: IdWrapper::new(id, operation),
        });
        Ok(output)
    }

    /// Apply locally and fan out, without forwarding to any master.
    pub fn apply_replicated(&self, operation: &O) -> ReplicationResult<O::Output> {
        if self.replication_state().is_halted() {
            return Err(ReplicationError::halted(format!("{} is halted", self.id)));
        }
        self.execute(operation, Causation::none())
    }

    fn execute(&self, operation: &O, causation: Causation) -> ReplicationResult<O::Output> {
        let mut sequencer = self.lock_sequencer();
        self.execute_locked(&mut sequencer, operation, causation)
    }

    fn execute_locked(
        &self,
        sequencer: &mut Sequencer<O>,
        operation: &O,
        causation: Causation,
    ) -> ReplicationResult<O::Output> {
        let _flag = FlagGuard::applying_from_master(self.instance);
        let mut ctx = ApplyContext::new(causation, flags::current(self.instance));

        let output = match operation.apply_to(&self.state, &mut ctx) {
            Ok(output) => output,
            Err(e) => {
                self.metrics.increment_apply_failures();
                Logger::error(
                    Event::OperationFailed.as_str(),
                    &[
                        ("code", e.code()),
                        ("operation", operation.name()),
                        ("reason", &e.to_string()),
                        ("replicable", &self.id),
                    ],
                );
                return Err(ReplicationError::apply_failed(operation.name(), e));
            }
        };
        self.metrics.increment_applied();
        Logger::trace(
            Event::OperationApplied.as_str(),
            &[("operation", operation.name()), ("replicable", &self.id)],
        );

        for nested in ctx.take_emitted() {
            let envelope = Envelope::Plain(nested).wrap_with(causation.operation_id);
            self.fan_out_locked(sequencer, envelope, causation.origin);
        }
        if operation.requires_explicit_transitive_replication() {
            let envelope = Envelope::Plain(operation.clone()).wrap_with(causation.operation_id);
            self.fan_out_locked(sequencer, envelope, causation.origin);
        }
        Ok(output)
    }

    /// Number `envelope` and notify a snapshot of the listeners. Listener
    /// failures are logged and counted only.
    fn fan_out_locked(
        &self,
        sequencer: &mut Sequencer<O>,
        envelope: Envelope<O>,
        origin: Option<uuid::Uuid>,
    ) -> u64 {
        let sequence = sequencer.history.record(origin, envelope.clone());
        self.metrics.increment_fanned_out();
        let replicated = ReplicatedOperation { sequence, envelope };

        for listener in self.listeners.snapshot() {
            if let Err(e) = listener.executed(&self.id, &replicated) {
                self.metrics.increment_listener_failures();
                Logger::error(
                    Event::ListenerFailed.as_str(),
                    &[
                        ("listener", &listener.name()),
                        ("reason", &e.to_string()),
                        ("replicable", &self.id),
                        ("sequence", &sequence.to_string()),
                    ],
                );
            }
        }
        sequence
    }

    // ==================
    // Master side
    // ==================

    /// Rebase and apply an operation a replica submitted.
    ///
    /// Every submission ends in at least one history entry carrying its id,
    /// so the origin can retire it: the applied operation, `Dropped` when
    /// it was transformed away, or `Rejected` when it could not be applied.
    pub fn receive_submission(
        &self,
        submission: MasterSubmission<O>,
    ) -> ReplicationResult<SubmissionOutcome> {
        if !self.replication_state().is_master() {
            return Err(ReplicationError::illegal_transition(format!(
                "{} is not a master and cannot accept submissions",
                self.id
            )));
        }

        let id = submission.id();
        let origin = submission.origin;
        let mut sequencer = self.lock_sequencer();
        let rebased = {
            let Sequencer { history, origins } = &mut *sequencer;
            origins.rebase_submission(
                history,
                origin,
                submission.based_on,
                id,
                submission.operation.into_inner(),
            )
        };

        let operation = match rebased {
            Ok(Some(operation)) => operation,
            Ok(None) => {
                let sequence =
                    self.fan_out_locked(&mut sequencer, Envelope::Dropped(id), Some(origin));
                self.metrics.increment_dropped_by_transform();
                Logger::info(
                    Event::OperationDropped.as_str(),
                    &[
                        ("operation_id", &id.to_string()),
                        ("origin", &origin.to_string()),
                        ("replicable", &self.id),
                    ],
                );
                return Ok(SubmissionOutcome::Dropped { sequence });
            }
            Err(e) => {
                self.fan_out_locked(&mut sequencer, Envelope::Rejected(id), Some(origin));
                return Err(ReplicationError::history_divergence(format!(
                    "cannot rebase {} from {}: {}",
                    id, origin, e
                )));
            }
        };

        let before = sequencer.history.last_sequence();
        let causation = Causation::of(id).with_origin(origin);
        if let Err(e) = self.execute_locked(&mut sequencer, &operation, causation) {
            self.fan_out_locked(&mut sequencer, Envelope::Rejected(id), Some(origin));
            return Err(e);
        }
        let mut sequence = sequencer.history.last_sequence();
        if sequence == before {
            // Nothing replicated; acknowledge so the origin retires it
            sequence = self.fan_out_locked(&mut sequencer, Envelope::Dropped(id), Some(origin));
        }
        Ok(SubmissionOutcome::Applied { sequence })
    }

    /// Forget the rebase bookkeeping for a replica that stopped following
    /// this master. A later submission from it starts a fresh simulation.
    pub fn replica_detached(&self, replica_id: &uuid::Uuid) -> bool {
        let forgotten = self.lock_sequencer().origins.forget(replica_id);
        if forgotten {
            log_event_with_fields(
                Event::ReplicaDetached,
                &[
                    ("replica_id", &replica_id.to_string()),
                    ("replicable", &self.id),
                ],
            );
        }
        forgotten
    }

    /// Number of replicas whose submissions the master is tracking.
    pub fn tracked_origins(&self) -> usize {
        self.lock_sequencer().origins.origin_count()
    }

    // ==================
    // Replica side
    // ==================

    /// Handle one operation fanned out by the master.
    pub fn apply_received_replicated(
        &self,
        operation: ReplicatedOperation<O>,
    ) -> ReplicationResult<InboundOutcome> {
        let state = self.replication_state();
        if state.is_halted() {
            return Err(ReplicationError::halted(format!(
                "{} is halted and rejects inbound operations",
                self.id
            )));
        }
        if !state.is_replica() {
            return Err(ReplicationError::illegal_transition(format!(
                "{} is not replicating from any master",
                self.id
            )));
        }

        let mut inbound = self.lock_inbound();
        if inbound.suspended {
            inbound.queued.push_back(operation);
            return Ok(InboundOutcome::Queued);
        }
        self.process_inbound(&mut inbound, operation)
    }

    fn process_inbound(
        &self,
        inbound: &mut Inbound<O>,
        operation: ReplicatedOperation<O>,
    ) -> ReplicationResult<InboundOutcome> {
        let sequence = operation.sequence;
        if sequence <= inbound.last_received {
            return Ok(InboundOutcome::Duplicate);
        }
        if sequence != inbound.last_received + 1 {
            return Err(self.halt(
                HaltReason::SequenceGap,
                &format!(
                    "expected sequence {}, received {}",
                    inbound.last_received + 1,
                    sequence
                ),
            ));
        }
        inbound.last_received = sequence;

        match operation.envelope {
            Envelope::Rejected(id) => {
                if inbound.is_pending(&id) {
                    return Err(self.halt(
                        HaltReason::HistoryDivergence,
                        &format!("master rejected own operation {}", id),
                    ));
                }
                Ok(InboundOutcome::Ignored)
            }
            Envelope::Dropped(id) => {
                if inbound.retire(id) {
                    Logger::info(
                        Event::OperationDropped.as_str(),
                        &[
                            ("operation_id", &id.to_string()),
                            ("replicable", &self.id),
                            ("side", "master"),
                        ],
                    );
                    return Ok(InboundOutcome::EchoSuppressed);
                }
                Ok(InboundOutcome::Ignored)
            }
            Envelope::Plain(operation) => self.apply_inbound(inbound, None, operation),
            Envelope::Wrapped(wrapper) => {
                let id = wrapper.parent_id();
                if inbound.retire(id) || inbound.echoed.contains(&id) {
                    self.metrics.increment_echoes_suppressed();
                    Logger::trace(
                        Event::EchoSuppressed.as_str(),
                        &[
                            ("operation_id", &id.to_string()),
                            ("replicable", &self.id),
                            ("sequence", &sequence.to_string()),
                        ],
                    );
                    return Ok(InboundOutcome::EchoSuppressed);
                }
                self.apply_inbound(inbound, Some(id), wrapper.into_inner())
            }
        }
    }

    fn apply_inbound(
        &self,
        inbound: &mut Inbound<O>,
        id: Option<OperationId>,
        operation: O,
    ) -> ReplicationResult<InboundOutcome> {
        let name = operation.name();
        let transformed = match Transformer::transform_server_against_pending(
            operation,
            &mut inbound.pending,
        ) {
            Some(transformed) => transformed,
            None => {
                self.metrics.increment_dropped_by_transform();
                Logger::info(
                    Event::OperationDropped.as_str(),
                    &[("operation", name), ("replicable", &self.id), ("side", "replica")],
                );
                return Ok(InboundOutcome::Dropped);
            }
        };

        let causation = Causation {
            operation_id: id,
            origin: None,
        };
        match self.execute(&transformed, causation) {
            Ok(_) => Ok(InboundOutcome::Applied),
            Err(e) => Err(self.halt(HaltReason::HistoryDivergence, &e.message)),
        }
    }

    fn halt(&self, reason: HaltReason, detail: &str) -> ReplicationError {
        {
            let mut state = self.replication.write().unwrap_or_else(|e| e.into_inner());
            *state = std::mem::take(&mut *state).halt(reason);
        }
        log_event_with_fields(
            Event::ReplicationHalted,
            &[
                ("detail", detail),
                ("reason", reason.as_str()),
                ("replicable", &self.id),
            ],
        );
        match reason {
            HaltReason::HistoryDivergence => ReplicationError::history_divergence(detail),
            _ => ReplicationError::halted(format!("{}: {}", reason.as_str(), detail)),
        }
    }

    /// Hold inbound operations until `resume_inbound`.
    pub fn suspend_inbound(&self) {
        self.lock_inbound().suspended = true;
        Logger::info(Event::InboundSuspended.as_str(), &[("replicable", &self.id)]);
    }

    /// Process held operations in arrival order. Returns how many were held.
    pub fn resume_inbound(&self) -> ReplicationResult<usize> {
        let mut inbound = self.lock_inbound();
        inbound.suspended = false;
        let held: Vec<_> = inbound.queued.drain(..).collect();
        let count = held.len();
        Logger::info(
            Event::InboundResumed.as_str(),
            &[("queued", &count.to_string()), ("replicable", &self.id)],
        );
        for operation in held {
            self.process_inbound(&mut inbound, operation)?;
        }
        Ok(count)
    }

    // ==================
    // Initial load
    // ==================

    /// Write the initial load: a header frame, then the state's own frames.
    ///
    /// No operation is applied while the load is written, so the header's
    /// sequence is exactly the last operation the load contains.
    pub fn serialize_for_initial_replication(&self, writer: &mut dyn Write) -> ReplicationResult<u64> {
        let sequencer = self.lock_sequencer();
        let header = InitialLoadHeader {
            replicable_id: self.id.clone(),
            sequence: sequencer.history.last_sequence(),
            created_at: Utc::now(),
        };
        codec::write_frame(writer, &header)?;
        self.state.serialize_for_initial_replication(writer)?;

        Logger::info(
            Event::SnapshotSerialized.as_str(),
            &[
                ("replicable", &self.id),
                ("sequence", &header.sequence.to_string()),
            ],
        );
        Ok(header.sequence)
    }

    /// Replace the state with an initial load.
    ///
    /// Must not be called while this thread is already loading or applying
    /// on this replicable. A replica whose load fails halts until its state
    /// is cleared.
    pub fn initially_fill_from(&self, reader: &mut dyn Read) -> ReplicationResult<InitialLoadHeader> {
        let current = flags::current(self.instance);
        debug_assert!(
            !current.any(),
            "nested initial load on replicable {}",
            self.id
        );
        if current.any() {
            return Err(ReplicationError::nested_initial_load(format!(
                "{} is already loading or applying on this thread",
                self.id
            )));
        }

        let _flag = FlagGuard::filling_from_initial_load(self.instance);
        let scope = ObservationScope::with_fields(
            Event::InitialLoad,
            vec![("replicable", self.id.clone())],
        );

        let mut context = ResolvingContext::new();
        let loaded = codec::read_frame::<_, InitialLoadHeader>(reader).and_then(|header| {
            if header.replicable_id != self.id {
                return Err(CodecError::Unexpected(format!(
                    "initial load of '{}' offered to '{}'",
                    header.replicable_id, self.id
                )));
            }
            self.state.initially_fill_from(reader, &mut context)?;
            Ok(header)
        });

        let header = match loaded {
            Ok(header) => header,
            Err(e) => {
                let reason = e.to_string();
                scope.fail(&reason);
                if self.is_replica() {
                    self.halt(HaltReason::InitialLoadFailed, &reason);
                }
                return Err(e.into());
            }
        };

        {
            let mut inbound = self.lock_inbound();
            inbound.pending.clear();
            inbound.echoed.clear();
            inbound.last_received = header.sequence;
        }
        {
            let mut sequencer = self.lock_sequencer();
            sequencer.history.reset_to(header.sequence);
            sequencer.origins.clear();
        }
        self.metrics.increment_initial_loads();
        scope.complete_with_fields(&[
            ("resolved", &context.len().to_string()),
            ("sequence", &header.sequence.to_string()),
        ]);
        Ok(header)
    }

    // ==================
    // Lifecycle
    // ==================

    /// Drop replicated state and every piece of replication bookkeeping.
    /// A halted replicable becomes an unfilled replica again.
    pub fn clear_replica_state(&self) {
        self.state.clear_replica_state();
        let discarded = self.sending_queue.clear();
        self.lock_inbound().reset();
        {
            let mut sequencer = self.lock_sequencer();
            let last = sequencer.history.last_sequence();
            sequencer.history.reset_to(last);
            sequencer.origins.clear();
        }
        {
            let mut state = self.replication.write().unwrap_or_else(|e| e.into_inner());
            *state = std::mem::take(&mut *state).cleared();
        }
        log_event_with_fields(
            Event::ReplicaStateCleared,
            &[
                ("discarded", &discarded.to_string()),
                ("replicable", &self.id),
            ],
        );
    }

    /// Start following `master`.
    pub fn started_replicating_from(&self, master: MasterDescriptor) -> ReplicationResult<()> {
        let address = master.address.clone();
        self.transition(|state| state.start_replicating_from(master))?;
        log_event_with_fields(
            Event::ReplicationStarted,
            &[("master", &address), ("replicable", &self.id)],
        );
        Ok(())
    }

    /// Stop following `master`. Queued submissions and pending operations
    /// are discarded; they can no longer reach it.
    pub fn stopped_replicating_from(&self, master: &MasterDescriptor) -> ReplicationResult<()> {
        self.transition(|state| state.stop_replicating_from(master))?;
        self.sending_queue.clear_sender();
        let discarded = self.sending_queue.clear();
        self.lock_inbound().reset();
        log_event_with_fields(
            Event::ReplicationStopped,
            &[
                ("discarded", &discarded.to_string()),
                ("master", &master.address),
                ("replicable", &self.id),
            ],
        );
        Ok(())
    }

    fn transition(
        &self,
        f: impl FnOnce(ReplicationState) -> ReplicationResult<ReplicationState>,
    ) -> ReplicationResult<()> {
        let mut state = self.replication.write().unwrap_or_else(|e| e.into_inner());
        *state = f(state.clone())?;
        Ok(())
    }
}

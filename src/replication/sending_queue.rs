//! Sending queue
//!
//! Replica-to-master delivery with in-order retry:
//! - While anything is queued, new submissions queue behind it
//! - Otherwise a submission is sent immediately and queued on failure
//! - Retries drain from the front and stop at the first failure
//!
//! The queue mutex is held across each send, so no send ever overtakes
//! another one from the same replicable.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::observability::{Event, Logger, ReplicationMetrics};
use crate::operation::{IdWrapper, OperationId};

use super::errors::TransportError;

/// An operation a replica forwards to its master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSubmission<O> {
    pub replicable_id: String,
    /// Replica that applied the operation locally
    pub origin: Uuid,
    /// Last master sequence the replica had applied when it applied the operation
    pub based_on: u64,
    pub operation: IdWrapper<O>,
}

impl<O> MasterSubmission<O> {
    pub fn id(&self) -> OperationId {
        self.operation.parent_id()
    }
}

/// Transport towards the master.
pub trait OperationsToMasterSender<O>: Send + Sync {
    fn send_to_master(&self, submission: &MasterSubmission<O>) -> Result<(), TransportError>;
}

/// Outcome of one retry pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryOutcome {
    pub sent: usize,
    pub remaining: usize,
}

/// What happened to a newly scheduled submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleResult {
    Sent,
    /// Queued because earlier submissions are still waiting
    QueuedBehind,
    /// Send failed or no sender is attached
    QueuedForRetry,
}

/// FIFO of submissions not yet accepted by the master.
pub struct SendingQueue<O> {
    replicable_id: String,
    queue: Mutex<VecDeque<MasterSubmission<O>>>,
    sender: RwLock<Option<Arc<dyn OperationsToMasterSender<O>>>>,
    metrics: Arc<ReplicationMetrics>,
}

impl<O> SendingQueue<O> {
    pub fn new(replicable_id: impl Into<String>, metrics: Arc<ReplicationMetrics>) -> Self {
        Self {
            replicable_id: replicable_id.into(),
            queue: Mutex::new(VecDeque::new()),
            sender: RwLock::new(None),
            metrics,
        }
    }

    pub fn replicable_id(&self) -> &str {
        &self.replicable_id
    }

    pub fn set_sender(&self, sender: Arc<dyn OperationsToMasterSender<O>>) {
        *self.sender.write().unwrap_or_else(|e| e.into_inner()) = Some(sender);
    }

    pub fn clear_sender(&self) {
        *self.sender.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn current_sender(&self) -> Option<Arc<dyn OperationsToMasterSender<O>>> {
        self.sender.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Send `submission` now, or queue it behind earlier ones.
    pub fn schedule_for_sending(&self, submission: MasterSubmission<O>) -> ScheduleResult {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let id = submission.id().to_string();

        if !queue.is_empty() {
            queue.push_back(submission);
            return ScheduleResult::QueuedBehind;
        }

        let sender = match self.current_sender() {
            Some(sender) => sender,
            None => {
                Logger::warn(
                    Event::ForwardFailed.as_str(),
                    &[
                        ("operation_id", &id),
                        ("reason", "no sender attached"),
                        ("replicable", &self.replicable_id),
                    ],
                );
                queue.push_back(submission);
                return ScheduleResult::QueuedForRetry;
            }
        };

        match sender.send_to_master(&submission) {
            Ok(()) => {
                self.metrics.increment_forwarded();
                Logger::trace(
                    Event::OperationForwarded.as_str(),
                    &[("operation_id", &id), ("replicable", &self.replicable_id)],
                );
                ScheduleResult::Sent
            }
            Err(e) => {
                self.metrics.increment_forward_failures();
                Logger::warn(
                    Event::ForwardFailed.as_str(),
                    &[
                        ("operation_id", &id),
                        ("reason", &e.to_string()),
                        ("replicable", &self.replicable_id),
                    ],
                );
                queue.push_back(submission);
                ScheduleResult::QueuedForRetry
            }
        }
    }

    /// Resend queued submissions in order, stopping at the first failure.
    pub fn retry_pending(&self) -> RetryOutcome {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let mut outcome = RetryOutcome::default();

        let sender = match self.current_sender() {
            Some(sender) => sender,
            None => {
                outcome.remaining = queue.len();
                return outcome;
            }
        };

        while let Some(front) = queue.front() {
            match sender.send_to_master(front) {
                Ok(()) => {
                    let id = front.id().to_string();
                    queue.pop_front();
                    outcome.sent += 1;
                    self.metrics.increment_forwarded();
                    self.metrics.increment_retries();
                    Logger::info(
                        Event::RetrySucceeded.as_str(),
                        &[("operation_id", &id), ("replicable", &self.replicable_id)],
                    );
                }
                Err(e) => {
                    self.metrics.increment_forward_failures();
                    Logger::warn(
                        Event::ForwardFailed.as_str(),
                        &[
                            ("operation_id", &front.id().to_string()),
                            ("queued", &queue.len().to_string()),
                            ("reason", &e.to_string()),
                            ("replicable", &self.replicable_id),
                        ],
                    );
                    break;
                }
            }
        }

        outcome.remaining = queue.len();
        outcome
    }

    /// Drop everything queued. Returns how many submissions were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let discarded = queue.len();
        queue.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of queued submissions, front first.
    pub fn queued_ids(&self) -> Vec<OperationId> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|submission| submission.id())
            .collect()
    }
}

//! Master-side rebasing of replica submissions
//!
//! For every replica that submits operations the master keeps a copy of
//! that replica's pending list, advanced through the history exactly the
//! way the replica advances its own list while receiving:
//! - an entry produced by the replica's own submission retires its id
//! - any other entry is transformed against the pending list
//!
//! A submission based on sequence `b` was applied on the replica after
//! entries `..=b` and after every pending operation still listed at that
//! point. Replaying the entries after `b` on a copy of the list yields the
//! submission as it applies to the master's current state.

use std::collections::HashMap;
use uuid::Uuid;

use crate::operation::OperationId;

use super::history::{HistoryEntry, ServerHistory};
use super::transformer::{PendingOperation, Transformer};
use super::Transformable;

#[derive(Debug)]
struct OriginState<O> {
    pending: Vec<PendingOperation<O>>,
    simulated_through: u64,
}

/// Why a submission could not be rebased
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RebaseError {
    #[error("submission based on sequence {based_on} but history starts after {oldest_basis}")]
    HistoryEvicted { based_on: u64, oldest_basis: u64 },
    #[error("submission based on sequence {based_on} but last sequence is {last_sequence}")]
    AheadOfHistory { based_on: u64, last_sequence: u64 },
}

/// Per-origin pending simulations.
#[derive(Debug)]
pub struct OriginTracker<O> {
    origins: HashMap<Uuid, OriginState<O>>,
}

impl<O: Transformable + Clone> OriginTracker<O> {
    pub fn new() -> Self {
        Self {
            origins: HashMap::new(),
        }
    }

    /// Rebase `operation`, submitted by `origin` on top of sequence
    /// `based_on`, onto the end of `history`.
    ///
    /// `Ok(None)` means the operation no longer has an effect.
    pub fn rebase_submission(
        &mut self,
        history: &ServerHistory<O>,
        origin: Uuid,
        based_on: u64,
        id: OperationId,
        operation: O,
    ) -> Result<Option<O>, RebaseError> {
        let last_sequence = history.last_sequence();
        if based_on > last_sequence {
            return Err(RebaseError::AheadOfHistory {
                based_on,
                last_sequence,
            });
        }

        // Nothing is pending yet for an origin seen for the first time
        let state = self.origins.entry(origin).or_insert_with(|| OriginState {
            pending: Vec::new(),
            simulated_through: based_on,
        });
        if based_on < state.simulated_through {
            // The replica went back in time (reloaded); start over
            *state = OriginState {
                pending: Vec::new(),
                simulated_through: based_on,
            };
        }

        let evicted = || RebaseError::HistoryEvicted {
            based_on,
            oldest_basis: history.oldest_basis(),
        };
        let seen = history
            .between(state.simulated_through, based_on)
            .ok_or_else(evicted)?;
        let unseen = history.between(based_on, last_sequence).ok_or_else(evicted)?;

        for entry in &seen {
            advance(&mut state.pending, entry, origin);
        }
        state.simulated_through = based_on;
        state.pending.push(PendingOperation::new(id, operation));

        let mut working = state.pending.clone();
        for entry in &unseen {
            advance(&mut working, entry, origin);
        }
        Ok(working
            .into_iter()
            .find(|pending| pending.id == id)
            .and_then(|pending| pending.operation))
    }

    /// Drop the simulation of `origin`.
    pub fn forget(&mut self, origin: &Uuid) -> bool {
        self.origins.remove(origin).is_some()
    }

    pub fn clear(&mut self) {
        self.origins.clear();
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    /// Number of operations still simulated as pending for `origin`.
    pub fn pending_len(&self, origin: &Uuid) -> usize {
        self.origins
            .get(origin)
            .map(|state| state.pending.len())
            .unwrap_or(0)
    }
}

impl<O: Transformable + Clone> Default for OriginTracker<O> {
    fn default() -> Self {
        Self::new()
    }
}

fn advance<O: Transformable + Clone>(
    pending: &mut Vec<PendingOperation<O>>,
    entry: &HistoryEntry<O>,
    origin: Uuid,
) {
    if entry.origin == Some(origin) {
        if let Some(id) = entry.envelope.id() {
            pending.retain(|p| p.id != id);
        }
        return;
    }
    if let Some(server_op) = entry.envelope.operation() {
        let _ = Transformer::transform_server_against_pending(server_op.clone(), pending);
    }
}

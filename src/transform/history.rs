//! Server history
//!
//! The master numbers every envelope it fans out with a monotonically
//! increasing sequence and keeps the most recent entries. A submission
//! from a replica names the last sequence that replica had applied; the
//! master replays the entries after it to rebase the submission.
//!
//! Sequences start at 1. Sequence 0 means "nothing applied yet".

use std::collections::VecDeque;
use uuid::Uuid;

use crate::operation::Envelope;

/// One fanned-out envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<O> {
    pub sequence: u64,
    /// Replica whose submission produced this entry, `None` for local applies
    pub origin: Option<Uuid>,
    pub envelope: Envelope<O>,
}

/// Bounded, numbered record of fanned-out envelopes.
#[derive(Debug)]
pub struct ServerHistory<O> {
    entries: VecDeque<HistoryEntry<O>>,
    capacity: usize,
    last_sequence: u64,
}

impl<O: Clone> ServerHistory<O> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            last_sequence: 0,
        }
    }

    /// Record an envelope and return its sequence.
    pub fn record(&mut self, origin: Option<Uuid>, envelope: Envelope<O>) -> u64 {
        self.last_sequence += 1;
        self.entries.push_back(HistoryEntry {
            sequence: self.last_sequence,
            origin,
            envelope,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.last_sequence
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Oldest sequence a submission may still be based on.
    pub fn oldest_basis(&self) -> u64 {
        match self.entries.front() {
            Some(entry) => entry.sequence - 1,
            None => self.last_sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with `after < sequence <= through`, in order. `None` if part
    /// of that range was evicted or lies ahead of the history.
    pub fn between(&self, after: u64, through: u64) -> Option<Vec<HistoryEntry<O>>> {
        if after < self.oldest_basis() || through > self.last_sequence || after > through {
            return None;
        }
        Some(
            self.entries
                .iter()
                .filter(|entry| entry.sequence > after && entry.sequence <= through)
                .cloned()
                .collect(),
        )
    }

    /// Forget all entries; numbering restarts at `last_sequence`.
    pub fn reset_to(&mut self, last_sequence: u64) {
        self.entries.clear();
        self.last_sequence = last_sequence;
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry<O>> {
        self.entries.iter()
    }
}

//! IdWrapper and the replication envelope
//!
//! An operation travels between replicables inside an [`Envelope`]:
//! - `Plain`: an operation with no causal id
//! - `Wrapped`: an operation tagged with the id of the operation that produced it
//! - `Dropped`: the master's acknowledgement that a forwarded operation was
//!   transformed away and will never be replayed
//! - `Rejected`: the master failed to apply a forwarded operation; the
//!   replica that applied it no longer matches the master
//!
//! `IdWrapper` holds the bare operation, never another envelope, so double
//! wrapping cannot be expressed.

use serde::{Deserialize, Serialize};

use super::id::OperationId;

/// An operation decorated with the id of its parent operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdWrapper<O> {
    parent_id: OperationId,
    inner: O,
}

impl<O> IdWrapper<O> {
    pub fn new(parent_id: OperationId, inner: O) -> Self {
        Self { parent_id, inner }
    }

    pub fn parent_id(&self) -> OperationId {
        self.parent_id
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

/// Unit carried by the replication channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Envelope<O> {
    Plain(O),
    Wrapped(IdWrapper<O>),
    Dropped(OperationId),
    Rejected(OperationId),
}

impl<O> Envelope<O> {
    /// Wrap with `id` unless the envelope already carries an id.
    pub fn wrap(self, id: OperationId) -> Self {
        match self {
            Envelope::Plain(operation) => Envelope::Wrapped(IdWrapper::new(id, operation)),
            already @ (Envelope::Wrapped(_) | Envelope::Dropped(_) | Envelope::Rejected(_)) => {
                already
            }
        }
    }

    /// Wrap with the causation id when one is present.
    pub fn wrap_with(self, causation: Option<OperationId>) -> Self {
        match causation {
            Some(id) => self.wrap(id),
            None => self,
        }
    }

    pub fn id(&self) -> Option<OperationId> {
        match self {
            Envelope::Plain(_) => None,
            Envelope::Wrapped(wrapper) => Some(wrapper.parent_id()),
            Envelope::Dropped(id) | Envelope::Rejected(id) => Some(*id),
        }
    }

    pub fn operation(&self) -> Option<&O> {
        match self {
            Envelope::Plain(operation) => Some(operation),
            Envelope::Wrapped(wrapper) => Some(wrapper.inner()),
            Envelope::Dropped(_) | Envelope::Rejected(_) => None,
        }
    }
}

impl<O> From<O> for Envelope<O> {
    fn from(operation: O) -> Self {
        Envelope::Plain(operation)
    }
}

impl<O> From<IdWrapper<O>> for Envelope<O> {
    fn from(wrapper: IdWrapper<O>) -> Self {
        Envelope::Wrapped(wrapper)
    }
}

//! Operation identifiers
//!
//! Ids exist purely for loop suppression. They carry no ordering and no
//! meaning for transformation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an operation that a replica forwarded to its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Causal context of one application.
///
/// `operation_id` is the id of the wrapped operation currently being
/// executed, if any; every operation fanned out while it runs is wrapped
/// with that id. `origin` names the replica whose submission triggered the
/// application on a master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Causation {
    pub operation_id: Option<OperationId>,
    pub origin: Option<Uuid>,
}

impl Causation {
    /// No enclosing operation, no remote origin.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(operation_id: OperationId) -> Self {
        Self {
            operation_id: Some(operation_id),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Uuid) -> Self {
        self.origin = Some(origin);
        self
    }
}

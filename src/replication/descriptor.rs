//! Master descriptor
//!
//! Identifies the master a replica follows and the identity the replica
//! uses when submitting operations to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The master a replica replicates from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MasterDescriptor {
    /// Transport address of the master
    pub address: String,
    /// Identity of this replica as seen by the master
    pub replica_id: Uuid,
}

impl MasterDescriptor {
    pub fn new(address: impl Into<String>, replica_id: Uuid) -> Self {
        Self {
            address: address.into(),
            replica_id,
        }
    }

    /// Descriptor with a freshly generated replica identity.
    pub fn generated(address: impl Into<String>) -> Self {
        Self::new(address, Uuid::new_v4())
    }
}

impl fmt::Display for MasterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (as replica {})", self.address, self.replica_id)
    }
}

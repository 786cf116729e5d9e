//! Operations
//!
//! An operation is an immutable, serializable command describing exactly one
//! state mutation. This module provides:
//! - The `Operation` trait applied by a replicable to its state
//! - `OperationId` and `IdWrapper` for loop suppression
//! - `Envelope`, the unit carried by the replication channel
//! - `ApplyContext`, the explicit causation and emission context
//!
//! Operations reference no replicable. The container decides whether and
//! how an applied operation is replicated.

mod context;
mod envelope;
mod errors;
mod id;

pub use context::{ApplyContext, ReplicationFlags};
pub use envelope::{Envelope, IdWrapper};
pub use errors::{OperationError, OperationResult};
pub use id::{Causation, OperationId};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A state mutation that can be applied and replicated.
pub trait Operation: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Domain state this operation mutates
    type State: Send + Sync + 'static;

    /// Result handed back to the caller of `apply`
    type Output;

    /// Apply to `state`. A pure function of the operation's fields and the
    /// state it is given.
    fn apply_to(
        &self,
        state: &Self::State,
        ctx: &mut ApplyContext<Self>,
    ) -> OperationResult<Self::Output>;

    /// Whether the container must fan this operation out itself.
    ///
    /// Operations that replicate their effects through nested emissions
    /// return `false` so they are not replicated twice.
    fn requires_explicit_transitive_replication(&self) -> bool {
        true
    }

    /// Stable name used in logs
    fn name(&self) -> &'static str;
}

//! Operational transformation
//!
//! Generic support for reconciling concurrently issued operations:
//! - `Transformable`: the pairwise contract every replicated operation type implements
//! - `Transformer`: transforms one operation against a sequence, in both directions
//! - `ServerHistory`: the master's numbered record of fanned-out operations
//! - `OriginTracker`: rebases replica submissions onto the master's history
//!
//! Convergence requirement for a client operation `c` and a concurrent server
//! operation `s`: applying `s` then `c.transform_client_op(&s)` must yield the
//! same state as applying `c` then `s.transform_server_op(&c)`. A `None`
//! result means the operation no longer has an effect and must be dropped.

mod history;
mod origin;
mod transformer;

#[cfg(test)]
pub(crate) mod test_support;

pub use history::{HistoryEntry, ServerHistory};
pub use origin::{OriginTracker, RebaseError};
pub use transformer::{PendingOperation, Transformer};

/// Pairwise transformation contract.
///
/// Both directions must be computed from the same rule table entry for the
/// ordered (client, server) pair.
pub trait Transformable: Sized {
    /// Adjust this client operation so it applies after `server_op`.
    fn transform_client_op(&self, server_op: &Self) -> Option<Self>;

    /// Adjust this server operation so it applies after `client_op`.
    fn transform_server_op(&self, client_op: &Self) -> Option<Self>;
}

//! regatta-replication - master/replica replication of racing event state
//!
//! Operations applied on a master are fanned out to its replicas. Replicas
//! apply their own operations optimistically, forward them to the master and
//! reconcile concurrent edits through operational transformation.

pub mod cli;
pub mod leaderboard;
pub mod observability;
pub mod operation;
pub mod replication;
pub mod transform;

//! Leaderboard domain
//!
//! The racing event service holds leaderboards and groups of them. It is the
//! state of one replicable; every change goes through a
//! `RacingEventServiceOperation` so it can be replicated and transformed.

mod model;
mod operations;
mod service;
mod transform;

pub use model::{
    GroupSnapshot, Leaderboard, LeaderboardGroup, RaceColumn, ServiceSnapshot, SharedLeaderboard,
};
pub use operations::{OperationOutcome, RacingEventServiceOperation};
pub use service::RacingEventService;

use crate::replication::Replicable;

/// Id under which the racing event service replicates
pub const RACING_EVENT_SERVICE_ID: &str = "racing-event-service";

/// Replicable wrapping a racing event service.
pub type RacingEventReplicable = Replicable<RacingEventServiceOperation>;

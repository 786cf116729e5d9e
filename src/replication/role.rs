//! Replication State Machine
//!
//! - Master: authoritative, the default for every replicable
//! - Replica: follows a master, applies optimistically and forwards
//! - Halted: an inbound operation could not be reconciled
//!
//! A halted replicable rejects local and inbound operations until
//! `clear_replica_state` returns it to an unfilled replica (or to a master
//! if it never followed one).

use super::descriptor::MasterDescriptor;
use super::errors::{ReplicationError, ReplicationResult};

/// Replication state of one replicable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplicationState {
    /// Not following anyone. Operation order here is authoritative.
    #[default]
    Master,

    /// Following `master`
    Replica { master: MasterDescriptor },

    /// Replica state diverged from the master's history
    Halted {
        reason: HaltReason,
        /// Master followed when the halt happened
        master: Option<MasterDescriptor>,
    },
}

/// Reason for a halt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A transformed inbound operation failed to apply
    HistoryDivergence,

    /// An inbound sequence number skipped ahead
    SequenceGap,

    /// Initial load failed part way
    InitialLoadFailed,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HistoryDivergence => "history_divergence",
            Self::SequenceGap => "sequence_gap",
            Self::InitialLoadFailed => "initial_load_failed",
        }
    }
}

impl ReplicationState {
    /// Start following `master`.
    ///
    /// Idempotent for the same master; switching masters requires
    /// `stop_replicating_from` first.
    pub fn start_replicating_from(self, master: MasterDescriptor) -> ReplicationResult<Self> {
        match self {
            Self::Master => Ok(Self::Replica { master }),
            Self::Replica { master: current } => {
                if current == master {
                    Ok(Self::Replica { master })
                } else {
                    Err(ReplicationError::illegal_transition(format!(
                        "already replicating from {}, cannot start replicating from {}",
                        current, master
                    )))
                }
            }
            Self::Halted { .. } => Err(ReplicationError::halted(
                "cannot start replicating while halted; clear replica state first",
            )),
        }
    }

    /// Stop following `master`, becoming a standalone master.
    ///
    /// Valid from a halted state as an operator detach.
    pub fn stop_replicating_from(self, master: &MasterDescriptor) -> ReplicationResult<Self> {
        match self {
            Self::Master => Ok(Self::Master),
            Self::Replica { master: current } | Self::Halted { master: Some(current), .. } => {
                if &current == master {
                    Ok(Self::Master)
                } else {
                    Err(ReplicationError::illegal_transition(format!(
                        "replicating from {}, not from {}",
                        current, master
                    )))
                }
            }
            Self::Halted { master: None, .. } => Ok(Self::Master),
        }
    }

    /// Halt, remembering the master. Valid from any state.
    pub fn halt(self, reason: HaltReason) -> Self {
        let master = match self {
            Self::Master => None,
            Self::Replica { master } => Some(master),
            Self::Halted { master, .. } => master,
        };
        Self::Halted { reason, master }
    }

    /// Leave a halt after replica state was cleared.
    pub fn cleared(self) -> Self {
        match self {
            Self::Halted {
                master: Some(master),
                ..
            } => Self::Replica { master },
            Self::Halted { master: None, .. } => Self::Master,
            other => other,
        }
    }

    /// Check if this state accepts local operations.
    pub fn can_apply(&self) -> bool {
        !self.is_halted()
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master)
    }

    pub fn is_replica(&self) -> bool {
        matches!(self, Self::Replica { .. })
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }

    /// Master currently followed. `None` for masters and halted replicables.
    pub fn master(&self) -> Option<&MasterDescriptor> {
        match self {
            Self::Replica { master } => Some(master),
            _ => None,
        }
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self {
            Self::Halted { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Get state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Replica { .. } => "replica",
            Self::Halted { .. } => "halted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::errors::ReplicationErrorKind;

    fn master(address: &str) -> MasterDescriptor {
        MasterDescriptor::generated(address)
    }

    #[test]
    fn test_default_is_master() {
        let state = ReplicationState::default();
        assert!(state.is_master());
        assert!(state.can_apply());
        assert!(state.master().is_none());
    }

    #[test]
    fn test_master_can_start_replicating() {
        let m = master("m1:8888");
        let state = ReplicationState::Master.start_replicating_from(m.clone()).unwrap();
        assert!(state.is_replica());
        assert_eq!(state.master(), Some(&m));
    }

    #[test]
    fn test_start_idempotent_for_same_master() {
        let m = master("m1:8888");
        let state = ReplicationState::Replica { master: m.clone() };
        assert!(state.start_replicating_from(m).is_ok());
    }

    #[test]
    fn test_cannot_switch_master_directly() {
        let state = ReplicationState::Replica {
            master: master("m1:8888"),
        };
        let err = state.start_replicating_from(master("m2:8888")).unwrap_err();
        assert_eq!(err.kind, ReplicationErrorKind::IllegalTransition);
    }

    #[test]
    fn test_stop_returns_to_master() {
        let m = master("m1:8888");
        let state = ReplicationState::Replica { master: m.clone() };
        assert!(state.stop_replicating_from(&m).unwrap().is_master());
    }

    #[test]
    fn test_stop_from_other_master_rejected() {
        let state = ReplicationState::Replica {
            master: master("m1:8888"),
        };
        assert!(state.stop_replicating_from(&master("m2:8888")).is_err());
    }

    #[test]
    fn test_halt_keeps_master() {
        let m = master("m1:8888");
        let state = ReplicationState::Replica { master: m.clone() }.halt(HaltReason::SequenceGap);
        assert!(state.is_halted());
        assert!(!state.can_apply());
        assert_eq!(state.halt_reason(), Some(HaltReason::SequenceGap));
        assert_eq!(state.cleared(), ReplicationState::Replica { master: m });
    }

    #[test]
    fn test_halted_cannot_start_replicating() {
        let state = ReplicationState::Master.halt(HaltReason::HistoryDivergence);
        let err = state.start_replicating_from(master("m1:8888")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_halted_without_master_clears_to_master() {
        let state = ReplicationState::Master.halt(HaltReason::InitialLoadFailed);
        assert!(state.cleared().is_master());
    }

    #[test]
    fn test_operator_detach_from_halt() {
        let m = master("m1:8888");
        let state = ReplicationState::Replica { master: m.clone() }.halt(HaltReason::HistoryDivergence);
        assert!(state.stop_replicating_from(&m).unwrap().is_master());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ReplicationState::Master.state_name(), "master");
        assert_eq!(
            ReplicationState::Replica { master: master("m") }.state_name(),
            "replica"
        );
        assert_eq!(
            ReplicationState::Master.halt(HaltReason::SequenceGap).state_name(),
            "halted"
        );
    }
}

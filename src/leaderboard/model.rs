//! Leaderboard domain values

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// One race column of a leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceColumn {
    pub name: String,
    pub medal_race: bool,
    /// Score multiplier, `None` for the default
    pub factor: Option<f64>,
}

impl RaceColumn {
    pub fn new(name: impl Into<String>, medal_race: bool) -> Self {
        Self {
            name: name.into(),
            medal_race,
            factor: None,
        }
    }
}

/// A leaderboard whose columns are edited one by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub name: String,
    pub display_name: Option<String>,
    pub columns: Vec<RaceColumn>,
}

impl Leaderboard {
    pub fn new(name: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            display_name,
            columns: Vec::new(),
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn column(&self, column: &str) -> Option<&RaceColumn> {
        self.columns.iter().find(|c| c.name == column)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Leaderboard shared between the service and the groups listing it.
pub type SharedLeaderboard = Arc<RwLock<Leaderboard>>;

/// Named, ordered set of leaderboards. Members are the same instances
/// the service holds.
#[derive(Debug, Clone)]
pub struct LeaderboardGroup {
    pub name: String,
    pub leaderboards: Vec<SharedLeaderboard>,
}

impl LeaderboardGroup {
    pub fn member_names(&self) -> Vec<String> {
        self.leaderboards
            .iter()
            .map(|lb| lb.read().unwrap_or_else(|e| e.into_inner()).name.clone())
            .collect()
    }

    pub fn contains(&self, leaderboard: &SharedLeaderboard) -> bool {
        self.leaderboards.iter().any(|lb| Arc::ptr_eq(lb, leaderboard))
    }
}

/// Serialized form of a group: members are embedded in full, so one
/// leaderboard can occur several times in an initial load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub name: String,
    pub leaderboards: Vec<Leaderboard>,
}

/// Replicated contents of a racing event service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub leaderboards: Vec<Leaderboard>,
    pub groups: Vec<GroupSnapshot>,
}

//! Racing event service operations
//!
//! Each variant carries everything needed to replay it on another copy of
//! the service. Column edits are positional: removing and moving a column
//! name the index they expect it at, so concurrent edits can be rebased
//! against each other.

use serde::{Deserialize, Serialize};

use crate::operation::{ApplyContext, Operation, OperationError, OperationResult};

use super::model::{Leaderboard, RaceColumn};
use super::service::RacingEventService;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RacingEventServiceOperation {
    CreateFlexibleLeaderboard {
        leaderboard: String,
        display_name: Option<String>,
    },
    /// Creates a leaderboard with plain columns in one step. Replicates as
    /// the nested creation and column additions it emits.
    CreateFlexibleLeaderboardWithColumns {
        leaderboard: String,
        display_name: Option<String>,
        columns: Vec<String>,
    },
    RemoveLeaderboard {
        leaderboard: String,
    },
    RenameLeaderboard {
        old_name: String,
        new_name: String,
    },
    AddColumnToLeaderboard {
        leaderboard: String,
        column: String,
        medal_race: bool,
        index: usize,
    },
    RemoveLeaderboardColumn {
        leaderboard: String,
        column: String,
        index: usize,
    },
    RenameLeaderboardColumn {
        leaderboard: String,
        old_name: String,
        new_name: String,
    },
    /// Move towards the first column
    MoveLeaderboardColumnUp {
        leaderboard: String,
        column: String,
        from: usize,
        to: usize,
    },
    /// Move towards the last column
    MoveLeaderboardColumnDown {
        leaderboard: String,
        column: String,
        from: usize,
        to: usize,
    },
    UpdateLeaderboardColumnFactor {
        leaderboard: String,
        column: String,
        factor: Option<f64>,
    },
    CreateLeaderboardGroup {
        group: String,
        leaderboards: Vec<String>,
    },
    RemoveLeaderboardGroup {
        group: String,
    },
}

/// What applying an operation did.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    LeaderboardCreated,
    LeaderboardRemoved(Leaderboard),
    LeaderboardRenamed,
    ColumnAdded { index: usize },
    ColumnRemoved(RaceColumn),
    ColumnRenamed,
    ColumnMoved { from: usize, to: usize },
    FactorUpdated { previous: Option<f64> },
    GroupCreated,
    GroupRemoved,
}

impl RacingEventServiceOperation {
    /// Move `column` one position up. `None` for the first column.
    pub fn move_column_up(leaderboard: &str, column: &str, index: usize) -> Option<Self> {
        let to = index.checked_sub(1)?;
        Self::with_move(leaderboard, column, index, to)
    }

    /// Move `column` one position down. The upper bound is checked when applied.
    pub fn move_column_down(leaderboard: &str, column: &str, index: usize) -> Option<Self> {
        let to = index.checked_add(1)?;
        Self::with_move(leaderboard, column, index, to)
    }

    /// The move variant matching the direction from `from` to `to`, or
    /// `None` if the column stays where it is.
    pub fn with_move(leaderboard: &str, column: &str, from: usize, to: usize) -> Option<Self> {
        let leaderboard = leaderboard.to_string();
        let column = column.to_string();
        if to < from {
            Some(Self::MoveLeaderboardColumnUp {
                leaderboard,
                column,
                from,
                to,
            })
        } else if to > from {
            Some(Self::MoveLeaderboardColumnDown {
                leaderboard,
                column,
                from,
                to,
            })
        } else {
            None
        }
    }

    /// The leaderboard a column edit targets.
    pub fn column_target(&self) -> Option<&str> {
        match self {
            Self::AddColumnToLeaderboard { leaderboard, .. }
            | Self::RemoveLeaderboardColumn { leaderboard, .. }
            | Self::RenameLeaderboardColumn { leaderboard, .. }
            | Self::MoveLeaderboardColumnUp { leaderboard, .. }
            | Self::MoveLeaderboardColumnDown { leaderboard, .. }
            | Self::UpdateLeaderboardColumnFactor { leaderboard, .. } => Some(leaderboard.as_str()),
            Self::CreateFlexibleLeaderboard { .. }
            | Self::CreateFlexibleLeaderboardWithColumns { .. }
            | Self::RemoveLeaderboard { .. }
            | Self::RenameLeaderboard { .. }
            | Self::CreateLeaderboardGroup { .. }
            | Self::RemoveLeaderboardGroup { .. } => None,
        }
    }

    /// Same column edit addressed to `leaderboard`. Other operations are
    /// returned unchanged.
    pub fn retarget(&self, new_leaderboard: &str) -> Self {
        let mut retargeted = self.clone();
        match &mut retargeted {
            Self::AddColumnToLeaderboard { leaderboard, .. }
            | Self::RemoveLeaderboardColumn { leaderboard, .. }
            | Self::RenameLeaderboardColumn { leaderboard, .. }
            | Self::MoveLeaderboardColumnUp { leaderboard, .. }
            | Self::MoveLeaderboardColumnDown { leaderboard, .. }
            | Self::UpdateLeaderboardColumnFactor { leaderboard, .. } => {
                *leaderboard = new_leaderboard.to_string();
            }
            Self::CreateFlexibleLeaderboard { .. }
            | Self::CreateFlexibleLeaderboardWithColumns { .. }
            | Self::RemoveLeaderboard { .. }
            | Self::RenameLeaderboard { .. }
            | Self::CreateLeaderboardGroup { .. }
            | Self::RemoveLeaderboardGroup { .. } => {}
        }
        retargeted
    }
}

impl Operation for RacingEventServiceOperation {
    type State = RacingEventService;
    type Output = OperationOutcome;

    fn apply_to(
        &self,
        service: &RacingEventService,
        ctx: &mut ApplyContext<Self>,
    ) -> OperationResult<OperationOutcome> {
        match self {
            Self::CreateFlexibleLeaderboard {
                leaderboard,
                display_name,
            } => {
                service.add_leaderboard(Leaderboard::new(leaderboard.as_str(), display_name.clone()))?;
                Ok(OperationOutcome::LeaderboardCreated)
            }
            Self::CreateFlexibleLeaderboardWithColumns {
                leaderboard,
                display_name,
                columns,
            } => {
                let mut created = Leaderboard::new(leaderboard.as_str(), display_name.clone());
                for column in columns {
                    if created.column_index(column).is_some() {
                        return Err(OperationError::column_exists(leaderboard, column));
                    }
                    created.columns.push(RaceColumn::new(column.as_str(), false));
                }
                service.add_leaderboard(created)?;

                ctx.emit(Self::CreateFlexibleLeaderboard {
                    leaderboard: leaderboard.clone(),
                    display_name: display_name.clone(),
                });
                for (index, column) in columns.iter().enumerate() {
                    ctx.emit(Self::AddColumnToLeaderboard {
                        leaderboard: leaderboard.clone(),
                        column: column.clone(),
                        medal_race: false,
                        index,
                    });
                }
                Ok(OperationOutcome::LeaderboardCreated)
            }
            Self::RemoveLeaderboard { leaderboard } => service
                .remove_leaderboard(leaderboard)
                .map(OperationOutcome::LeaderboardRemoved),
            Self::RenameLeaderboard { old_name, new_name } => {
                service.rename_leaderboard(old_name, new_name)?;
                Ok(OperationOutcome::LeaderboardRenamed)
            }
            Self::AddColumnToLeaderboard {
                leaderboard,
                column,
                medal_race,
                index,
            } => {
                let index = service.add_column(leaderboard, column, *medal_race, *index)?;
                Ok(OperationOutcome::ColumnAdded { index })
            }
            Self::RemoveLeaderboardColumn {
                leaderboard,
                column,
                index,
            } => service
                .remove_column(leaderboard, column, *index)
                .map(OperationOutcome::ColumnRemoved),
            Self::RenameLeaderboardColumn {
                leaderboard,
                old_name,
                new_name,
            } => {
                service.rename_column(leaderboard, old_name, new_name)?;
                Ok(OperationOutcome::ColumnRenamed)
            }
            Self::MoveLeaderboardColumnUp {
                leaderboard,
                column,
                from,
                to,
            }
            | Self::MoveLeaderboardColumnDown {
                leaderboard,
                column,
                from,
                to,
            } => {
                service.move_column(leaderboard, column, *from, *to)?;
                Ok(OperationOutcome::ColumnMoved {
                    from: *from,
                    to: *to,
                })
            }
            Self::UpdateLeaderboardColumnFactor {
                leaderboard,
                column,
                factor,
            } => {
                let previous = service.update_column_factor(leaderboard, column, *factor)?;
                Ok(OperationOutcome::FactorUpdated { previous })
            }
            Self::CreateLeaderboardGroup {
                group,
                leaderboards,
            } => {
                service.add_group(group, leaderboards)?;
                Ok(OperationOutcome::GroupCreated)
            }
            Self::RemoveLeaderboardGroup { group } => {
                service.remove_group(group)?;
                Ok(OperationOutcome::GroupRemoved)
            }
        }
    }

    fn requires_explicit_transitive_replication(&self) -> bool {
        !matches!(self, Self::CreateFlexibleLeaderboardWithColumns { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::CreateFlexibleLeaderboard { .. } => "CreateFlexibleLeaderboard",
            Self::CreateFlexibleLeaderboardWithColumns { .. } => {
                "CreateFlexibleLeaderboardWithColumns"
            }
            Self::RemoveLeaderboard { .. } => "RemoveLeaderboard",
            Self::RenameLeaderboard { .. } => "RenameLeaderboard",
            Self::AddColumnToLeaderboard { .. } => "AddColumnToLeaderboard",
            Self::RemoveLeaderboardColumn { .. } => "RemoveLeaderboardColumn",
            Self::RenameLeaderboardColumn { .. } => "RenameLeaderboardColumn",
            Self::MoveLeaderboardColumnUp { .. } => "MoveLeaderboardColumnUp",
            Self::MoveLeaderboardColumnDown { .. } => "MoveLeaderboardColumnDown",
            Self::UpdateLeaderboardColumnFactor { .. } => "UpdateLeaderboardColumnFactor",
            Self::CreateLeaderboardGroup { .. } => "CreateLeaderboardGroup",
            Self::RemoveLeaderboardGroup { .. } => "RemoveLeaderboardGroup",
        }
    }
}

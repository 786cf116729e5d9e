//! Racing event service
//!
//! The replicated state: leaderboards by name and groups of leaderboards.
//! Every mutator validates its preconditions and reports a typed
//! `OperationError`; nothing is changed when validation fails.
//!
//! Lock order is leaderboards → groups → one leaderboard.
//!
//! Active trackers are local processes. They are never part of an initial
//! load and survive clearing the replicated state.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, RwLock};

use crate::operation::{OperationError, OperationResult};
use crate::replication::{read_frame, write_frame, CodecError, ReplicableState, ResolvingContext};

use super::model::{
    GroupSnapshot, Leaderboard, LeaderboardGroup, RaceColumn, ServiceSnapshot, SharedLeaderboard,
};

#[derive(Default)]
pub struct RacingEventService {
    leaderboards: RwLock<BTreeMap<String, SharedLeaderboard>>,
    groups: RwLock<BTreeMap<String, LeaderboardGroup>>,
    trackers: Mutex<BTreeSet<String>>,
}

impl RacingEventService {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_leaderboards(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, SharedLeaderboard>> {
        self.leaderboards.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_leaderboards(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, SharedLeaderboard>> {
        self.leaderboards.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_groups(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, LeaderboardGroup>> {
        self.groups.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_groups(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, LeaderboardGroup>> {
        self.groups.write().unwrap_or_else(|e| e.into_inner())
    }

    // ==================
    // Queries
    // ==================

    pub fn leaderboard(&self, name: &str) -> Option<SharedLeaderboard> {
        self.read_leaderboards().get(name).cloned()
    }

    /// Copy of one leaderboard.
    pub fn leaderboard_snapshot(&self, name: &str) -> Option<Leaderboard> {
        self.leaderboard(name)
            .map(|lb| lb.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    pub fn leaderboard_names(&self) -> Vec<String> {
        self.read_leaderboards().keys().cloned().collect()
    }

    pub fn column_names(&self, leaderboard: &str) -> Option<Vec<String>> {
        self.leaderboard_snapshot(leaderboard)
            .map(|lb| lb.column_names())
    }

    /// Position of `column` in `leaderboard`, for building positional operations.
    pub fn column_index(&self, leaderboard: &str, column: &str) -> Option<usize> {
        self.leaderboard(leaderboard).and_then(|lb| {
            lb.read()
                .unwrap_or_else(|e| e.into_inner())
                .column_index(column)
        })
    }

    pub fn group(&self, name: &str) -> Option<LeaderboardGroup> {
        self.read_groups().get(name).cloned()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.read_groups().keys().cloned().collect()
    }

    pub fn group_members(&self, name: &str) -> Option<Vec<String>> {
        self.read_groups().get(name).map(|g| g.member_names())
    }

    /// Copy of all replicated contents, leaderboards and groups by name.
    pub fn snapshot(&self) -> ServiceSnapshot {
        let leaderboards = self.read_leaderboards();
        let groups = self.read_groups();
        ServiceSnapshot {
            leaderboards: leaderboards
                .values()
                .map(|lb| lb.read().unwrap_or_else(|e| e.into_inner()).clone())
                .collect(),
            groups: groups
                .values()
                .map(|group| GroupSnapshot {
                    name: group.name.clone(),
                    leaderboards: group
                        .leaderboards
                        .iter()
                        .map(|lb| lb.read().unwrap_or_else(|e| e.into_inner()).clone())
                        .collect(),
                })
                .collect(),
        }
    }

    // ==================
    // Leaderboards
    // ==================

    pub fn add_leaderboard(&self, leaderboard: Leaderboard) -> OperationResult<SharedLeaderboard> {
        let mut leaderboards = self.write_leaderboards();
        if leaderboards.contains_key(&leaderboard.name) {
            return Err(OperationError::LeaderboardExists(leaderboard.name));
        }
        let name = leaderboard.name.clone();
        let shared = Arc::new(RwLock::new(leaderboard));
        leaderboards.insert(name, Arc::clone(&shared));
        Ok(shared)
    }

    /// Remove a leaderboard and its memberships.
    pub fn remove_leaderboard(&self, name: &str) -> OperationResult<Leaderboard> {
        let mut leaderboards = self.write_leaderboards();
        let removed = leaderboards
            .remove(name)
            .ok_or_else(|| OperationError::LeaderboardNotFound(name.to_string()))?;
        for group in self.write_groups().values_mut() {
            group.leaderboards.retain(|lb| !Arc::ptr_eq(lb, &removed));
        }
        let leaderboard = removed.read().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(leaderboard)
    }

    pub fn rename_leaderboard(&self, old_name: &str, new_name: &str) -> OperationResult<()> {
        let mut leaderboards = self.write_leaderboards();
        if old_name == new_name {
            return match leaderboards.contains_key(old_name) {
                true => Ok(()),
                false => Err(OperationError::LeaderboardNotFound(old_name.to_string())),
            };
        }
        if leaderboards.contains_key(new_name) {
            return Err(OperationError::LeaderboardExists(new_name.to_string()));
        }
        let shared = leaderboards
            .remove(old_name)
            .ok_or_else(|| OperationError::LeaderboardNotFound(old_name.to_string()))?;
        shared.write().unwrap_or_else(|e| e.into_inner()).name = new_name.to_string();
        leaderboards.insert(new_name.to_string(), shared);
        Ok(())
    }

    /// Run `f` on one leaderboard under its write lock.
    pub fn with_leaderboard_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Leaderboard) -> OperationResult<R>,
    ) -> OperationResult<R> {
        let shared = self
            .leaderboard(name)
            .ok_or_else(|| OperationError::LeaderboardNotFound(name.to_string()))?;
        let mut leaderboard = shared.write().unwrap_or_else(|e| e.into_inner());
        f(&mut leaderboard)
    }

    // ==================
    // Columns
    // ==================

    /// Insert a column at `index`, at most one past the last column.
    pub fn add_column(
        &self,
        leaderboard: &str,
        column: &str,
        medal_race: bool,
        index: usize,
    ) -> OperationResult<usize> {
        self.with_leaderboard_mut(leaderboard, |lb| {
            if lb.column_index(column).is_some() {
                return Err(OperationError::column_exists(leaderboard, column));
            }
            if index > lb.columns.len() {
                return Err(OperationError::invalid(format!(
                    "cannot insert column '{}' at index {} of {} columns",
                    column,
                    index,
                    lb.columns.len()
                )));
            }
            lb.columns.insert(index, RaceColumn::new(column, medal_race));
            Ok(index)
        })
    }

    /// Remove the column expected at `index`.
    pub fn remove_column(&self, leaderboard: &str, column: &str, index: usize) -> OperationResult<RaceColumn> {
        self.with_leaderboard_mut(leaderboard, |lb| {
            check_position(lb, column, index)?;
            Ok(lb.columns.remove(index))
        })
    }

    pub fn rename_column(&self, leaderboard: &str, old_name: &str, new_name: &str) -> OperationResult<()> {
        self.with_leaderboard_mut(leaderboard, |lb| {
            let index = lb
                .column_index(old_name)
                .ok_or_else(|| OperationError::column_not_found(leaderboard, old_name))?;
            if old_name != new_name && lb.column_index(new_name).is_some() {
                return Err(OperationError::column_exists(leaderboard, new_name));
            }
            lb.columns[index].name = new_name.to_string();
            Ok(())
        })
    }

    /// Move the column expected at `from` so that it ends up at `to`.
    pub fn move_column(&self, leaderboard: &str, column: &str, from: usize, to: usize) -> OperationResult<()> {
        self.with_leaderboard_mut(leaderboard, |lb| {
            check_position(lb, column, from)?;
            if to >= lb.columns.len() {
                return Err(OperationError::invalid(format!(
                    "cannot move column '{}' to index {} of {} columns",
                    column,
                    to,
                    lb.columns.len()
                )));
            }
            let moved = lb.columns.remove(from);
            lb.columns.insert(to, moved);
            Ok(())
        })
    }

    /// Set a column factor, returning the previous one.
    pub fn update_column_factor(
        &self,
        leaderboard: &str,
        column: &str,
        factor: Option<f64>,
    ) -> OperationResult<Option<f64>> {
        if let Some(value) = factor {
            if !value.is_finite() || value <= 0.0 {
                return Err(OperationError::invalid(format!(
                    "factor {} of column '{}' must be positive",
                    value, column
                )));
            }
        }
        self.with_leaderboard_mut(leaderboard, |lb| {
            let index = lb
                .column_index(column)
                .ok_or_else(|| OperationError::column_not_found(leaderboard, column))?;
            Ok(std::mem::replace(&mut lb.columns[index].factor, factor))
        })
    }

    // ==================
    // Groups
    // ==================

    pub fn add_group(&self, name: &str, members: &[String]) -> OperationResult<()> {
        let leaderboards = self.read_leaderboards();
        let mut groups = self.write_groups();
        if groups.contains_key(name) {
            return Err(OperationError::GroupExists(name.to_string()));
        }
        let mut resolved = Vec::with_capacity(members.len());
        for member in members {
            let shared = leaderboards
                .get(member)
                .ok_or_else(|| OperationError::LeaderboardNotFound(member.clone()))?;
            if resolved.iter().any(|lb| Arc::ptr_eq(lb, shared)) {
                return Err(OperationError::invalid(format!(
                    "leaderboard '{}' listed twice in group '{}'",
                    member, name
                )));
            }
            resolved.push(Arc::clone(shared));
        }
        groups.insert(
            name.to_string(),
            LeaderboardGroup {
                name: name.to_string(),
                leaderboards: resolved,
            },
        );
        Ok(())
    }

    pub fn remove_group(&self, name: &str) -> OperationResult<LeaderboardGroup> {
        self.write_groups()
            .remove(name)
            .ok_or_else(|| OperationError::GroupNotFound(name.to_string()))
    }

    // ==================
    // Trackers
    // ==================

    /// Register a locally running tracker. Returns false if already active.
    pub fn start_tracking(&self, race: impl Into<String>) -> bool {
        self.trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(race.into())
    }

    pub fn stop_tracking(&self, race: &str) -> bool {
        self.trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(race)
    }

    pub fn active_trackers(&self) -> Vec<String> {
        self.trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Replace all replicated contents with `snapshot`, resolving every
    /// occurrence of a leaderboard to one shared instance.
    pub fn restore(
        &self,
        snapshot: ServiceSnapshot,
        context: &mut ResolvingContext,
    ) -> Result<(), CodecError> {
        let mut leaderboards = BTreeMap::new();
        for leaderboard in snapshot.leaderboards {
            let name = leaderboard.name.clone();
            if leaderboards.contains_key(&name) {
                return Err(CodecError::Unexpected(format!(
                    "leaderboard '{}' occurs twice",
                    name
                )));
            }
            let shared = context.resolve_with(&name, || RwLock::new(leaderboard));
            leaderboards.insert(name, shared);
        }

        let mut groups = BTreeMap::new();
        for group in snapshot.groups {
            let mut members = Vec::with_capacity(group.leaderboards.len());
            for member in group.leaderboards {
                let name = member.name.clone();
                if !leaderboards.contains_key(&name) {
                    return Err(CodecError::Unexpected(format!(
                        "group '{}' lists unknown leaderboard '{}'",
                        group.name, name
                    )));
                }
                members.push(context.resolve_with(&name, || RwLock::new(member)));
            }
            groups.insert(
                group.name.clone(),
                LeaderboardGroup {
                    name: group.name,
                    leaderboards: members,
                },
            );
        }

        let mut current_leaderboards = self.write_leaderboards();
        let mut current_groups = self.write_groups();
        *current_leaderboards = leaderboards;
        *current_groups = groups;
        Ok(())
    }

    /// Drop all leaderboards and groups.
    pub fn clear(&self) {
        let mut leaderboards = self.write_leaderboards();
        let mut groups = self.write_groups();
        leaderboards.clear();
        groups.clear();
    }
}

fn check_position(lb: &Leaderboard, column: &str, index: usize) -> OperationResult<()> {
    match lb.columns.get(index) {
        Some(found) if found.name == column => Ok(()),
        _ if lb.column_index(column).is_some() => {
            Err(OperationError::position_mismatch(&lb.name, column, index))
        }
        _ => Err(OperationError::column_not_found(&lb.name, column)),
    }
}

impl ReplicableState for RacingEventService {
    fn serialize_for_initial_replication(&self, writer: &mut dyn Write) -> Result<(), CodecError> {
        write_frame(writer, &self.snapshot())
    }

    fn initially_fill_from(
        &self,
        reader: &mut dyn Read,
        context: &mut ResolvingContext,
    ) -> Result<(), CodecError> {
        let snapshot: ServiceSnapshot = read_frame(reader)?;
        self.restore(snapshot, context)
    }

    fn clear_replica_state(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with(columns: &[&str]) -> RacingEventService {
        let service = RacingEventService::new();
        service
            .add_leaderboard(Leaderboard::new("KW2017", None))
            .unwrap();
        for (i, column) in columns.iter().enumerate() {
            service.add_column("KW2017", column, false, i).unwrap();
        }
        service
    }

    #[test]
    fn test_add_column_rejects_index_past_end() {
        let service = service_with(&["R1"]);
        assert!(matches!(
            service.add_column("KW2017", "R2", false, 2),
            Err(OperationError::Invalid(_))
        ));
        assert_eq!(service.column_names("KW2017").unwrap(), vec!["R1"]);

        assert_eq!(service.add_column("KW2017", "R2", false, 1).unwrap(), 1);
        assert_eq!(service.column_names("KW2017").unwrap(), vec!["R1", "R2"]);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let service = service_with(&["R1"]);
        assert!(matches!(
            service.add_column("KW2017", "R1", false, 0),
            Err(OperationError::ColumnExists { .. })
        ));
    }

    #[test]
    fn test_remove_column_checks_position() {
        let service = service_with(&["R1", "R2", "R3"]);
        assert!(matches!(
            service.remove_column("KW2017", "R2", 0),
            Err(OperationError::ColumnPositionMismatch { index: 0, .. })
        ));
        assert!(matches!(
            service.remove_column("KW2017", "R9", 0),
            Err(OperationError::ColumnNotFound { .. })
        ));
        service.remove_column("KW2017", "R2", 1).unwrap();
        assert_eq!(service.column_names("KW2017").unwrap(), vec!["R1", "R3"]);
    }

    #[test]
    fn test_move_column() {
        let service = service_with(&["R1", "R2", "R3"]);
        service.move_column("KW2017", "R3", 2, 0).unwrap();
        assert_eq!(service.column_names("KW2017").unwrap(), vec!["R3", "R1", "R2"]);
        assert!(service.move_column("KW2017", "R3", 0, 3).is_err());
    }

    #[test]
    fn test_factor_must_be_positive() {
        let service = service_with(&["R1"]);
        assert!(service.update_column_factor("KW2017", "R1", Some(0.0)).is_err());
        assert_eq!(service.update_column_factor("KW2017", "R1", Some(2.0)).unwrap(), None);
        assert_eq!(
            service.update_column_factor("KW2017", "R1", None).unwrap(),
            Some(2.0)
        );
    }

    #[test]
    fn test_rename_keeps_group_membership() {
        let service = service_with(&[]);
        service.add_group("Kieler Woche", &["KW2017".to_string()]).unwrap();
        service.rename_leaderboard("KW2017", "KW 2017").unwrap();
        assert_eq!(
            service.group_members("Kieler Woche").unwrap(),
            vec!["KW 2017"]
        );
        assert!(service.leaderboard("KW2017").is_none());
    }

    #[test]
    fn test_remove_leaderboard_leaves_groups() {
        let service = service_with(&[]);
        service.add_group("Kieler Woche", &["KW2017".to_string()]).unwrap();
        service.remove_leaderboard("KW2017").unwrap();
        assert!(service.group_members("Kieler Woche").unwrap().is_empty());
    }

    #[test]
    fn test_group_requires_existing_members() {
        let service = service_with(&[]);
        assert!(matches!(
            service.add_group("G", &["Nope".to_string()]),
            Err(OperationError::LeaderboardNotFound(_))
        ));
        assert!(service.group("G").is_none());
    }

    #[test]
    fn test_initial_load_shares_group_members() {
        let source = service_with(&["R1", "R2"]);
        source.add_group("Kieler Woche", &["KW2017".to_string()]).unwrap();
        source.start_tracking("KW2017 R3");

        let mut bytes = Vec::new();
        source.serialize_for_initial_replication(&mut bytes).unwrap();

        let target = RacingEventService::new();
        let mut context = ResolvingContext::new();
        target
            .initially_fill_from(&mut bytes.as_slice(), &mut context)
            .unwrap();

        assert_eq!(target.snapshot(), source.snapshot());
        let top_level = target.leaderboard("KW2017").unwrap();
        let member = target.group("Kieler Woche").unwrap().leaderboards[0].clone();
        assert!(Arc::ptr_eq(&top_level, &member));
        assert!(target.active_trackers().is_empty());
    }

    #[test]
    fn test_clear_keeps_trackers() {
        let service = service_with(&["R1"]);
        service.start_tracking("R1");
        service.clear_replica_state();
        assert!(service.leaderboard_names().is_empty());
        assert_eq!(service.active_trackers(), vec!["R1"]);
    }
}

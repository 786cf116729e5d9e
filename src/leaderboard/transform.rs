//! Transformation rules for racing event service operations
//!
//! Every operation is first classified by its effect. `rule` then decides
//! each ordered (client, server) pair of effects in one exhaustive match, so
//! a new variant does not compile until it is classified and every pair
//! involving it is decided.
//!
//! Conventions:
//! - Concurrent edits of the same attribute: the client, which reaches the
//!   master later, wins.
//! - Equal edits cancel on both sides.
//! - Pairs that cannot be reconciled drop the client and keep the server
//!   operation unchanged. The replica then fails to apply it and halts.
//! - Column positions are rebased as in list OT: an index shifts by one for
//!   every concurrent insertion or removal before it.

use crate::transform::Transformable;

use super::operations::RacingEventServiceOperation as Op;

/// Rule outcome: the transformed client and server operations.
type Pair = (Option<Op>, Option<Op>);

#[derive(Debug, Clone)]
enum Effect {
    CreateLeaderboard(String),
    RemoveLeaderboard(String),
    RenameLeaderboard { old: String, new: String },
    Column { leaderboard: String, edit: ColumnEdit },
    CreateGroup { group: String, members: Vec<String> },
    RemoveGroup(String),
}

#[derive(Debug, Clone)]
enum ColumnEdit {
    Insert { column: String, index: usize, medal_race: bool },
    Delete { column: String, index: usize },
    Rename { old: String, new: String },
    Move { column: String, from: usize, to: usize },
    Update { column: String, factor: Option<f64> },
}

fn effect(op: &Op) -> Effect {
    match op {
        Op::CreateFlexibleLeaderboard { leaderboard, .. }
        | Op::CreateFlexibleLeaderboardWithColumns { leaderboard, .. } => {
            Effect::CreateLeaderboard(leaderboard.clone())
        }
        Op::RemoveLeaderboard { leaderboard } => Effect::RemoveLeaderboard(leaderboard.clone()),
        Op::RenameLeaderboard { old_name, new_name } => Effect::RenameLeaderboard {
            old: old_name.clone(),
            new: new_name.clone(),
        },
        Op::AddColumnToLeaderboard {
            leaderboard,
            column,
            medal_race,
            index,
        } => column_effect(
            leaderboard,
            ColumnEdit::Insert {
                column: column.clone(),
                index: *index,
                medal_race: *medal_race,
            },
        ),
        Op::RemoveLeaderboardColumn {
            leaderboard,
            column,
            index,
        } => column_effect(
            leaderboard,
            ColumnEdit::Delete {
                column: column.clone(),
                index: *index,
            },
        ),
        Op::RenameLeaderboardColumn {
            leaderboard,
            old_name,
            new_name,
        } => column_effect(
            leaderboard,
            ColumnEdit::Rename {
                old: old_name.clone(),
                new: new_name.clone(),
            },
        ),
        Op::MoveLeaderboardColumnUp {
            leaderboard,
            column,
            from,
            to,
        }
        | Op::MoveLeaderboardColumnDown {
            leaderboard,
            column,
            from,
            to,
        } => column_effect(
            leaderboard,
            ColumnEdit::Move {
                column: column.clone(),
                from: *from,
                to: *to,
            },
        ),
        Op::UpdateLeaderboardColumnFactor {
            leaderboard,
            column,
            factor,
        } => column_effect(
            leaderboard,
            ColumnEdit::Update {
                column: column.clone(),
                factor: *factor,
            },
        ),
        Op::CreateLeaderboardGroup {
            group,
            leaderboards,
        } => Effect::CreateGroup {
            group: group.clone(),
            members: leaderboards.clone(),
        },
        Op::RemoveLeaderboardGroup { group } => Effect::RemoveGroup(group.clone()),
    }
}

fn column_effect(leaderboard: &str, edit: ColumnEdit) -> Effect {
    Effect::Column {
        leaderboard: leaderboard.to_string(),
        edit,
    }
}

impl ColumnEdit {
    fn into_operation(self, leaderboard: &str) -> Option<Op> {
        let leaderboard = leaderboard.to_string();
        match self {
            ColumnEdit::Insert {
                column,
                index,
                medal_race,
            } => Some(Op::AddColumnToLeaderboard {
                leaderboard,
                column,
                medal_race,
                index,
            }),
            ColumnEdit::Delete { column, index } => Some(Op::RemoveLeaderboardColumn {
                leaderboard,
                column,
                index,
            }),
            ColumnEdit::Rename { old, new } => Some(Op::RenameLeaderboardColumn {
                leaderboard,
                old_name: old,
                new_name: new,
            }),
            ColumnEdit::Move { column, from, to } => Op::with_move(&leaderboard, &column, from, to),
            ColumnEdit::Update { column, factor } => Some(Op::UpdateLeaderboardColumnFactor {
                leaderboard,
                column,
                factor,
            }),
        }
    }
}

fn insert(column: &str, index: usize, medal_race: bool) -> Option<ColumnEdit> {
    Some(ColumnEdit::Insert {
        column: column.to_string(),
        index,
        medal_race,
    })
}

fn delete(column: &str, index: usize) -> Option<ColumnEdit> {
    Some(ColumnEdit::Delete {
        column: column.to_string(),
        index,
    })
}

fn rename(old: &str, new: &str) -> Option<ColumnEdit> {
    Some(ColumnEdit::Rename {
        old: old.to_string(),
        new: new.to_string(),
    })
}

fn move_to(column: &str, from: usize, to: usize) -> Option<ColumnEdit> {
    Some(ColumnEdit::Move {
        column: column.to_string(),
        from,
        to,
    })
}

fn update(column: &str, factor: Option<f64>) -> Option<ColumnEdit> {
    Some(ColumnEdit::Update {
        column: column.to_string(),
        factor,
    })
}

fn shift(index: usize, by: bool) -> usize {
    index + usize::from(by)
}

fn unshift(index: usize, by: bool) -> usize {
    index - usize::from(by)
}

type EditPair = (Option<ColumnEdit>, Option<ColumnEdit>);

/// Insert of one column at `i` against a move of another from `f` to `t`.
/// Returns the rebased insert index and the rebased move.
fn insert_against_move(i: usize, f: usize, t: usize) -> (usize, usize, usize) {
    let without_moved = unshift(i, f < i);
    let inserted = shift(without_moved, t < without_moved);
    (inserted, shift(f, i <= f), shift(t, without_moved <= t))
}

/// Delete of one column at `r` against a move of another from `f` to `t`.
/// Returns the rebased delete index and the rebased move.
fn delete_against_move(r: usize, f: usize, t: usize) -> (usize, usize, usize) {
    let without_moved = unshift(r, f < r);
    let deleted = shift(without_moved, t <= without_moved);
    (deleted, unshift(f, r < f), unshift(t, without_moved < t))
}

/// Two moves of distinct columns: x from `f1` to `t1` (client) and y from
/// `f2` to `t2` (server). Both are placed into the gaps of the list without
/// x and y; when they compete for the same gap the server's relative order
/// is kept.
fn move_against_move(
    x: &str,
    (f1, t1): (usize, usize),
    y: &str,
    (f2, t2): (usize, usize),
) -> EditPair {
    let y_without_x = unshift(f2, f1 < f2);
    let x_gap = if t1 <= y_without_x { t1 } else { t1 - 1 };
    let x_without_y = unshift(f1, f2 < f1);
    let y_gap = if t2 <= x_without_y { t2 } else { t2 - 1 };

    let y_before_x = if x_gap != y_gap {
        y_gap < x_gap
    } else {
        t2 <= x_without_y
    };

    let x_after_server = shift(x_without_y, t2 <= x_without_y);
    let y_after_client = shift(y_without_x, t1 <= y_without_x);
    (
        move_to(x, x_after_server, shift(x_gap, y_before_x)),
        move_to(y, y_after_client, shift(y_gap, !y_before_x)),
    )
}

fn column_rule(client: &ColumnEdit, server: &ColumnEdit) -> EditPair {
    use ColumnEdit::{Delete, Insert, Move, Rename, Update};

    let keep = || (Some(client.clone()), Some(server.clone()));
    let fail_stop = || (None, Some(server.clone()));

    match (client, server) {
        (
            Insert {
                column: a,
                index: i,
                medal_race: ma,
            },
            Insert {
                column: b,
                index: j,
                medal_race: mb,
            },
        ) => {
            if a != b {
                (insert(a, shift(*i, j <= i), *ma), insert(b, shift(*j, i < j), *mb))
            } else if ma == mb {
                // same column added twice: keep the server's position
                (None, move_to(b, *i, *j))
            } else {
                fail_stop()
            }
        }
        (Insert { column: a, index: i, medal_race }, Delete { column: b, index: r }) => (
            insert(a, unshift(*i, r < i), *medal_race),
            delete(b, shift(*r, i <= r)),
        ),
        (Insert { column: a, .. }, Rename { new, .. }) => {
            if a == new {
                fail_stop()
            } else {
                keep()
            }
        }
        (Insert { column: a, index: i, medal_race }, Move { column: b, from: f, to: t }) => {
            let (inserted, from, to) = insert_against_move(*i, *f, *t);
            (insert(a, inserted, *medal_race), move_to(b, from, to))
        }
        (Insert { .. }, Update { .. }) => keep(),

        (Delete { column: a, index: r }, Insert { column: b, index: i, medal_race }) => (
            delete(a, shift(*r, i <= r)),
            insert(b, unshift(*i, r < i), *medal_race),
        ),
        (Delete { column: a, index: r }, Delete { column: b, index: q }) => {
            if a == b {
                (None, None)
            } else {
                (delete(a, unshift(*r, q < r)), delete(b, unshift(*q, r < q)))
            }
        }
        (Delete { column: a, index: r }, Rename { old, new }) => {
            if a == old {
                (delete(new, *r), None)
            } else {
                keep()
            }
        }
        (Delete { column: a, index: r }, Move { column: b, from: f, to: t }) => {
            if a == b {
                (delete(a, *t), None)
            } else {
                let (deleted, from, to) = delete_against_move(*r, *f, *t);
                (delete(a, deleted), move_to(b, from, to))
            }
        }
        (Delete { column: a, .. }, Update { column: b, .. }) => {
            if a == b {
                (Some(client.clone()), None)
            } else {
                keep()
            }
        }

        (Rename { new, .. }, Insert { column: b, .. }) => {
            if new == b {
                fail_stop()
            } else {
                keep()
            }
        }
        (Rename { old, new }, Delete { column: b, index: r }) => {
            if old == b {
                (None, delete(new, *r))
            } else {
                keep()
            }
        }
        (Rename { old: o1, new: n1 }, Rename { old: o2, new: n2 }) => {
            if o1 == o2 {
                if n1 == n2 {
                    (None, None)
                } else {
                    (rename(n2, n1), None)
                }
            } else if n1 == n2 {
                fail_stop()
            } else {
                keep()
            }
        }
        (Rename { old, new }, Move { column: b, from, to }) => {
            if old == b {
                (Some(client.clone()), move_to(new, *from, *to))
            } else {
                keep()
            }
        }
        (Rename { old, new }, Update { column: b, factor }) => {
            if old == b {
                (Some(client.clone()), update(new, *factor))
            } else {
                keep()
            }
        }

        (Move { column: a, from: f, to: t }, Insert { column: b, index: i, medal_race }) => {
            let (inserted, from, to) = insert_against_move(*i, *f, *t);
            (move_to(a, from, to), insert(b, inserted, *medal_race))
        }
        (Move { column: a, from: f, to: t }, Delete { column: b, index: r }) => {
            if a == b {
                (None, delete(b, *t))
            } else {
                let (deleted, from, to) = delete_against_move(*r, *f, *t);
                (move_to(a, from, to), delete(b, deleted))
            }
        }
        (Move { column: a, from, to }, Rename { old, new }) => {
            if a == old {
                (move_to(new, *from, *to), Some(server.clone()))
            } else {
                keep()
            }
        }
        (Move { column: x, from: f1, to: t1 }, Move { column: y, from: f2, to: t2 }) => {
            if x == y {
                (move_to(x, *t2, *t1), None)
            } else {
                move_against_move(x, (*f1, *t1), y, (*f2, *t2))
            }
        }
        (Move { .. }, Update { .. }) => keep(),

        (Update { .. }, Insert { .. }) => keep(),
        (Update { column: a, .. }, Delete { column: b, .. }) => {
            if a == b {
                (None, Some(server.clone()))
            } else {
                keep()
            }
        }
        (Update { column: a, factor }, Rename { old, new }) => {
            if a == old {
                (update(new, *factor), Some(server.clone()))
            } else {
                keep()
            }
        }
        (Update { .. }, Move { .. }) => keep(),
        (Update { column: a, .. }, Update { column: b, .. }) => {
            if a == b {
                (Some(client.clone()), None)
            } else {
                keep()
            }
        }
    }
}

fn without(members: &[String], removed: &str) -> Vec<String> {
    members.iter().filter(|m| *m != removed).cloned().collect()
}

fn renamed(members: &[String], old: &str, new: &str) -> Vec<String> {
    members
        .iter()
        .map(|m| if m == old { new.to_string() } else { m.clone() })
        .collect()
}

/// Decide one ordered pair of concurrent operations.
pub(crate) fn rule(client: &Op, server: &Op) -> Pair {
    use Effect::{Column, CreateGroup, CreateLeaderboard, RemoveGroup, RemoveLeaderboard, RenameLeaderboard};

    let keep = || (Some(client.clone()), Some(server.clone()));
    let fail_stop = || (None, Some(server.clone()));

    match (effect(client), effect(server)) {
        (CreateLeaderboard(a), CreateLeaderboard(b)) => {
            if a != b {
                keep()
            } else if client == server {
                (None, None)
            } else {
                fail_stop()
            }
        }
        (CreateLeaderboard(_), RemoveLeaderboard(_)) => keep(),
        (CreateLeaderboard(a), RenameLeaderboard { new, .. }) => {
            if a == new {
                fail_stop()
            } else {
                keep()
            }
        }
        (CreateLeaderboard(_), Column { .. })
        | (CreateLeaderboard(_), CreateGroup { .. })
        | (CreateLeaderboard(_), RemoveGroup(_)) => keep(),

        (RemoveLeaderboard(_), CreateLeaderboard(_)) => keep(),
        (RemoveLeaderboard(a), RemoveLeaderboard(b)) => {
            if a == b {
                (None, None)
            } else {
                keep()
            }
        }
        (RemoveLeaderboard(a), RenameLeaderboard { old, new }) => {
            if a == old {
                (Some(Op::RemoveLeaderboard { leaderboard: new }), None)
            } else {
                keep()
            }
        }
        (RemoveLeaderboard(a), Column { leaderboard, .. }) => {
            if a == leaderboard {
                (Some(client.clone()), None)
            } else {
                keep()
            }
        }
        (RemoveLeaderboard(a), CreateGroup { group, members }) => {
            if members.contains(&a) {
                let leaderboards = without(&members, &a);
                (Some(client.clone()), Some(Op::CreateLeaderboardGroup { group, leaderboards }))
            } else {
                keep()
            }
        }
        (RemoveLeaderboard(_), RemoveGroup(_)) => keep(),

        (RenameLeaderboard { new, .. }, CreateLeaderboard(b)) => {
            if new == b {
                fail_stop()
            } else {
                keep()
            }
        }
        (RenameLeaderboard { old, new }, RemoveLeaderboard(b)) => {
            if old == b {
                (None, Some(Op::RemoveLeaderboard { leaderboard: new }))
            } else {
                keep()
            }
        }
        (RenameLeaderboard { old: o1, new: n1 }, RenameLeaderboard { old: o2, new: n2 }) => {
            if o1 == o2 {
                if n1 == n2 {
                    (None, None)
                } else {
                    let rebased = Op::RenameLeaderboard {
                        old_name: n2,
                        new_name: n1,
                    };
                    (Some(rebased), None)
                }
            } else if n1 == n2 {
                fail_stop()
            } else {
                keep()
            }
        }
        (RenameLeaderboard { old, new }, Column { leaderboard, .. }) => {
            if old == leaderboard {
                (Some(client.clone()), Some(server.retarget(&new)))
            } else {
                keep()
            }
        }
        (RenameLeaderboard { old, new }, CreateGroup { group, members }) => {
            if members.contains(&old) {
                let leaderboards = renamed(&members, &old, &new);
                (Some(client.clone()), Some(Op::CreateLeaderboardGroup { group, leaderboards }))
            } else {
                keep()
            }
        }
        (RenameLeaderboard { .. }, RemoveGroup(_)) => keep(),

        (Column { .. }, CreateLeaderboard(_)) => keep(),
        (Column { leaderboard, .. }, RemoveLeaderboard(b)) => {
            if leaderboard == b {
                (None, Some(server.clone()))
            } else {
                keep()
            }
        }
        (Column { leaderboard, .. }, RenameLeaderboard { old, new }) => {
            if leaderboard == old {
                (Some(client.clone().retarget(&new)), Some(server.clone()))
            } else {
                keep()
            }
        }
        (
            Column {
                leaderboard: l1,
                edit: e1,
            },
            Column {
                leaderboard: l2,
                edit: e2,
            },
        ) => {
            if l1 == l2 {
                let (c, s) = column_rule(&e1, &e2);
                (
                    c.and_then(|edit| edit.into_operation(&l1)),
                    s.and_then(|edit| edit.into_operation(&l2)),
                )
            } else {
                keep()
            }
        }
        (Column { .. }, CreateGroup { .. }) | (Column { .. }, RemoveGroup(_)) => keep(),

        (CreateGroup { .. }, CreateLeaderboard(_)) => keep(),
        (CreateGroup { group, members }, RemoveLeaderboard(b)) => {
            if members.contains(&b) {
                let leaderboards = without(&members, &b);
                (Some(Op::CreateLeaderboardGroup { group, leaderboards }), Some(server.clone()))
            } else {
                keep()
            }
        }
        (CreateGroup { group, members }, RenameLeaderboard { old, new }) => {
            if members.contains(&old) {
                let leaderboards = renamed(&members, &old, &new);
                (Some(Op::CreateLeaderboardGroup { group, leaderboards }), Some(server.clone()))
            } else {
                keep()
            }
        }
        (CreateGroup { .. }, Column { .. }) => keep(),
        (CreateGroup { group: g1, .. }, CreateGroup { group: g2, .. }) => {
            if g1 != g2 {
                keep()
            } else if client == server {
                (None, None)
            } else {
                fail_stop()
            }
        }
        (CreateGroup { .. }, RemoveGroup(_)) => keep(),

        (RemoveGroup(_), CreateLeaderboard(_))
        | (RemoveGroup(_), RemoveLeaderboard(_))
        | (RemoveGroup(_), RenameLeaderboard { .. })
        | (RemoveGroup(_), Column { .. })
        | (RemoveGroup(_), CreateGroup { .. }) => keep(),
        (RemoveGroup(a), RemoveGroup(b)) => {
            if a == b {
                (None, None)
            } else {
                keep()
            }
        }
    }
}

impl Transformable for Op {
    fn transform_client_op(&self, server_op: &Self) -> Option<Self> {
        rule(self, server_op).0
    }

    fn transform_server_op(&self, client_op: &Self) -> Option<Self> {
        rule(client_op, self).1
    }
}

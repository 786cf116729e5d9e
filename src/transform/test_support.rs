//! Single-character list edits used to exercise the transformation drivers.

use super::Transformable;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Edit {
    Insert(usize, char),
    Delete(usize),
}

impl Edit {
    pub(crate) fn apply(&self, text: &mut Vec<char>) {
        match self {
            Edit::Insert(index, c) => text.insert(*index, *c),
            Edit::Delete(index) => {
                text.remove(*index);
            }
        }
    }
}

fn rule(client: &Edit, server: &Edit) -> (Option<Edit>, Option<Edit>) {
    match (client, server) {
        (Edit::Insert(ci, a), Edit::Insert(si, b)) => (
            Some(Edit::Insert(ci + usize::from(si <= ci), *a)),
            Some(Edit::Insert(si + usize::from(ci < si), *b)),
        ),
        (Edit::Insert(ci, a), Edit::Delete(sr)) => (
            Some(Edit::Insert(ci - usize::from(sr < ci), *a)),
            Some(Edit::Delete(sr + usize::from(ci <= sr))),
        ),
        (Edit::Delete(cr), Edit::Insert(si, b)) => (
            Some(Edit::Delete(cr + usize::from(si <= cr))),
            Some(Edit::Insert(si - usize::from(cr < si), *b)),
        ),
        (Edit::Delete(cr), Edit::Delete(sr)) if cr == sr => (None, None),
        (Edit::Delete(cr), Edit::Delete(sr)) => (
            Some(Edit::Delete(cr - usize::from(sr < cr))),
            Some(Edit::Delete(sr - usize::from(cr < sr))),
        ),
    }
}

impl Transformable for Edit {
    fn transform_client_op(&self, server_op: &Self) -> Option<Self> {
        rule(self, server_op).0
    }

    fn transform_server_op(&self, client_op: &Self) -> Option<Self> {
        rule(client_op, self).1
    }
}

//! Sequence transformation in both directions.

use crate::operation::OperationId;

use super::Transformable;

/// An operation a replica applied locally and forwarded, still awaiting its
/// echo from the master.
///
/// `operation` is rebased over every server operation received since it was
/// forwarded. `None` means the master is known to drop it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation<O> {
    pub id: OperationId,
    pub operation: Option<O>,
}

impl<O> PendingOperation<O> {
    pub fn new(id: OperationId, operation: O) -> Self {
        Self {
            id,
            operation: Some(operation),
        }
    }
}

/// Stateless transformation driver
pub struct Transformer;

impl Transformer {
    /// Master side: transform a client operation against the server operations
    /// it was concurrent with, in the order the server applied them.
    pub fn transform_client_against<'a, O, I>(operation: O, server_ops: I) -> Option<O>
    where
        O: Transformable + 'a,
        I: IntoIterator<Item = &'a O>,
    {
        let mut current = operation;
        for server_op in server_ops {
            current = current.transform_client_op(server_op)?;
        }
        Some(current)
    }

    /// Replica side: transform an inbound server operation against the
    /// pending client operations, rebasing each pending operation over the
    /// server operation as seen at its position.
    pub fn transform_server_against_pending<O>(
        operation: O,
        pending: &mut [PendingOperation<O>],
    ) -> Option<O>
    where
        O: Transformable,
    {
        let mut current = Some(operation);
        for entry in pending.iter_mut() {
            let server_op = match current.as_ref() {
                Some(server_op) => server_op,
                None => break,
            };
            let client_op = match entry.operation.as_ref() {
                Some(client_op) => client_op,
                None => continue,
            };
            let rebased_client = client_op.transform_client_op(server_op);
            let rebased_server = server_op.transform_server_op(client_op);
            entry.operation = rebased_client;
            current = rebased_server;
        }
        current
    }
}

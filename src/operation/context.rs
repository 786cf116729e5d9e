//! Explicit context threaded through one operation application.

use super::id::{Causation, OperationId};

/// Per-thread replication flags as seen by the applying thread.
///
/// At most one flag is set within one call stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationFlags {
    pub filling_from_initial_load: bool,
    pub applying_from_master: bool,
}

impl ReplicationFlags {
    pub fn any(&self) -> bool {
        self.filling_from_initial_load || self.applying_from_master
    }
}

/// Context handed to `Operation::apply_to`.
///
/// Carries the causation id of the enclosing operation and collects the
/// nested operations an operation emits while it runs. Emitted operations
/// are fanned out by the container after `apply_to` returns, wrapped with
/// the causation id.
#[derive(Debug)]
pub struct ApplyContext<O> {
    causation: Causation,
    flags: ReplicationFlags,
    emitted: Vec<O>,
}

impl<O> ApplyContext<O> {
    pub fn new(causation: Causation, flags: ReplicationFlags) -> Self {
        Self {
            causation,
            flags,
            emitted: Vec::new(),
        }
    }

    /// Context for applying an operation outside any replicable.
    pub fn detached() -> Self {
        Self::new(Causation::none(), ReplicationFlags::default())
    }

    pub fn causation(&self) -> Causation {
        self.causation
    }

    pub fn causation_id(&self) -> Option<OperationId> {
        self.causation.operation_id
    }

    pub fn flags(&self) -> ReplicationFlags {
        self.flags
    }

    pub fn is_filling_from_initial_load(&self) -> bool {
        self.flags.filling_from_initial_load
    }

    pub fn is_applying_from_master(&self) -> bool {
        self.flags.applying_from_master
    }

    /// Record a nested operation to be replicated after the current one.
    pub fn emit(&mut self, operation: O) {
        self.emitted.push(operation);
    }

    pub fn emitted(&self) -> &[O] {
        &self.emitted
    }

    pub fn take_emitted(&mut self) -> Vec<O> {
        std::mem::take(&mut self.emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_context_is_clean() {
        let ctx: ApplyContext<u8> = ApplyContext::detached();
        assert!(ctx.causation_id().is_none());
        assert!(!ctx.flags().any());
        assert!(ctx.emitted().is_empty());
    }

    #[test]
    fn test_emit_preserves_order() {
        let mut ctx = ApplyContext::detached();
        ctx.emit(1);
        ctx.emit(2);
        ctx.emit(3);
        assert_eq!(ctx.take_emitted(), vec![1, 2, 3]);
        assert!(ctx.emitted().is_empty());
    }

    #[test]
    fn test_causation_exposed() {
        let id = OperationId::new();
        let ctx: ApplyContext<u8> = ApplyContext::new(
            Causation::of(id),
            ReplicationFlags {
                filling_from_initial_load: false,
                applying_from_master: true,
            },
        );
        assert_eq!(ctx.causation_id(), Some(id));
        assert!(ctx.is_applying_from_master());
        assert!(!ctx.is_filling_from_initial_load());
    }
}

//! Operation execution listeners
//!
//! Each listener stands for a downstream replica connection or a local
//! observer. Fan-out iterates over a snapshot of the registry, so listeners
//! added or removed during a notification do not affect it.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::operation::Envelope;

use super::errors::TransportError;

/// One fanned-out envelope with its sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedOperation<O> {
    pub sequence: u64,
    pub envelope: Envelope<O>,
}

/// Subscriber notified of every operation a replicable fans out.
pub trait OperationExecutionListener<O>: Send + Sync {
    /// Deliver one envelope. Errors are logged by the caller and never
    /// interrupt notification of other listeners.
    fn executed(&self, replicable_id: &str, operation: &ReplicatedOperation<O>)
        -> Result<(), TransportError>;

    /// Name used in logs
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Registry of listeners, compared by identity.
pub struct ListenerRegistry<O> {
    listeners: RwLock<Vec<Arc<dyn OperationExecutionListener<O>>>>,
}

impl<O> ListenerRegistry<O> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Add a listener. Adding the same listener twice has no effect.
    pub fn add(&self, listener: Arc<dyn OperationExecutionListener<O>>) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove(&self, listener: &Arc<dyn OperationExecutionListener<O>>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Copy of the current registrations.
    pub fn snapshot(&self) -> Vec<Arc<dyn OperationExecutionListener<O>>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<O> Default for ListenerRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

fn same_listener<O>(
    a: &Arc<dyn OperationExecutionListener<O>>,
    b: &Arc<dyn OperationExecutionListener<O>>,
) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

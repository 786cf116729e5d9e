//! Per-thread replication flags
//!
//! "Currently filling from initial load" and "currently applying an
//! operation received from the master" are tracked per calling thread and
//! per replicable instance. A guard sets a flag and restores the previous
//! value when dropped, including on early return and unwinding.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::operation::ReplicationFlags;

/// Identity of one replicable instance within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(u64);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

impl InstanceKey {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

thread_local! {
    static FLAGS: RefCell<HashMap<InstanceKey, ReplicationFlags>> = RefCell::new(HashMap::new());
}

/// Flags of `instance` on the calling thread.
pub fn current(instance: InstanceKey) -> ReplicationFlags {
    FLAGS.with(|flags| flags.borrow().get(&instance).copied().unwrap_or_default())
}

fn store(instance: InstanceKey, value: ReplicationFlags) {
    FLAGS.with(|flags| {
        let mut flags = flags.borrow_mut();
        if value.any() {
            flags.insert(instance, value);
        } else {
            flags.remove(&instance);
        }
    });
}

/// Restores the previous flags of one instance on drop.
#[must_use = "the flag is reset as soon as the guard is dropped"]
pub struct FlagGuard {
    instance: InstanceKey,
    previous: ReplicationFlags,
}

impl FlagGuard {
    /// Mark the calling thread as filling `instance` from an initial load.
    pub fn filling_from_initial_load(instance: InstanceKey) -> Self {
        let previous = current(instance);
        store(
            instance,
            ReplicationFlags {
                filling_from_initial_load: true,
                applying_from_master: false,
            },
        );
        Self { instance, previous }
    }

    /// Mark the calling thread as applying an operation on `instance`.
    pub fn applying_from_master(instance: InstanceKey) -> Self {
        let previous = current(instance);
        store(
            instance,
            ReplicationFlags {
                filling_from_initial_load: false,
                applying_from_master: true,
            },
        );
        Self { instance, previous }
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        store(self.instance, self.previous);
    }
}

//! Initial-load resolving context
//!
//! Domain objects can appear several times inside one initial load (a
//! leaderboard listed on its own and again inside each group containing
//! it). Decoding resolves every occurrence through this context so all of
//! them become the same shared instance.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Cache of already-materialized objects, keyed by type and stable key.
#[derive(Default)]
pub struct ResolvingContext {
    cache: HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>,
}

impl ResolvingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance registered under `key`, materializing it with `make` on
    /// first sight. Later occurrences discard their copy.
    pub fn resolve_with<T, F>(&mut self, key: &str, make: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get::<T>(key) {
            return existing;
        }
        let created = Arc::new(make());
        let erased: Arc<dyn Any + Send + Sync> = created.clone();
        self.cache
            .insert((TypeId::of::<T>(), key.to_string()), erased);
        created
    }

    /// Already-resolved instance under `key`, if any.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.cache
            .get(&(TypeId::of::<T>(), key.to_string()))
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

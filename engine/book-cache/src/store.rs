//! Concurrent keyed stores for accounts and positions
//!
//! Every operation is scoped to a single key. Traversals clone records out,
//! so callers never hold a shard lock while they work with the result.

use crate::types::{Account, Position};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Account cache keyed by account id
pub type AccountStore = EntityStore<Account>;

/// Position cache keyed by position id
pub type PositionStore = EntityStore<Position>;

/// Keyed store of one entity type
#[derive(Debug)]
pub struct EntityStore<V> {
    entries: DashMap<i64, V>,
}

impl<V: Clone> EntityStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Insert `value` if `id` is absent, otherwise hand the cached record and
    /// the new value to `merge`. Returns whether the entry already existed.
    pub fn load_or_insert_with<F>(&self, id: i64, value: V, merge: F) -> bool
    where
        F: FnOnce(&mut V, V),
    {
        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                merge(occupied.get_mut(), value);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                false
            }
        }
    }

    /// Unconditionally store `value`, returning the record it replaced
    pub fn store(&self, id: i64, value: V) -> Option<V> {
        self.entries.insert(id, value)
    }

    /// Patch the cached record in place. Returns false when `id` is absent.
    pub fn update<F>(&self, id: i64, patch: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                patch(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Remove `id`, returning the removed record
    pub fn remove(&self, id: i64) -> Option<V> {
        self.entries.remove(&id).map(|(_, value)| value)
    }

    /// Clone of the record cached under `id`
    pub fn get(&self, id: i64) -> Option<V> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Clone every record matching `predicate`
    pub fn collect_where<P>(&self, predicate: P) -> Vec<V>
    where
        P: Fn(&V) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Clone every record
    pub fn snapshot(&self) -> Vec<V> {
        self.collect_where(|_| true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for EntityStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

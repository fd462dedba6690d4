//! Compute-once caches

use std::hash::Hash;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// A concurrent map whose values are computed at most once per key.
///
/// The first caller for a key runs the initializer while holding the key's
/// shard, so concurrent first accesses wait instead of computing twice. The
/// initializer must not touch the same cache.
#[derive(Debug)]
pub struct Memoized<K, V>
where
    K: Eq + Hash,
{
    cells: DashMap<K, V>,
}

impl<K, V> Memoized<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Return the cached value for `key`, computing it with `init` on first use.
    ///
    /// Failed initializations are not cached.
    pub fn get_or_try_init<E>(&self, key: &K, init: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.cells.get(key) {
            return Ok(value.clone());
        }
        match self.cells.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let value = init()?;
                entry.insert(value.clone());
                Ok(value)
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.get(key).map(|value| value.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.cells.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&self) {
        self.cells.clear();
    }
}

impl<K, V> Default for Memoized<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

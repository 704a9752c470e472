use std::{collections::HashMap, hash::Hash};

/// Append-only result cache.
///
/// Keys are content addressed, so an entry can never go stale: once written
/// it is neither overwritten nor evicted for the lifetime of the cache.
#[derive(Debug)]
pub struct Cache<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Cache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Records `value` for `key` unless an entry already exists.
    ///
    /// Returns `false` and keeps the original value if `key` was present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

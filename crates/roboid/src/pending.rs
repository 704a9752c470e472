//! Bookkeeping for callers waiting on an in-flight fingerprint.
//!
//! The [`PendingTable`] maps a key to every caller waiting for its result. The
//! first caller opens the entry; later callers join it. Completion removes the
//! entry and notifies every waiter in one step, so a caller can never join an
//! entry that has already been resolved.

use std::{collections::HashMap, hash::Hash};
use tokio::sync::oneshot;

/// Completion handle for a single caller.
pub type Waiter<T> = oneshot::Sender<T>;

/// How a caller was admitted into the [`PendingTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// No entry existed; the caller must start the work.
    Opened,
    /// The caller joined an entry whose work is already underway.
    Joined,
}

#[derive(Debug)]
pub struct PendingTable<K, T> {
    waiters: HashMap<K, Vec<Waiter<T>>>,
}

impl<K, T> Default for PendingTable<K, T> {
    fn default() -> Self {
        Self {
            waiters: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, T: Clone> PendingTable<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `waiter` under `key`, opening the entry if needed.
    pub fn join(&mut self, key: K, waiter: Waiter<T>) -> Admission {
        match self.waiters.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().push(waiter);
                Admission::Joined
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(vec![waiter]);
                Admission::Opened
            }
        }
    }

    /// Number of callers waiting on `key`.
    #[cfg(test)]
    pub fn waiting(&self, key: &K) -> usize {
        self.waiters.get(key).map_or(0, Vec::len)
    }

    /// Removes the entry for `key` and sends `value` to each of its waiters.
    ///
    /// Waiters that stopped listening are skipped. Returns how many waiters
    /// were removed.
    pub fn resolve(&mut self, key: &K, value: T) -> usize {
        let Some(waiters) = self.waiters.remove(key) else {
            return 0;
        };
        let count = waiters.len();
        fan_out(waiters, value);
        count
    }

    /// Removes and returns every entry, leaving the table empty.
    pub fn drain(&mut self) -> impl Iterator<Item = (K, Vec<Waiter<T>>)> + '_ {
        self.waiters.drain()
    }
}

/// Sends a clone of `value` to every waiter.
pub fn fan_out<T: Clone>(mut waiters: Vec<Waiter<T>>, value: T) {
    let Some(last) = waiters.pop() else {
        return;
    };
    for waiter in waiters {
        let _ = waiter.send(value.clone());
    }
    // Last waiter takes ownership.
    let _ = last.send(value);
}

use portable_atomic::{AtomicU64, Ordering};

/// Counters maintained by the dispatcher.
///
/// Only the dispatcher writes; readers take a [`StatsSnapshot`].
#[derive(Debug, Default)]
pub(crate) struct Stats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    cache_entries: AtomicU64,
}

/// Point-in-time view of a client's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests admitted, including cache hits.
    pub requests: u64,
    /// Requests answered straight from the cache.
    pub cache_hits: u64,
    /// Requests that joined an in-flight fingerprint.
    pub coalesced: u64,
    /// Tasks handed to a worker.
    pub dispatched: u64,
    /// Tasks that completed with an error.
    pub failed: u64,
    /// Entries currently cached.
    pub cache_entries: u64,
}

impl Stats {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.store(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cache_entries: self.cache_entries.load(Ordering::Relaxed),
        }
    }
}

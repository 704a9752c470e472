//! Controllable engine shared by the crate's unit tests.

use crate::{EngineError, RenderEngine, Size};
use bytes::Bytes;
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

/// Engine whose invocations can be held open, failed or panicked per seed.
///
/// Every invocation reports its seed on the `started` channel returned by
/// [`GatedEngine::blocking`] before it waits for [`GatedEngine::release`].
pub(crate) struct GatedEngine {
    blocking: bool,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    started: mpsc::UnboundedSender<String>,
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
}

impl GatedEngine {
    fn build(blocking: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (started, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            blocking,
            gates: Mutex::new(HashMap::new()),
            started,
            calls: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
        });
        (engine, rx)
    }

    /// Invocations wait for [`GatedEngine::release`].
    pub(crate) fn blocking() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        Self::build(true)
    }

    /// Invocations complete immediately.
    pub(crate) fn instant() -> Arc<Self> {
        Self::build(false).0
    }

    pub(crate) fn release(&self, seed: &str) {
        self.gate(seed).notify_one();
    }

    pub(crate) fn fail_next(&self, seed: &str) {
        self.failing.lock().insert(seed.to_string());
    }

    pub(crate) fn panic_on(&self, seed: &str) {
        self.panicking.lock().insert(seed.to_string());
    }

    pub(crate) fn calls(&self, seed: &str) -> usize {
        self.calls.lock().get(seed).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn gate(&self, seed: &str) -> Arc<Notify> {
        Arc::clone(self.gates.lock().entry(seed.to_string()).or_default())
    }

    async fn enter(&self, seed: &str) -> Result<(), EngineError> {
        *self.calls.lock().entry(seed.to_string()).or_default() += 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _ = self.started.send(seed.to_string());

        if self.blocking {
            let gate = self.gate(seed);
            gate.notified().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.lock().contains(seed) {
            panic!("engine blew up on {seed}");
        }
        if self.failing.lock().remove(seed) {
            return Err(EngineError::new(format!("cannot render {seed}")));
        }
        Ok(())
    }
}

impl RenderEngine for GatedEngine {
    async fn render(&self, seed: &str, size: Size) -> Result<Bytes, EngineError> {
        self.enter(seed).await?;
        Ok(Bytes::from(format!("{seed}@{}", size.pixels())))
    }

    async fn name(&self, seed: &str) -> Result<String, EngineError> {
        self.enter(seed).await?;
        Ok(format!("Robot {seed}"))
    }
}

/// Yields to the runtime until `cond` holds.
pub(crate) async fn settle(cond: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never settled");
}

use tokio::sync::broadcast;

/// Capacity of the notification channel. Slow subscribers lag rather than
/// block publishers.
const EVENT_CAPACITY: usize = 64;

/// Best-effort notifications for UI-level status (connectivity, readiness).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A bridge message could not be delivered to, or understood from, the
    /// host.
    TransportFailure { reason: String },
    /// The rendering engine failed to become ready, or took too long.
    ReadinessFailed { reason: String },
    /// The rendering engine became ready and the worker pool is running.
    EngineReady,
}

/// Cloneable handle to a process-wide notification channel.
///
/// Publishing never fails: events without subscribers are dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

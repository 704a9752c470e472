use core::time::Duration;

/// Default number of workers. Each worker can hold an expensive engine
/// invocation, so the pool stays small.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Default time granted to in-flight tasks, and to each worker's
/// acknowledgement, during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Tuning for the local worker-pool client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers created once the engine is ready.
    pub pool_size: usize,
    /// Upper bound on the engine's initialization. `None` waits forever.
    pub readiness_timeout: Option<Duration>,
    /// Grace period for in-flight work during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            readiness_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

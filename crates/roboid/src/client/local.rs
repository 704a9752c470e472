use super::RoboidentitiesClient;
use crate::{
    Artifact, EventBus, Job, PoolConfig, ReadinessGate, RenderEngine, Size,
    dispatcher::{Dispatcher, DispatcherHandle},
    stats::StatsSnapshot,
};
use core::future::Future;
use std::sync::Arc;

/// Client generating identities in-process on a bounded worker pool.
///
/// Cloning is cheap; every clone talks to the same dispatcher, cache and
/// pool.
#[derive(Clone)]
pub struct LocalClient {
    dispatcher: DispatcherHandle,
    events: EventBus,
}

impl LocalClient {
    /// Starts a dispatcher for `engine`, gated on the engine's own
    /// initialization.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<E: RenderEngine>(engine: E, config: PoolConfig) -> Self {
        Self::spawn_with_events(engine, config, EventBus::new())
    }

    /// Like [`LocalClient::spawn`], publishing notifications on `events`.
    pub fn spawn_with_events<E: RenderEngine>(
        engine: E,
        config: PoolConfig,
        events: EventBus,
    ) -> Self {
        let engine = Arc::new(engine);
        let gate = ReadinessGate::watch_engine(Arc::clone(&engine), config.readiness_timeout);
        Self::start(engine, config, gate, events)
    }

    /// Starts a dispatcher whose workers wait for an externally driven
    /// `gate`, see [`ReadinessGate::manual`].
    pub fn with_gate<E: RenderEngine>(
        engine: E,
        config: PoolConfig,
        gate: ReadinessGate,
        events: EventBus,
    ) -> Self {
        Self::start(Arc::new(engine), config, gate, events)
    }

    fn start<E: RenderEngine>(
        engine: Arc<E>,
        config: PoolConfig,
        gate: ReadinessGate,
        events: EventBus,
    ) -> Self {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting local client with {} workers", config.pool_size);

        let dispatcher = Dispatcher::spawn(engine, config, gate, events.clone());
        Self { dispatcher, events }
    }

    /// Generates the artifact for `job`.
    ///
    /// The request is admitted immediately; the returned future only waits
    /// for its outcome.
    pub fn generate(&self, job: Job) -> impl Future<Output = crate::Result<Artifact>> + Send + 'static {
        self.dispatcher.request(job)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Rejects queued requests, waits for in-flight ones within the
    /// configured grace period and stops the workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`](crate::Error::ServiceShutdown) if
    /// the client was already stopped.
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.dispatcher.shutdown().await
    }
}

impl RoboidentitiesClient for LocalClient {
    fn generate_image(
        &self,
        seed: &str,
        size: Size,
    ) -> impl Future<Output = crate::Result<String>> + Send {
        let outcome = self.generate(Job::image(seed, size));
        async move { Ok(outcome.await?.to_display()) }
    }

    fn generate_name(&self, seed: &str) -> impl Future<Output = crate::Result<String>> + Send {
        let outcome = self.generate(Job::name(seed));
        async move { Ok(outcome.await?.to_display()) }
    }
}

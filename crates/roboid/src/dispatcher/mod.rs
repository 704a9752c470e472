//! Request admission, coalescing, caching and dispatch.
//!
//! The [`Dispatcher`] is the single owner of the result cache, the
//! pending-request table, the work queue and the workers' busy flags. It runs
//! as one Tokio task and is driven by three inputs:
//!
//! - requests from any number of [`DispatcherHandle`]s,
//! - completions reported by workers,
//! - readiness transitions of the rendering engine.
//!
//! Because every mutation happens on that one task, no locking is needed and
//! a caller can never join a pending entry after it has been resolved.
//!
//! ## Request flow
//!
//! 1. Cache hit: answered immediately.
//! 2. Fingerprint already pending: the caller joins the existing waiters.
//! 3. Otherwise a task is queued and the queue is drained into idle workers.
//!
//! On completion the worker is released, successes are cached, every waiter
//! of the fingerprint receives the outcome, and the queue is drained again.
//! Failures are never cached.

mod queue;
#[cfg(test)]
mod tests;

use crate::{
    Artifact, Error, EventBus, Fingerprint, Job, PoolConfig, RenderEngine, Task,
    cache::Cache,
    events::Event,
    pending::{Admission, PendingTable, Waiter},
    pool::{manager::WorkerPool, worker::Completion},
    readiness::{Readiness, ReadinessGate},
    stats::{Stats, StatsSnapshot},
};
use core::{future::Future, time::Duration};
use queue::WorkQueue;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};

type Outcome = crate::Result<Artifact>;

/// Roughly 30 years; stands in for deadlines that do not fit in an
/// [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `timeout` from now, saturating to [`FAR_FUTURE`].
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

enum Command {
    Request { job: Job, reply: Waiter<Outcome> },
    Shutdown { response: oneshot::Sender<()> },
}

/// Cloneable entry point to a running [`Dispatcher`].
#[derive(Clone)]
pub(crate) struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Command>,
    stats: Arc<Stats>,
}

impl DispatcherHandle {
    /// Submits `job` and returns a future resolving to its result.
    ///
    /// Admission happens when this method is called, not when the future is
    /// first polled, so requests are admitted in call order.
    pub(crate) fn request(&self, job: Job) -> impl Future<Output = Outcome> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Command::Request { job, reply })
            .map_err(|_| Error::ServiceShutdown);

        async move {
            sent?;
            // The dispatcher drops unanswered requests only while stopping.
            rx.await.map_err(|_| Error::ServiceShutdown)?
        }
    }

    /// Stops the dispatcher and its workers, see [`Dispatcher::run`].
    pub(crate) async fn shutdown(&self) -> crate::Result<()> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { response })
            .map_err(|_| Error::ServiceShutdown)?;
        rx.await.map_err(|_| Error::ChannelError {
            context: "Dispatcher stopped before acknowledging shutdown".to_string(),
        })
    }

    pub(crate) fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

pub(crate) struct Dispatcher<E> {
    engine: Arc<E>,
    config: PoolConfig,
    cache: Cache<Fingerprint, Artifact>,
    pending: PendingTable<Fingerprint, Outcome>,
    queue: WorkQueue,
    pool: Option<WorkerPool>,
    readiness: Readiness,
    completions_tx: mpsc::UnboundedSender<Completion>,
    stats: Arc<Stats>,
    events: EventBus,
    shutting_down: bool,
}

impl<E: RenderEngine> Dispatcher<E> {
    /// Spawns a dispatcher task and returns a handle to it.
    ///
    /// Workers are created only once `gate` reports
    /// [`Readiness::Ready`]. Must be called from within a Tokio runtime.
    pub(crate) fn spawn(
        engine: Arc<E>,
        config: PoolConfig,
        gate: ReadinessGate,
        events: EventBus,
    ) -> DispatcherHandle {
        let (tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let stats = Arc::new(Stats::default());

        let dispatcher = Self {
            engine,
            config,
            cache: Cache::new(),
            pending: PendingTable::new(),
            queue: WorkQueue::default(),
            pool: None,
            readiness: Readiness::Pending,
            completions_tx,
            stats: Arc::clone(&stats),
            events,
            shutting_down: false,
        };
        tokio::spawn(dispatcher.run(commands, completions, gate.into_receiver()));

        DispatcherHandle { tx, stats }
    }

    /// Control loop.
    ///
    /// Runs until a shutdown command arrives or every handle is dropped. In
    /// both cases queued tasks are rejected with [`Error::ServiceShutdown`],
    /// in-flight tasks get up to `shutdown_timeout` to finish, and the workers
    /// are stopped.
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut readiness: watch::Receiver<Readiness>,
    ) {
        let initial = readiness.borrow_and_update().clone();
        self.apply_readiness(initial);

        let mut gate_live = true;
        let mut acks = Vec::new();
        let deadline = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(deadline);

        loop {
            if self.shutting_down && self.in_flight() == 0 {
                break;
            }

            let stopping = self.shutting_down;
            tokio::select! {
                // Completions first, so a freed worker is reused before new
                // work is admitted.
                biased;
                Some(completion) = completions.recv() => self.complete(completion),
                changed = readiness.changed(), if gate_live => match changed {
                    Ok(()) => {
                        let state = readiness.borrow_and_update().clone();
                        self.apply_readiness(state);
                    }
                    // The gate can no longer change; keep the last state.
                    Err(_) => gate_live = false,
                },
                command = commands.recv(), if !stopping => match command {
                    Some(Command::Request { job, reply }) => self.admit(job, reply),
                    Some(Command::Shutdown { response }) => {
                        acks.push(response);
                        self.begin_shutdown();
                    }
                    None => self.begin_shutdown(),
                },
                () = &mut deadline, if stopping => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Shutdown grace period elapsed with {} tasks in flight",
                        self.in_flight()
                    );
                    break;
                }
            }

            if !stopping && self.shutting_down {
                deadline
                    .as_mut()
                    .reset(deadline_after(self.config.shutdown_timeout));
            }
        }

        for (_fingerprint, waiters) in self.pending.drain() {
            crate::pending::fan_out(waiters, Err(Error::ServiceShutdown));
        }

        if let Some(pool) = self.pool.take() {
            pool.shutdown(self.config.shutdown_timeout).await;
        }

        commands.close();
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Request { reply, .. } => {
                    let _ = reply.send(Err(Error::ServiceShutdown));
                }
                Command::Shutdown { response } => acks.push(response),
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Dispatcher stopped");
    }

    fn admit(&mut self, job: Job, reply: Waiter<Outcome>) {
        self.stats.record_request();
        let fingerprint = job.fingerprint();

        if let Some(artifact) = self.cache.get(&fingerprint) {
            #[cfg(feature = "tracing")]
            tracing::trace!("Cache hit for {fingerprint}");
            self.stats.record_cache_hit();
            let _ = reply.send(Ok(artifact.clone()));
            return;
        }

        if let Readiness::Failed(err) = &self.readiness {
            let _ = reply.send(Err(err.clone()));
            return;
        }

        match self.pending.join(fingerprint.clone(), reply) {
            Admission::Joined => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Coalesced request for {fingerprint}");
                self.stats.record_coalesced();
            }
            Admission::Opened => self.dispatch(Task { fingerprint, job }),
        }
    }

    /// Queues `task` behind any earlier backlog and drains the queue into idle
    /// workers.
    fn dispatch(&mut self, task: Task) {
        self.queue.push(task);
        self.drain();

        #[cfg(feature = "tracing")]
        tracing::trace!(
            "{} tasks queued, {} workers busy",
            self.queue.len(),
            self.in_flight()
        );
    }

    /// Assigns queued tasks to idle workers, oldest first.
    ///
    /// Does nothing until the gate is open and the pool exists.
    fn drain(&mut self) {
        if self.readiness != Readiness::Ready {
            return;
        }
        let Some(pool) = self.pool.as_mut() else {
            return;
        };

        while let Some(worker_id) = pool.idle_worker() {
            let Some(task) = self.queue.pop() else {
                break;
            };

            #[cfg(feature = "tracing")]
            tracing::debug!("Dispatching {} to worker {worker_id}", task.fingerprint);

            match pool.assign(worker_id, task) {
                Ok(()) => self.stats.record_dispatched(),
                Err((task, err)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Failed to dispatch {}: {}", task.fingerprint, err);
                    self.stats.record_failed();
                    self.pending.resolve(&task.fingerprint, Err(err));
                }
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            worker_id,
            fingerprint,
            result,
        } = completion;

        if let Some(pool) = self.pool.as_mut() {
            pool.release(worker_id);
        }

        match result {
            Ok(artifact) => {
                self.cache.insert(fingerprint.clone(), artifact.clone());
                self.stats.set_cache_entries(self.cache.len());
                let _waiters = self.pending.resolve(&fingerprint, Ok(artifact));
                #[cfg(feature = "tracing")]
                tracing::debug!("Completed {fingerprint} for {_waiters} callers");
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Generation failed for {fingerprint}: {err}");
                self.stats.record_failed();
                self.pending.resolve(&fingerprint, Err(err));
            }
        }

        self.drain();
    }

    fn apply_readiness(&mut self, state: Readiness) {
        match state {
            Readiness::Pending => self.readiness = Readiness::Pending,
            Readiness::Ready => {
                self.readiness = Readiness::Ready;
                if self.pool.is_none() {
                    // A pool of zero workers could never drain the queue.
                    let size = self.config.pool_size.max(1);
                    self.pool = Some(WorkerPool::spawn(
                        size,
                        Arc::clone(&self.engine),
                        &self.completions_tx,
                    ));
                    self.events.publish(Event::EngineReady);
                }
                self.drain();
            }
            Readiness::Failed(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    "Engine readiness failed, rejecting {} queued tasks: {}",
                    self.queue.len(),
                    err
                );
                self.events.publish(Event::ReadinessFailed {
                    reason: err.to_string(),
                });
                while let Some(task) = self.queue.pop() {
                    self.pending.resolve(&task.fingerprint, Err(err.clone()));
                }
                self.readiness = Readiness::Failed(err);
            }
        }
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Shutting down dispatcher ({} queued, {} in flight)",
            self.queue.len(),
            self.in_flight()
        );

        self.shutting_down = true;
        while let Some(task) = self.queue.pop() {
            self.pending
                .resolve(&task.fingerprint, Err(Error::ServiceShutdown));
        }
    }

    fn in_flight(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::busy)
    }
}

//! Fixed-size pool of rendering workers.
//!
//! This module defines the [`WorkerPool`], which owns one bounded channel per
//! worker task together with that worker's `busy` flag. The pool never routes
//! work on its own: the dispatcher asks for an idle worker, assigns exactly one
//! task to it and releases it once the matching completion arrives. A worker
//! therefore has at most one in-flight task and its channel never holds more
//! than that task.

use super::worker::{Completion, WorkRequest, worker_loop};
use crate::{Error, RenderEngine, Task};
use core::time::Duration;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};

struct WorkerSlot {
    tx: mpsc::Sender<WorkRequest>,
    busy: bool,
}

pub(crate) struct WorkerPool {
    workers: Vec<WorkerSlot>,
}

impl WorkerPool {
    /// Spawns `size` worker tasks sharing `engine`.
    ///
    /// Each worker gets a channel of capacity 1: the dispatcher only sends to
    /// idle workers, so a slot is always free when it does.
    pub(crate) fn spawn<E: RenderEngine>(
        size: usize,
        engine: Arc<E>,
        completions: &mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let workers = (0..size)
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(1);
                tokio::spawn(worker_loop(
                    worker_id,
                    rx,
                    Arc::clone(&engine),
                    completions.clone(),
                ));
                WorkerSlot { tx, busy: false }
            })
            .collect();

        #[cfg(feature = "tracing")]
        tracing::info!("Started worker pool with {size} workers");

        Self { workers }
    }

    /// Number of workers currently running a task.
    pub(crate) fn busy(&self) -> usize {
        self.workers.iter().filter(|w| w.busy).count()
    }

    pub(crate) fn idle_worker(&self) -> Option<usize> {
        self.workers.iter().position(|w| !w.busy)
    }

    /// Hands `task` to worker `worker_id` and marks it busy.
    ///
    /// # Errors
    ///
    /// Gives the task back if the worker cannot accept it (its channel is
    /// closed or, which would be a scheduling bug, already occupied).
    pub(crate) fn assign(&mut self, worker_id: usize, task: Task) -> Result<(), (Task, Error)> {
        let slot = &mut self.workers[worker_id];
        debug_assert!(!slot.busy, "worker {worker_id} is already busy");

        match slot.tx.try_send(WorkRequest::Render { task: task.clone() }) {
            Ok(()) => {
                slot.busy = true;
                Ok(())
            }
            Err(e) => {
                let context = match e {
                    mpsc::error::TrySendError::Full(_) => {
                        format!("Worker {worker_id} already has a task")
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        format!("Worker {worker_id} channel closed")
                    }
                };
                Err((task, Error::ChannelError { context }))
            }
        }
    }

    /// Marks worker `worker_id` idle again.
    pub(crate) fn release(&mut self, worker_id: usize) {
        if let Some(slot) = self.workers.get_mut(worker_id) {
            slot.busy = false;
        }
    }

    /// Stops every worker.
    ///
    /// Sends a [`WorkRequest::Shutdown`] to each worker and waits up to
    /// `ack_timeout` per worker for its acknowledgement. A worker still busy
    /// with a task acknowledges once that task finishes.
    pub(crate) async fn shutdown(self, ack_timeout: Duration) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");

        let mut shutdown_handles = Vec::with_capacity(self.workers.len());
        for (_i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.tx.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {_i}: {_e}");
            } else {
                shutdown_handles.push((_i, rx));
            }
        }

        let acks = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(ack_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(acks).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");
    }
}

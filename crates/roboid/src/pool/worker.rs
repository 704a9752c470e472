use crate::{Artifact, Error, Fingerprint, ImageData, Job, RenderEngine, Task};
use core::panic::AssertUnwindSafe;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Messages accepted by a worker task.
pub(crate) enum WorkRequest {
    /// Run the rendering engine for a single task.
    Render { task: Task },
    /// Stop the worker and acknowledge on `response`.
    Shutdown { response: oneshot::Sender<()> },
}

/// Outcome of a [`WorkRequest::Render`], reported back to the dispatcher.
#[derive(Debug)]
pub(crate) struct Completion {
    pub worker_id: usize,
    pub fingerprint: Fingerprint,
    pub result: crate::Result<Artifact>,
}

/// Worker task running one engine invocation at a time.
///
/// The worker listens on its own channel, renders each task it receives and
/// reports the outcome on `completions`. It runs until it receives
/// [`WorkRequest::Shutdown`] or its channel closes.
///
/// A failing or panicking engine invocation is reported as an error
/// completion; the worker itself keeps serving.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker in the pool (used for routing the
///   completion and for logs).
/// - `rx`: Receiver through which [`WorkRequest`]s arrive.
/// - `engine`: Shared rendering engine.
/// - `completions`: Channel back to the dispatcher.
pub(crate) async fn worker_loop<E: RenderEngine>(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    engine: Arc<E>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Render { task } => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Worker {worker_id} rendering {}", task.fingerprint);

                let result = AssertUnwindSafe(execute(engine.as_ref(), &task.job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        #[cfg(feature = "tracing")]
                        tracing::error!("Worker {worker_id} caught engine panic on {}", task.fingerprint);
                        Err(Error::EnginePanicked {
                            fingerprint: task.fingerprint.to_string(),
                        })
                    });

                let completion = Completion {
                    worker_id,
                    fingerprint: task.fingerprint,
                    result,
                };
                if completions.send(completion).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} dropping result, dispatcher is gone");
                }
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

async fn execute<E: RenderEngine>(engine: &E, job: &Job) -> crate::Result<Artifact> {
    match job {
        Job::Image { seed, size } => {
            let png = engine.render(seed, *size).await?;
            Ok(Artifact::Image(ImageData::from_png(png)))
        }
        Job::Name { seed } => {
            let name = engine.name(seed).await?;
            Ok(Artifact::Name(name.into()))
        }
    }
}

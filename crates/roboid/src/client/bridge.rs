//! Client delegating generation to a host across a message bridge.
//!
//! The client keeps its own cache and pending table, so repeated and
//! concurrent identical requests cost at most one bridge round-trip. Each
//! round-trip carries a fresh [`CorrelationId`]; responses are routed back by
//! that id alone and may arrive in any order.
//!
//! ## Structure
//!
//! - [`Correlation`] - how correlation ids are minted (counter or UUID).
//! - [`BridgeClient`] - admission, transport and response routing.

use super::RoboidentitiesClient;
use crate::{
    Artifact, Error, EventBus, Fingerprint, ImageData, Job, Size,
    bridge::{BridgeRequest, BridgeResponse, BridgeTransport, CorrelationId},
    cache::Cache,
    events::Event,
    pending::{Admission, PendingTable},
};
use core::future::Future;
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

type Outcome = crate::Result<Artifact>;

/// How a [`BridgeClient`] mints correlation ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Correlation {
    /// Monotonic integers, starting at 1.
    Counter,
    /// Random version-4 UUID strings.
    Uuid,
}

struct IdSource {
    strategy: Correlation,
    counter: AtomicU64,
}

impl IdSource {
    fn next(&self) -> CorrelationId {
        match self.strategy {
            Correlation::Counter => {
                CorrelationId::Counter(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
            }
            Correlation::Uuid => CorrelationId::Uuid(uuid::Uuid::new_v4().to_string()),
        }
    }
}

#[derive(Default)]
struct BridgeState {
    cache: Cache<Fingerprint, Artifact>,
    pending: PendingTable<Fingerprint, Outcome>,
    /// Requests posted to the host and not yet answered.
    outstanding: HashMap<CorrelationId, Fingerprint>,
    /// Set once the response channel has closed; nothing posted afterwards
    /// could ever be answered.
    disconnected: bool,
}

struct Inner<T> {
    transport: T,
    ids: IdSource,
    state: Mutex<BridgeState>,
    events: EventBus,
}

enum Admitted {
    Done(Outcome),
    Waiting(oneshot::Receiver<Outcome>),
}

/// Client forwarding generation requests over a [`BridgeTransport`].
///
/// Cloning is cheap; clones share the cache and the pending requests.
pub struct BridgeClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BridgeClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BridgeTransport> BridgeClient<T> {
    pub fn new(transport: T, correlation: Correlation, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                ids: IdSource {
                    strategy: correlation,
                    counter: AtomicU64::new(0),
                },
                state: Mutex::new(BridgeState::default()),
                events,
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Number of requests posted and not yet answered.
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding.len()
    }

    /// Generates the artifact for `job` through the host.
    ///
    /// The request is admitted, and posted if needed, immediately; the
    /// returned future only waits for its outcome.
    pub fn generate(&self, job: Job) -> impl Future<Output = Outcome> + Send + 'static {
        let admitted = self.admit(job);
        async move {
            match admitted {
                Admitted::Done(outcome) => outcome,
                Admitted::Waiting(rx) => rx.await.map_err(|_| Error::ChannelError {
                    context: "Bridge client dropped a pending request".to_string(),
                })?,
            }
        }
    }

    fn admit(&self, job: Job) -> Admitted {
        let fingerprint = job.fingerprint();
        let (reply, rx) = oneshot::channel();

        let request = {
            let mut state = self.inner.state.lock();
            if let Some(artifact) = state.cache.get(&fingerprint) {
                return Admitted::Done(Ok(artifact.clone()));
            }
            if state.disconnected {
                drop(state);
                let err = disconnected_error();
                self.inner.events.publish(Event::TransportFailure {
                    reason: err.to_string(),
                });
                return Admitted::Done(Err(err));
            }
            if state.pending.join(fingerprint.clone(), reply) == Admission::Joined {
                return Admitted::Waiting(rx);
            }

            let id = self.inner.ids.next();
            state.outstanding.insert(id.clone(), fingerprint);
            BridgeRequest::for_job(id, &job)
        };

        #[cfg(feature = "tracing")]
        tracing::trace!("Posting bridge request {} ({})", request.id, request.detail);

        if let Err(e) = self.inner.transport.post(&request) {
            self.abandon(&request.id, e);
        }
        Admitted::Waiting(rx)
    }

    /// Fails the request `id` with `err` and tells subscribers the bridge is
    /// unhealthy.
    fn abandon(&self, id: &CorrelationId, err: Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!("Bridge request {id} failed: {err}");

        {
            let mut state = self.inner.state.lock();
            if let Some(fingerprint) = state.outstanding.remove(id) {
                state.pending.resolve(&fingerprint, Err(err.clone()));
            }
        }
        self.inner.events.publish(Event::TransportFailure {
            reason: err.to_string(),
        });
    }

    /// Routes a host response to the callers waiting on it.
    ///
    /// Responses for unknown or already answered ids are ignored.
    pub fn resolve(&self, response: BridgeResponse) {
        let mut state = self.inner.state.lock();
        let Some(fingerprint) = state.outstanding.remove(response.id()) else {
            #[cfg(feature = "tracing")]
            tracing::debug!("Ignoring response for unknown request {}", response.id());
            return;
        };

        let outcome = match response {
            BridgeResponse::Resolved { detail, .. } => match &fingerprint {
                Fingerprint::Image { .. } => ImageData::from_base64(&detail).map(Artifact::Image),
                Fingerprint::Name { .. } => Ok(Artifact::Name(detail.into())),
            },
            BridgeResponse::Rejected { reason, .. } => Err(Error::Remote { reason }),
        };

        if let Ok(artifact) = &outcome {
            state.cache.insert(fingerprint.clone(), artifact.clone());
        }
        state.pending.resolve(&fingerprint, outcome);
    }

    /// Decodes and routes one response frame.
    ///
    /// Undecodable frames are reported as [`Event::TransportFailure`].
    pub fn handle_frame(&self, frame: &str) {
        match BridgeResponse::from_frame(frame) {
            Ok(response) => self.resolve(response),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Dropping undecodable bridge response: {_e}");
                self.inner.events.publish(Event::TransportFailure {
                    reason: format!("undecodable response frame: {_e}"),
                });
            }
        }
    }

    /// Spawns a task routing every frame from `frames`.
    ///
    /// When `frames` closes, requests still awaiting a response are failed
    /// with [`Error::Transport`]. Must be called from within a Tokio runtime.
    pub fn listen(&self, mut frames: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                client.handle_frame(&frame);
            }
            client.disconnect();
        })
    }

    fn disconnect(&self) {
        let err = disconnected_error();

        let abandoned = {
            let mut state = self.inner.state.lock();
            state.disconnected = true;
            let lost: Vec<_> = state.outstanding.drain().map(|(_, fp)| fp).collect();
            for fingerprint in &lost {
                state.pending.resolve(fingerprint, Err(err.clone()));
            }
            lost.len()
        };

        if abandoned > 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!("Bridge closed with {abandoned} requests outstanding");
            self.inner.events.publish(Event::TransportFailure {
                reason: err.to_string(),
            });
        }
    }
}

fn disconnected_error() -> Error {
    Error::Transport {
        reason: "bridge response channel closed".to_string(),
    }
}

impl<T: BridgeTransport> RoboidentitiesClient for BridgeClient<T> {
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

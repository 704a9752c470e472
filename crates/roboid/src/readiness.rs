//! One-time readiness signalling for the rendering engine.
//!
//! The dispatcher does not create workers until the [`ReadinessGate`] reports
//! [`Readiness::Ready`]. Requests arriving earlier are queued. The gate is
//! either driven by the engine's own [`RenderEngine::ready`] future
//! ([`ReadinessGate::watch_engine`]) or opened by hand through a
//! [`ReadySignal`] ([`ReadinessGate::manual`]).
//!
//! A bounded wait can be configured. When it elapses, the gate reports
//! [`Readiness::Failed`] with [`Error::ReadinessTimeout`] but keeps observing
//! the engine, so a late initialization still opens it.

use crate::{Error, RenderEngine};
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Initialization is still running.
    Pending,
    /// The engine can serve requests.
    Ready,
    /// Initialization failed or exceeded its bound.
    Failed(Error),
}

/// Observer side of the gate, consumed by the dispatcher.
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    rx: watch::Receiver<Readiness>,
}

/// Producer side of a manually driven gate.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<Readiness>,
}

impl ReadySignal {
    pub fn open(&self) {
        self.tx.send_replace(Readiness::Ready);
    }

    pub fn fail(&self, err: Error) {
        self.tx.send_replace(Readiness::Failed(err));
    }
}

impl ReadinessGate {
    /// A gate that only opens through the returned [`ReadySignal`].
    pub fn manual() -> (Self, ReadySignal) {
        let (tx, rx) = watch::channel(Readiness::Pending);
        (Self { rx }, ReadySignal { tx })
    }

    /// A gate that is open from the start.
    pub fn opened() -> Self {
        let (_tx, rx) = watch::channel(Readiness::Ready);
        Self { rx }
    }

    /// A gate driven by `engine.ready()`, optionally bounded by `timeout`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_engine<E: RenderEngine>(engine: Arc<E>, timeout: Option<Duration>) -> Self {
        let (gate, signal) = Self::manual();
        tokio::spawn(async move {
            let ready = engine.ready();
            tokio::pin!(ready);

            if let Some(limit) = timeout {
                tokio::select! {
                    res = &mut ready => return signal.publish(res),
                    () = tokio::time::sleep(limit) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Engine not ready after {:?}, failing queued requests", limit);
                        signal.fail(Error::ReadinessTimeout { waited: limit });
                    }
                }
            }

            let res = ready.await;
            signal.publish(res);
        });
        gate
    }

    pub fn state(&self) -> Readiness {
        self.rx.borrow().clone()
    }

    pub(crate) fn into_receiver(self) -> watch::Receiver<Readiness> {
        self.rx
    }

    /// Waits until the gate leaves [`Readiness::Pending`].
    ///
    /// # Errors
    ///
    /// Returns the failure reported by the gate, or a channel error if the
    /// producer went away without settling it.
    pub async fn wait(&mut self) -> crate::Result<()> {
        let state = self
            .rx
            .wait_for(|state| *state != Readiness::Pending)
            .await
            .map_err(|_| Error::ChannelError {
                context: "Readiness signal dropped before settling".to_string(),
            })?;
        match &*state {
            Readiness::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl ReadySignal {
    fn publish(&self, res: Result<(), crate::EngineError>) {
        match res {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!("Engine ready");
                self.open();
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Engine failed to initialize: {}", _e);
                self.fail(Error::EngineNotReady {
                    reason: _e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineError, Size};
    use bytes::Bytes;
    use tokio::sync::Notify;

    struct SlowStart {
        started: Arc<Notify>,
        outcome: Result<(), EngineError>,
    }

    impl RenderEngine for SlowStart {
        async fn ready(&self) -> Result<(), EngineError> {
            self.started.notified().await;
            self.outcome.clone()
        }

        async fn render(&self, _seed: &str, _size: Size) -> Result<Bytes, EngineError> {
            Ok(Bytes::new())
        }

        async fn name(&self, seed: &str) -> Result<String, EngineError> {
            Ok(seed.to_string())
        }
    }

    fn slow_start(outcome: Result<(), EngineError>) -> (Arc<SlowStart>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let engine = Arc::new(SlowStart {
            started: Arc::clone(&started),
            outcome,
        });
        (engine, started)
    }

    #[tokio::test]
    async fn manual_gate_opens_on_signal() {
        let (mut gate, signal) = ReadinessGate::manual();
        assert_eq!(gate.state(), Readiness::Pending);
        signal.open();
        gate.wait().await.unwrap();
        assert_eq!(gate.state(), Readiness::Ready);
    }

    #[tokio::test]
    async fn engine_failure_is_reported() {
        let (engine, started) = slow_start(Err(EngineError::new("missing assets")));
        let mut gate = ReadinessGate::watch_engine(engine, None);
        started.notify_one();
        let err = gate.wait().await.unwrap_err();
        assert_eq!(
            err,
            Error::EngineNotReady {
                reason: "missing assets".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_escalates_then_late_ready_recovers() {
        let (engine, started) = slow_start(Ok(()));
        let mut gate = ReadinessGate::watch_engine(engine, Some(Duration::from_secs(5)));

        let err = gate.wait().await.unwrap_err();
        assert_eq!(
            err,
            Error::ReadinessTimeout {
                waited: Duration::from_secs(5)
            }
        );

        started.notify_one();
        let mut rx = gate.clone().into_receiver();
        rx.wait_for(|state| *state == Readiness::Ready).await.unwrap();
        assert_eq!(gate.state(), Readiness::Ready);
    }

    #[tokio::test]
    async fn dropped_signal_is_a_channel_error() {
        let (mut gate, signal) = ReadinessGate::manual();
        drop(signal);
        assert!(matches!(
            gate.wait().await,
            Err(Error::ChannelError { .. })
        ));
    }
}

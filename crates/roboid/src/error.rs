//! Error types for identity generation.
//!
//! This module defines the central [`Error`] enum returned by every client
//! variant. It is `Clone` because a single failure is fanned out to every
//! caller waiting on the same fingerprint.
//!
//! ## Error Cases
//! - `Engine`: the rendering engine returned an error for this request.
//! - `EnginePanicked`: the rendering engine panicked while serving a task.
//! - `EngineNotReady`: the engine's one-time initialization failed.
//! - `ReadinessTimeout`: the engine did not become ready in time.
//! - `ChannelError`: an internal channel between tasks closed unexpectedly.
//! - `ServiceShutdown`: the request arrived while the pool was shutting down.
//! - `Transport`: a bridge message could not be delivered to the host.
//! - `Remote`: the bridge host rejected the request.
//! - `Protocol`: a bridge frame could not be encoded or decoded.
//! - `InvalidRequest`: the request was malformed.

use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Error reported by a [`RenderEngine`](crate::RenderEngine) implementation.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Unified error type for identity generation.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The rendering engine failed to produce a result.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The rendering engine panicked while serving `fingerprint`.
    #[error("Engine panicked while rendering {fingerprint}")]
    EnginePanicked { fingerprint: String },

    /// The engine reported a failure during initialization.
    #[error("Engine failed to become ready: {reason}")]
    EngineNotReady { reason: String },

    /// The engine did not signal readiness within the configured bound.
    #[error("Engine not ready after {waited:?}")]
    ReadinessTimeout { waited: Duration },

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The pool is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// A bridge message could not be delivered.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// The bridge host rejected the request.
    #[error("Remote error: {reason}")]
    Remote { reason: String },

    /// A bridge frame was malformed.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// The request was invalid.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            reason: err.to_string(),
        }
    }
}

//! Message bridge between an in-app client and a generating host.
//!
//! ## Structure
//!
//! - [`protocol`] - JSON request and response frames.
//! - [`transport`] - the outbound [`BridgeTransport`] seam and an in-process
//!   channel implementation.
//! - [`host`] - the serving side, backed by a [`LocalClient`](crate::LocalClient).

pub mod host;
pub mod protocol;
pub mod transport;

pub use host::BridgeHost;
pub use protocol::{BridgeRequest, BridgeResponse, CATEGORY, CorrelationId, RequestKind};
pub use transport::{BridgeTransport, ChannelTransport};

//! Deterministic robot avatars and names from opaque seeds.
//!
//! A seed (a public key, an account id, any string) always maps to the same
//! avatar and the same name. Generation is expensive, so every client variant
//! caches results forever and coalesces concurrent identical requests into a
//! single engine invocation.
//!
//! ## Structure
//!
//! - [`LocalClient`] renders in-process: a single dispatcher task owns the
//!   cache, the pending-request table and a FIFO work queue, and feeds a fixed
//!   pool of workers once the engine reports ready.
//! - [`BridgeClient`] forwards requests to a [`BridgeHost`] over a message
//!   bridge, with its own cache and coalescing in front of the round-trip.
//! - [`Roboidentities`] picks one of them from explicit configuration and
//!   exposes the [`RoboidentitiesClient`] surface.
//!
//! ```no_run
//! use roboid::{IdenticonEngine, LocalClient, PoolConfig, RoboidentitiesClient, Size};
//!
//! # async fn demo() -> roboid::Result<()> {
//! let client = LocalClient::spawn(IdenticonEngine::new(), PoolConfig::default());
//! let avatar = client.generate_image("seedX", Size::Large).await?;
//! assert!(avatar.starts_with("data:image/png;base64,"));
//! # Ok(())
//! # }
//! ```

pub mod bridge;
mod cache;
mod client;
mod config;
mod dispatcher;
mod engine;
mod error;
mod events;
mod identicon;
mod pending;
mod pool;
mod readiness;
mod stats;
#[cfg(test)]
mod test_util;
mod types;

pub use crate::bridge::{
    BridgeHost, BridgeRequest, BridgeResponse, BridgeTransport, ChannelTransport, CorrelationId,
};
pub use crate::client::*;
pub use crate::config::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::events::*;
pub use crate::identicon::*;
pub use crate::readiness::*;
pub use crate::stats::StatsSnapshot;
pub use crate::types::*;

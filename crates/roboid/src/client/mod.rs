//! Uniform entry point for UI code.
//!
//! [`RoboidentitiesClient`] is the only surface callers need: it turns a seed
//! into a displayable avatar (a PNG data URI) or a name. Which implementation
//! serves it is decided once, by explicit configuration, when the
//! [`Roboidentities`] facade is built:
//!
//! - [`ClientVariant::Local`] renders in-process on a [`LocalClient`] pool.
//! - [`ClientVariant::Native`] and [`ClientVariant::Android`] forward requests
//!   to a host over a [`BridgeClient`]. They differ only in how correlation
//!   ids are minted.

mod bridge;
mod local;

pub use bridge::{BridgeClient, Correlation};
pub use local::LocalClient;

use crate::{Error, EventBus, PoolConfig, RenderEngine, Size, bridge::BridgeTransport};
use core::{fmt, future::Future, str::FromStr};
use futures::future::Either;
use serde::{Deserialize, Serialize};

/// Generates identities for display.
pub trait RoboidentitiesClient: Send + Sync {
    /// Resolves to a `data:image/png;base64,...` URI for `seed` at `size`.
    fn generate_image(
        &self,
        seed: &str,
        size: Size,
    ) -> impl Future<Output = crate::Result<String>> + Send;

    /// Resolves to the display name for `seed`.
    fn generate_name(&self, seed: &str) -> impl Future<Output = crate::Result<String>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientVariant {
    Local,
    Native,
    Android,
}

impl ClientVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientVariant::Local => "local",
            ClientVariant::Native => "native",
            ClientVariant::Android => "android",
        }
    }
}

impl fmt::Display for ClientVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "web" => Ok(ClientVariant::Local),
            "native" | "ios" => Ok(ClientVariant::Native),
            "android" => Ok(ClientVariant::Android),
            other => Err(Error::InvalidRequest {
                reason: format!("unknown client variant `{other}`"),
            }),
        }
    }
}

/// Capabilities needed to build each client variant.
pub enum Platform<E, T> {
    Local { engine: E, config: PoolConfig },
    Native { transport: T },
    Android { transport: T },
}

impl<E, T> Platform<E, T> {
    pub fn variant(&self) -> ClientVariant {
        match self {
            Platform::Local { .. } => ClientVariant::Local,
            Platform::Native { .. } => ClientVariant::Native,
            Platform::Android { .. } => ClientVariant::Android,
        }
    }
}

/// The client facade, one variant per platform.
pub enum Roboidentities<T> {
    Local(LocalClient),
    Bridge(BridgeClient<T>),
}

impl<T> Clone for Roboidentities<T> {
    fn clone(&self) -> Self {
        match self {
            Roboidentities::Local(client) => Roboidentities::Local(client.clone()),
            Roboidentities::Bridge(client) => Roboidentities::Bridge(client.clone()),
        }
    }
}

impl<T: BridgeTransport> Roboidentities<T> {
    /// Builds the client for `platform`, publishing notifications on
    /// `events`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<E: RenderEngine>(platform: Platform<E, T>, events: EventBus) -> Self {
        #[cfg(feature = "tracing")]
        tracing::info!("Using {} identity client", platform.variant());

        match platform {
            Platform::Local { engine, config } => {
                Roboidentities::Local(LocalClient::spawn_with_events(engine, config, events))
            }
            Platform::Native { transport } => {
                Roboidentities::Bridge(BridgeClient::new(transport, Correlation::Counter, events))
            }
            Platform::Android { transport } => {
                Roboidentities::Bridge(BridgeClient::new(transport, Correlation::Uuid, events))
            }
        }
    }

    pub fn events(&self) -> &EventBus {
        match self {
            Roboidentities::Local(client) => client.events(),
            Roboidentities::Bridge(client) => client.events(),
        }
    }
}

impl<T: BridgeTransport> RoboidentitiesClient for Roboidentities<T> {
    fn generate_image(
        &self,
        seed: &str,
        size: Size,
    ) -> impl Future<Output = crate::Result<String>> + Send {
        let job = crate::Job::image(seed, size);
        let outcome = match self {
            Roboidentities::Local(client) => Either::Left(client.generate(job)),
            Roboidentities::Bridge(client) => Either::Right(client.generate(job)),
        };
        async move { Ok(outcome.await?.to_display()) }
    }

    fn generate_name(&self, seed: &str) -> impl Future<Output = crate::Result<String>> + Send {
        let job = crate::Job::name(seed);
        let outcome = match self {
            Roboidentities::Local(client) => Either::Left(client.generate(job)),
            Roboidentities::Bridge(client) => Either::Right(client.generate(job)),
        };
        async move { Ok(outcome.await?.to_display()) }
    }
}

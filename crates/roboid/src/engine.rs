use crate::{EngineError, Size};
use bytes::Bytes;
use core::future::Future;

/// A pure, possibly slow, renderer of identities.
///
/// Implementations must be deterministic: equal inputs always produce equal
/// outputs. The dispatcher relies on this to cache results forever and to
/// coalesce concurrent identical requests into a single invocation.
///
/// An engine may need asynchronous, one-time initialization (loading assets,
/// compiling shaders, ...). No work is scheduled until [`ready`] resolves.
///
/// [`ready`]: RenderEngine::ready
pub trait RenderEngine: Send + Sync + 'static {
    /// Resolves once the engine can serve requests.
    fn ready(&self) -> impl Future<Output = Result<(), EngineError>> + Send {
        async { Ok(()) }
    }

    /// Renders the avatar for `seed` as PNG bytes.
    fn render(&self, seed: &str, size: Size)
    -> impl Future<Output = Result<Bytes, EngineError>> + Send;

    /// Derives the display name for `seed`.
    fn name(&self, seed: &str) -> impl Future<Output = Result<String, EngineError>> + Send;
}

impl<E: RenderEngine> RenderEngine for std::sync::Arc<E> {
    fn ready(&self) -> impl Future<Output = Result<(), EngineError>> + Send {
        (**self).ready()
    }

    fn render(
        &self,
        seed: &str,
        size: Size,
    ) -> impl Future<Output = Result<Bytes, EngineError>> + Send {
        (**self).render(seed, size)
    }

    fn name(&self, seed: &str) -> impl Future<Output = Result<String, EngineError>> + Send {
        (**self).name(seed)
    }
}

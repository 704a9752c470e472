//! Worker pool lifecycle.
//!
//! ## Structure
//!
//! - [`manager`] - the fixed set of worker channels and their busy flags.
//! - [`worker`] - the per-worker task loop running the rendering engine.

pub(crate) mod manager;
pub(crate) mod worker;

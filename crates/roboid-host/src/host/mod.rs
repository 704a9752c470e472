//! Stdio bridge host.
//!
//! ## Structure
//!
//! - [`config`] - CLI and environment configuration.
//! - [`stdio`] - JSON-lines request loop over stdin/stdout.
//! - [`telemetry`] - log subscriber, optional OpenTelemetry export and
//!   metric helpers.

pub mod config;
pub mod stdio;
pub mod telemetry;

//! Shared error and configuration types for the rtmbot client.
//!
//! # Main types
//!
//! - [`RtmError`]: Unified error enum for handshake, transport and callbacks.
//! - [`RtmResult`]: Convenience alias for `Result<T, RtmError>`.
//! - [`RtmConfig`]: Client configuration loaded from TOML.

/// Client configuration.
pub mod config;
/// Error types.
pub mod error;

pub use config::{HeartbeatConfig, RtmConfig, TlsConfig, TOKEN_ENV_VAR};
pub use error::{BoxError, RtmError, RtmResult};

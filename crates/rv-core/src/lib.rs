//! rv-core: Core types and configuration for revsocks
//!
//! This crate provides the identifiers, error types, configuration
//! structures and control-plane wire models shared by the server engine
//! and the CLI.

pub mod config;
pub mod control;
pub mod error;
pub mod pidfile;
pub mod traits;
pub mod types;

pub use error::{ConfigError, HandlerError, HandshakeError, TunnelError};
pub use types::TunnelId;

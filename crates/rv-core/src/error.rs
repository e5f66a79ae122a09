//! Core error types for revsocks

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rv_protocol::MuxError;
use thiserror::Error;

/// Server-level errors (listeners, certificates, configuration)
#[derive(Error, Debug)]
pub enum TunnelError {
    /// A listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TLS certificate or acceptor setup failed
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// Multiplexer error
    #[error("Multiplexer error: {0}")]
    Mux(#[from] MuxError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reasons an incoming agent connection is rejected before a handler exists
///
/// None of these are ever reported to the peer; the socket is just dropped.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// TLS accept and preamble read did not finish in time
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Connection ended or failed before the preamble was complete
    #[error("Failed to read preamble: {0}")]
    Io(#[source] io::Error),

    /// First bytes did not match the magic preamble
    #[error("Bad preamble: {0:02x?}")]
    BadPreamble([u8; 4]),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),
}

/// Errors that abort a connection handler during setup
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The per-agent bridge listener could not be bound
    #[error("Failed to bind bridge listener on {host}: {source}")]
    BridgeBind {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The multiplexed session could not be established
    #[error("Session setup failed: {0}")]
    Session(#[from] MuxError),

    /// The agent's peer address was unavailable
    #[error("Agent peer address unavailable: {0}")]
    PeerAddr(#[source] io::Error),

    /// Bridge address could not be resolved after binding
    #[error("Bridge listener for {peer} has no local address: {source}")]
    LocalAddr {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

//! Control-plane wire types
//!
//! The control plane is plain HTTP/1.1 with JSON bodies, served either on
//! a Unix domain socket or on a loopback TCP port.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Route that lists live tunnels
pub const CONNECTIONS_PATH: &str = "/connections";
/// Route that closes one tunnel by id
pub const CLOSE_PATH: &str = "/close";
/// Route that stops the daemon
pub const SHUTDOWN_PATH: &str = "/shutdown";

/// File name of the default control socket inside the temp dir
pub const DEFAULT_SOCKET_NAME: &str = "better-revsocks.sock";
/// Default loopback address where Unix sockets are unavailable
pub const DEFAULT_TCP_ADDR: &str = "127.0.0.1:9191";

/// Where the control plane listens
///
/// Written as `unix:<path>` or `tcp:<ip:port>` in config files and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlEndpoint {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl Default for ControlEndpoint {
    #[cfg(unix)]
    fn default() -> Self {
        ControlEndpoint::Unix(std::env::temp_dir().join(DEFAULT_SOCKET_NAME))
    }

    #[cfg(not(unix))]
    fn default() -> Self {
        ControlEndpoint::Tcp(SocketAddr::from(([127, 0, 0, 1], 9191)))
    }
}

impl ControlEndpoint {
    /// Reject endpoints that would expose the control plane off-host
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ControlEndpoint::Unix(path) if path.as_os_str().is_empty() => Err(
                ConfigError::Invalid("control socket path must not be empty".into()),
            ),
            ControlEndpoint::Tcp(addr) if !addr.ip().is_loopback() => Err(ConfigError::Invalid(
                format!("control address {} is not a loopback address", addr),
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for ControlEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            return Ok(ControlEndpoint::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            let addr = addr.parse().map_err(|e| {
                ConfigError::Invalid(format!("invalid control address '{}': {}", addr, e))
            })?;
            return Ok(ControlEndpoint::Tcp(addr));
        }
        Err(ConfigError::Invalid(format!(
            "control endpoint '{}' must start with 'unix:' or 'tcp:'",
            s
        )))
    }
}

impl TryFrom<String> for ControlEndpoint {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ControlEndpoint> for String {
    fn from(endpoint: ControlEndpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEndpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            ControlEndpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// One row of `GET /connections`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Tunnel id
    pub id: String,
    /// Agent's remote IP address
    pub ip: String,
    /// Address of the tunnel's bridge listener
    pub listen_addr: String,
}

/// Body of `POST /close`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub id: String,
}

/// Success body, e.g. `{"status":"closed"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

impl StatusBody {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Error body, e.g. `{"error":"connection not found"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

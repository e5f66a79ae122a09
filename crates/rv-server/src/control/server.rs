//! Control-plane listener
//!
//! Serves the router over a Unix domain socket or a loopback TCP port.
//! The server stops once the daemon's shutdown token is cancelled,
//! after responses already in flight have been written.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;

use rv_core::control::ControlEndpoint;
use rv_core::{ConfigError, TunnelError};

use super::routes::router;
use crate::state::ServerState;

enum ControlListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, SocketFile),
}

/// Control-plane HTTP server
pub struct ControlServer {
    listener: ControlListener,
    endpoint: ControlEndpoint,
    state: Arc<ServerState>,
}

impl ControlServer {
    /// Bind the control endpoint
    ///
    /// A leftover socket file from a dead daemon is removed first; a socket
    /// that still answers means another daemon is running.
    pub async fn bind(
        endpoint: &ControlEndpoint,
        state: Arc<ServerState>,
    ) -> Result<Self, TunnelError> {
        endpoint.validate()?;

        let (listener, endpoint) = match endpoint {
            ControlEndpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| TunnelError::Bind {
                        addr: addr.to_string(),
                        source,
                    })?;
                let bound = listener.local_addr()?;
                (ControlListener::Tcp(listener), ControlEndpoint::Tcp(bound))
            }
            #[cfg(unix)]
            ControlEndpoint::Unix(path) => {
                remove_stale_socket(path).await?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let listener =
                    tokio::net::UnixListener::bind(path).map_err(|source| TunnelError::Bind {
                        addr: path.display().to_string(),
                        source,
                    })?;
                (
                    ControlListener::Unix(listener, SocketFile(path.clone())),
                    endpoint.clone(),
                )
            }
            #[cfg(not(unix))]
            ControlEndpoint::Unix(_) => {
                return Err(ConfigError::Invalid(
                    "unix control sockets are not supported on this platform".into(),
                )
                .into());
            }
        };

        Ok(Self {
            listener,
            endpoint,
            state,
        })
    }

    /// Endpoint actually bound (a TCP port of 0 is resolved)
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Serve requests until the daemon shuts down
    pub async fn run(self) -> io::Result<()> {
        let app = router(Arc::clone(&self.state));
        let shutdown = self.state.shutdown.clone().cancelled_owned();
        tracing::info!(endpoint = %self.endpoint, "control plane listening");

        match self.listener {
            ControlListener::Tcp(listener) => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
            }
            #[cfg(unix)]
            ControlListener::Unix(listener, _socket_file) => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
            }
        }
    }
}

/// Removes the socket file when the server goes away
#[cfg(unix)]
struct SocketFile(PathBuf);

#[cfg(unix)]
impl Drop for SocketFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %e, "failed to remove control socket");
            }
        }
    }
}

#[cfg(unix)]
async fn remove_stale_socket(path: &Path) -> Result<(), TunnelError> {
    if !path.exists() {
        return Ok(());
    }
    match tokio::net::UnixStream::connect(path).await {
        Ok(_) => Err(ConfigError::Invalid(format!(
            "another daemon is already listening on {}",
            path.display()
        ))
        .into()),
        Err(_) => {
            tracing::debug!(path = %path.display(), "removing stale control socket");
            tokio::fs::remove_file(path).await?;
            Ok(())
        }
    }
}

//! Agent listener
//!
//! Accepts incoming agent connections and hands each one, once it passes
//! the handshake, to a new connection handler.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use rv_core::config::Transport;
use rv_core::TunnelError;

use super::handler::ConnectionHandler;
use super::handshake::accept_agent;
use crate::state::ServerState;
use crate::tls;

/// Listener that agents dial into
pub struct AgentServer {
    listener: TcpListener,
    /// Set when agents speak TLS
    tls: Option<TlsAcceptor>,
    /// Shared server state
    state: Arc<ServerState>,
}

impl AgentServer {
    /// Bind the agent listener described by the server config
    pub async fn bind(state: Arc<ServerState>) -> Result<Self, TunnelError> {
        let addr = state.config.agent_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TunnelError::Bind { addr, source })?;

        let tls = match state.config.transport {
            Transport::Plain => None,
            Transport::Tls => {
                tracing::info!("generating self-signed certificate for agent TLS");
                Some(tls::self_signed_acceptor()?)
            }
            Transport::Tor => {
                tracing::info!(
                    "tor transport: expose this port through an onion service managed by the local tor daemon"
                );
                None
            }
        };

        Ok(Self {
            listener,
            tls,
            state,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept agents until the server is shut down
    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => tracing::info!(
                addr = %addr,
                transport = %self.state.config.transport,
                "listening for agents"
            ),
            Err(e) => tracing::warn!(error = %e, "agent listener has no local address"),
        }

        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => {
                    tracing::info!("agent listener shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer)) => self.admit(socket, peer),
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept agent connection");
                        }
                    }
                }
            }
        }
    }

    /// Run the handshake and start a handler, off the accept loop
    fn admit(&self, socket: TcpStream, peer: SocketAddr) {
        let state = Arc::clone(&self.state);
        let tls = self.tls.clone();

        self.state.tasks.spawn(async move {
            let deadline = state.config.handshake_timeout;
            let handshake = tokio::select! {
                result = accept_agent(socket, tls.as_ref(), deadline) => result,
                _ = state.shutdown.cancelled() => {
                    tracing::debug!(peer = %peer, "dropping agent mid-handshake, server is shutting down");
                    return;
                }
            };
            let io = match handshake {
                Ok(io) => io,
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "rejected agent connection");
                    return;
                }
            };

            // The registry may already have been drained
            if state.is_shutting_down() {
                return;
            }
            if let Err(e) = ConnectionHandler::spawn(io, peer, &state).await {
                tracing::warn!(peer = %peer, error = %e, "failed to set up tunnel");
            }
        });
    }
}

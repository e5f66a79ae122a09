//! Per-agent connection handler
//!
//! Owns one agent's session, bridge listener and health monitor. Every
//! task it starts is tracked, and every one of them watches the
//! handler's `done` token, so teardown can be awaited.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use rv_core::control::ConnectionInfo;
use rv_core::traits::TunnelHandle;
use rv_core::{HandlerError, TunnelId};
use rv_protocol::{Mode, Session};

use crate::connection::{spawn_pump, HealthMonitor, Registry};
use crate::state::ServerState;

/// One live agent tunnel
pub struct ConnectionHandler {
    /// Registry key
    id: TunnelId,
    /// Agent's remote address
    peer: SocketAddr,
    /// Where local clients connect to enter the tunnel
    bridge_addr: SocketAddr,
    /// Multiplexed session over the agent connection
    session: Session,
    /// Registry this handler removes itself from on close
    registry: Arc<Registry>,
    /// Cancelled when the tunnel must go down, for any reason
    done: CancellationToken,
    /// Run loop, health monitor and pumps
    tasks: TaskTracker,
    closed: AtomicBool,
}

impl ConnectionHandler {
    /// Set up a tunnel over an accepted, validated agent connection
    ///
    /// Binds the bridge listener, starts the session, registers the
    /// handler and starts its tasks. On error nothing is registered and
    /// the agent connection is dropped.
    pub async fn spawn<T>(
        io: T,
        peer: SocketAddr,
        state: &ServerState,
    ) -> Result<Arc<Self>, HandlerError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let id = TunnelId::generate(peer);
        let host = state.config.bridge_host.clone();

        let listener = TcpListener::bind((host.as_str(), 0))
            .await
            .map_err(|source| HandlerError::BridgeBind { host, source })?;
        let bridge_addr = listener
            .local_addr()
            .map_err(|source| HandlerError::LocalAddr { peer, source })?;

        let session = Session::new(io, Mode::Client, state.config.mux_config())?;

        let handler = Arc::new(Self {
            id,
            peer,
            bridge_addr,
            session,
            registry: Arc::clone(&state.registry),
            done: state.shutdown.child_token(),
            tasks: TaskTracker::new(),
            closed: AtomicBool::new(false),
        });

        state.registry.register(Arc::clone(&handler));
        tracing::info!(
            tunnel_id = %handler.id,
            peer = %peer,
            bridge = %bridge_addr,
            "agent connected"
        );

        let span = tracing::info_span!("tunnel", id = %handler.id);
        let monitor = HealthMonitor::new(
            state.config.health_interval,
            state.config.health_failure_threshold,
        );
        handler.tasks.spawn(
            monitor
                .run(handler.session.clone(), handler.done.clone())
                .instrument(span.clone()),
        );
        handler
            .tasks
            .spawn(Arc::clone(&handler).run(listener).instrument(span));
        handler.tasks.close();

        let tasks = handler.tasks.clone();
        state.tasks.spawn(async move { tasks.wait().await });

        Ok(handler)
    }

    async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.done.cancelled() => break,
                _ = self.session.closed() => {
                    tracing::info!("agent session ended");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((client, client_addr)) => self.bridge(client, client_addr),
                    Err(e) => {
                        tracing::warn!(error = %e, "bridge listener failed");
                        break;
                    }
                },
            }
        }

        drop(listener);
        self.close();
    }

    /// Pair a bridge client with a fresh stream to the agent
    fn bridge(&self, client: TcpStream, client_addr: SocketAddr) {
        match self.session.open_stream() {
            Ok(stream) => {
                tracing::debug!(client = %client_addr, stream = %stream.id(), "bridging client");
                spawn_pump(&self.tasks, client, stream, self.done.clone());
            }
            Err(e) => {
                tracing::warn!(client = %client_addr, error = %e, "failed to open stream, dropping client");
            }
        }
    }

    /// Tear the tunnel down
    ///
    /// Idempotent. Removes the registry entry (if it is still ours),
    /// stops every task and closes the session and agent connection.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.unregister_handle(self);
        self.done.cancel();
        self.session.close();
        tracing::info!(tunnel_id = %self.id, peer = %self.peer, "tunnel closed");
    }

    /// Close and wait until every task of this tunnel has finished
    pub async fn shutdown(&self) {
        self.close();
        self.tasks.wait().await;
    }

    /// Tunnel id
    pub fn id(&self) -> &TunnelId {
        &self.id
    }

    /// Agent's remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Address of the bridge listener
    pub fn bridge_addr(&self) -> SocketAddr {
        self.bridge_addr
    }

    /// Whether teardown has started
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Control-plane record for this tunnel
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.to_string(),
            ip: self.peer.ip().to_string(),
            listen_addr: self.bridge_addr.to_string(),
        }
    }
}

impl TunnelHandle for ConnectionHandler {
    fn id(&self) -> &TunnelId {
        &self.id
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionHandler::info(self)
    }

    fn close(&self) {
        ConnectionHandler::close(self)
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("bridge_addr", &self.bridge_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use rv_core::config::ServerConfig;
    use rv_protocol::MuxConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_state() -> ServerState {
        ServerState::new(ServerConfig {
            health_interval: Duration::from_secs(60),
            ..Default::default()
        })
    }

    /// Handler on one end of an in-memory pipe, echoing agent on the other
    async fn echo_tunnel(state: &ServerState) -> (Arc<ConnectionHandler>, Session) {
        let (server_io, agent_io) = tokio::io::duplex(64 * 1024);
        let agent = Session::new(agent_io, Mode::Server, MuxConfig::default()).unwrap();
        let acceptor = agent.clone();
        tokio::spawn(async move {
            while let Ok(mut stream) = acceptor.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    if stream.read_to_end(&mut buf).await.is_ok() {
                        let _ = stream.write_all(&buf).await;
                        let _ = stream.shutdown().await;
                    }
                });
            }
        });

        let peer: SocketAddr = "192.0.2.10:50000".parse().unwrap();
        let handler = ConnectionHandler::spawn(server_io, peer, state).await.unwrap();
        (handler, agent)
    }

    #[tokio::test]
    async fn test_spawn_registers_and_bridges() {
        let state = test_state();
        let (handler, _agent) = echo_tunnel(&state).await;

        let info = handler.info();
        assert_eq!(info.ip, "192.0.2.10");
        assert!(info.listen_addr.starts_with("127.0.0.1:"));
        assert_eq!(state.registry.snapshot(), vec![info]);

        let mut client = TcpStream::connect(handler.bridge_addr()).await.unwrap();
        client.write_all(b"through the bridge").await.unwrap();
        client.shutdown().await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"through the bridge");
    }

    #[tokio::test]
    async fn test_stream_open_failure_drops_only_that_client() {
        let state = ServerState::new(ServerConfig {
            health_interval: Duration::from_secs(60),
            max_streams: 2,
            ..Default::default()
        });

        // Streaming echo so bridged clients can stay open
        let (server_io, agent_io) = tokio::io::duplex(64 * 1024);
        let agent = Session::new(agent_io, Mode::Server, MuxConfig::default()).unwrap();
        let acceptor = agent.clone();
        tokio::spawn(async move {
            while let Ok(stream) = acceptor.accept().await {
                tokio::spawn(async move {
                    let (mut reader, mut writer) = tokio::io::split(stream);
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        });
        let peer: SocketAddr = "192.0.2.20:40000".parse().unwrap();
        let handler = ConnectionHandler::spawn(server_io, peer, &state).await.unwrap();

        let mut open = Vec::new();
        for name in [&b"first"[..], &b"secnd"[..]] {
            let mut client = TcpStream::connect(handler.bridge_addr()).await.unwrap();
            client.write_all(name).await.unwrap();
            let mut buf = [0u8; 5];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf[..], name);
            open.push(client);
        }

        // Over the limit: the session refuses the stream and the client is dropped
        let mut extra = TcpStream::connect(handler.bridge_addr()).await.unwrap();
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), extra.read(&mut buf))
            .await
            .expect("extra client should be closed");
        assert!(matches!(read, Ok(0) | Err(_)));

        assert!(!handler.is_closed());
        assert_eq!(state.registry.len(), 1);
        for client in &mut open {
            client.write_all(b"again").await.unwrap();
            let mut buf = [0u8; 5];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"again");
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases_everything() {
        let state = test_state();
        let (handler, agent) = echo_tunnel(&state).await;
        let bridge = handler.bridge_addr();

        handler.close();
        handler.close();
        tokio::time::timeout(Duration::from_secs(2), handler.shutdown())
            .await
            .expect("handler tasks should finish");

        assert!(handler.is_closed());
        assert!(state.registry.is_empty());
        assert!(TcpStream::connect(bridge).await.is_err());
        tokio::time::timeout(Duration::from_secs(2), agent.closed())
            .await
            .expect("agent should see the session end");
    }

    #[tokio::test]
    async fn test_agent_disconnect_tears_down() {
        let state = test_state();
        let (handler, agent) = echo_tunnel(&state).await;

        agent.close();
        tokio::time::timeout(Duration::from_secs(2), handler.tasks.wait())
            .await
            .expect("handler should notice the dead session");
        assert!(handler.is_closed());
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_daemon_shutdown_cancels_handler() {
        let state = test_state();
        let (handler, _agent) = echo_tunnel(&state).await;

        state.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handler.tasks.wait())
            .await
            .expect("handler should follow the daemon token");
        assert!(state.registry.is_empty());
    }
}

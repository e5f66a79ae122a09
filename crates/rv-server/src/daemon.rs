//! The tunnel server daemon
//!
//! Binds the agent listener and control plane, runs them until the
//! shutdown token fires (control-plane request or signal), then drains:
//! stop accepting agents, let the control plane flush, close every
//! tunnel, wait for every tracked task.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use rv_core::config::ServerConfig;
use rv_core::control::ControlEndpoint;
use rv_core::TunnelError;

use crate::control::ControlServer;
use crate::server::AgentServer;
use crate::state::ServerState;

/// How long the control plane may take to finish in-flight responses
const CONTROL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A bound, ready-to-run server
pub struct Daemon {
    state: Arc<ServerState>,
    agents: AgentServer,
    control: ControlServer,
}

impl Daemon {
    /// Validate `config` and bind both listeners
    pub async fn bind(config: ServerConfig) -> Result<Self, TunnelError> {
        config.validate()?;
        let state = Arc::new(ServerState::new(config));

        let agents = AgentServer::bind(Arc::clone(&state)).await?;
        let control = ControlServer::bind(&state.config.control, Arc::clone(&state)).await?;

        Ok(Self {
            state,
            agents,
            control,
        })
    }

    /// Shared server state
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Address agents dial into
    pub fn agent_addr(&self) -> io::Result<SocketAddr> {
        self.agents.local_addr()
    }

    /// Control endpoint actually bound
    pub fn control_endpoint(&self) -> &ControlEndpoint {
        self.control.endpoint()
    }

    /// Token that starts the drain when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Serve until shutdown, then drain
    pub async fn run(self) -> Result<()> {
        let Daemon {
            state,
            agents,
            control,
        } = self;

        let mut control_task = tokio::spawn(control.run());
        agents.run().await;
        tracing::info!("draining server");

        let control_result =
            match tokio::time::timeout(CONTROL_DRAIN_TIMEOUT, &mut control_task).await {
                Ok(Ok(result)) => result.context("control plane failed"),
                Ok(Err(e)) => Err(e).context("control plane task panicked"),
                Err(_) => {
                    tracing::warn!("control plane did not stop in time, aborting it");
                    control_task.abort();
                    Ok(())
                }
            };

        let closed = state.registry.close_all();
        state.tasks.close();
        state.tasks.wait().await;
        tracing::info!(tunnels = closed, "server stopped");

        control_result
    }
}

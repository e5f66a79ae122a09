//! Run command implementation (foreground daemon)

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use rv_core::config::{ServerConfig, Transport};
use rv_core::pidfile::{default_pid_path, running_pid, PidFileGuard};
use rv_server::Daemon;

/// Flags shared by `run` and `start`
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Port agents connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Wrap agent connections in TLS with a self-signed certificate
    #[arg(long, conflicts_with = "tor")]
    pub tls: bool,

    /// Accept agents arriving through an onion service
    #[arg(long)]
    pub tor: bool,

    /// Host the agent listener binds to
    #[arg(short, long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    /// Override `config` with whatever flags were given
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_host = bind.clone();
        }
        if self.tls {
            config.transport = Transport::Tls;
        } else if self.tor {
            config.transport = Transport::Tor;
        }
    }

    /// Reproduce the flags on a child command line
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.port {
            args.push("--port".to_string());
            args.push(port.to_string());
        }
        if self.tls {
            args.push("--tls".to_string());
        }
        if self.tor {
            args.push("--tor".to_string());
        }
        if let Some(bind) = &self.bind {
            args.push("--bind".to_string());
            args.push(bind.clone());
        }
        args
    }
}

/// Run the server until a signal or a control-plane shutdown
pub async fn run_command(config: ServerConfig) -> Result<()> {
    let pid_path = default_pid_path();
    if let Some(pid) = running_pid(&pid_path)? {
        anyhow::bail!("revsocks is already running (PID: {})", pid);
    }
    let _pid_guard = PidFileGuard::for_current_process()
        .with_context(|| format!("Failed to write PID file {:?}", pid_path))?;

    let transport = config.transport;
    let daemon = Daemon::bind(config)
        .await
        .context("Failed to start revsocks")?;
    tracing::info!(
        agents = %daemon.agent_addr()?,
        control = %daemon.control_endpoint(),
        %transport,
        "revsocks listening"
    );

    spawn_signal_handler(daemon.shutdown_token());
    daemon.run().await
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down");
            }
            _ = terminate => {
                tracing::info!("received SIGTERM, shutting down");
            }
            _ = shutdown.cancelled() => return,
        }

        shutdown.cancel();
    });
}

//! revsocks
//!
//! Single binary for the reverse SOCKS5 tunnel server:
//! - `run` / `start` serve agents in the foreground or detached
//! - `stop`, `ls`, `close` talk to a running server's control endpoint

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revsocks::commands::{self, ServeArgs};
use revsocks::control::ControlClient;
use rv_core::control::ControlEndpoint;

#[derive(Parser)]
#[command(name = "revsocks")]
#[command(author, version, about = "Reverse SOCKS5 tunnel server")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Control endpoint (unix:PATH or tcp:HOST:PORT), overrides config
    #[arg(long, global = true, value_name = "ENDPOINT")]
    control: Option<ControlEndpoint>,

    #[command(subcommand)]
    command: Commands,
}

const BRIDGE_HOST_HELP: &str = "Bridge listeners bind to 127.0.0.1 by default. To reach them from other \
hosts, set bridge_host = \"0.0.0.0\" in the [server] section of the config file.";

#[derive(Subcommand)]
enum Commands {
    /// Run the server in the foreground
    #[command(after_help = BRIDGE_HOST_HELP)]
    Run(ServeArgs),

    /// Start the server in the background
    #[command(after_help = BRIDGE_HOST_HELP)]
    Start(ServeArgs),

    /// Stop a running server
    Stop,

    /// List connected agents
    #[command(alias = "list")]
    Ls,

    /// Close one agent's tunnel
    Close {
        /// Tunnel ID as shown by `ls`
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The server logs its lifecycle by default; client commands stay quiet
    let serving = matches!(cli.command, Commands::Run(_));
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) if serving => "info",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = commands::resolve_config(cli.config.as_deref(), cli.control.as_ref())?;

    match cli.command {
        Commands::Run(serve) => {
            serve.apply(&mut config);
            commands::run_command(config).await?;
        }

        Commands::Start(serve) => {
            commands::start_command(&serve, cli.config.as_deref(), cli.control.as_ref())?;
        }

        Commands::Stop => {
            commands::stop_command(&ControlClient::new(config.control)).await?;
        }

        Commands::Ls => {
            commands::list_command(&ControlClient::new(config.control)).await?;
        }

        Commands::Close { id } => {
            commands::close_command(&ControlClient::new(config.control), &id).await?;
        }
    }

    Ok(())
}

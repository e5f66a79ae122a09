//! rv-server: Reverse SOCKS5 tunnel server engine
//!
//! Agents dial in, prove themselves with a fixed preamble and offer a
//! multiplexed session. For each agent the server opens a local bridge
//! listener; every client that connects there is paired with a fresh
//! stream to the agent. A local HTTP control plane lists and closes
//! tunnels and stops the daemon.

pub mod connection;
pub mod control;
pub mod daemon;
pub mod server;
pub mod state;
pub mod tls;

pub use connection::Registry;
pub use daemon::Daemon;
pub use server::{AgentServer, ConnectionHandler, MAGIC_PREAMBLE};
pub use state::ServerState;

//! Agent-facing server

mod handler;
mod handshake;
mod listener;

pub use handler::ConnectionHandler;
pub use handshake::{accept_agent, read_preamble, AgentConnection, AgentIo, MAGIC_PREAMBLE};
pub use listener::AgentServer;

//! Global server state

use std::sync::Arc;

use rv_core::config::ServerConfig;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connection::Registry;

/// State shared by the agent listener, every handler and the control plane
pub struct ServerState {
    /// Configuration
    pub config: ServerConfig,
    /// Live tunnels
    pub registry: Arc<Registry>,
    /// Cancelled once the daemon starts draining
    pub shutdown: CancellationToken,
    /// Every task the daemon waits for before exiting
    pub tasks: TaskTracker,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Get the connection registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Whether the daemon is draining
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

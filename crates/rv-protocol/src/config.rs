//! Session configuration

use std::time::Duration;

use crate::error::MuxError;

/// Initial per-stream window mandated by the protocol (256 KiB)
pub const DEFAULT_WINDOW: u32 = 256 * 1024;

/// Which side of the session this endpoint plays
///
/// The client opens odd-numbered streams, the server even-numbered ones.
/// Only a server accepts streams opened by its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Client,
    Server,
}

/// Tunable session parameters
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Receive window granted to each stream
    pub receive_window: u32,
    /// Largest data payload written in a single frame
    pub max_frame_size: usize,
    /// How long a ping waits for its answer
    pub ping_timeout: Duration,
    /// Upper bound on concurrently open streams
    pub max_streams: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            receive_window: DEFAULT_WINDOW,
            max_frame_size: 16 * 1024,
            ping_timeout: Duration::from_secs(10),
            max_streams: 512,
        }
    }
}

impl MuxConfig {
    /// Check the configuration for values the protocol cannot honor
    pub fn validate(&self) -> Result<(), MuxError> {
        if self.receive_window < DEFAULT_WINDOW {
            return Err(MuxError::InvalidConfig(format!(
                "receive_window must be at least {} bytes",
                DEFAULT_WINDOW
            )));
        }
        if self.max_frame_size == 0 {
            return Err(MuxError::InvalidConfig(
                "max_frame_size must be greater than zero".into(),
            ));
        }
        if self.ping_timeout.is_zero() {
            return Err(MuxError::InvalidConfig(
                "ping_timeout must be greater than zero".into(),
            ));
        }
        if self.max_streams == 0 {
            return Err(MuxError::InvalidConfig(
                "max_streams must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

//! Core domain types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide sequence mixed into every generated id
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifier of one agent tunnel
///
/// Always 8 lowercase hex characters. Derived from the agent's address,
/// the accept time and a process-wide sequence number, so two agents
/// behind the same address still get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(String);

impl TunnelId {
    /// Wrap an existing id string (e.g. one received from the control plane)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id for an agent accepted from `peer`
    pub fn generate(peer: SocketAddr) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(peer.to_string().as_bytes());
        hasher.update(nanos.to_be_bytes());
        hasher.update(seq.to_be_bytes());
        let digest = hasher.finalize();

        Self(hex::encode(&digest[..4]))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TunnelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TunnelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

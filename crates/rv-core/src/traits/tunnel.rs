//! Tunnel handle trait

use crate::control::ConnectionInfo;
use crate::types::TunnelId;

/// A live agent tunnel as seen by the connection registry
///
/// Implementations must make `close` idempotent and non-blocking: it is
/// called from the control plane, from the registry when an entry is
/// displaced, and from the tunnel's own teardown.
pub trait TunnelHandle: Send + Sync {
    /// Registry key of this tunnel
    fn id(&self) -> &TunnelId;

    /// Read-only projection returned by the control plane
    fn info(&self) -> ConnectionInfo;

    /// Begin teardown
    fn close(&self);
}

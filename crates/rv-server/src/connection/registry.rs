//! Registry of live tunnels

use std::sync::Arc;

use dashmap::DashMap;

use rv_core::control::ConnectionInfo;
use rv_core::traits::TunnelHandle;
use rv_core::TunnelId;

use crate::server::ConnectionHandler;

/// Process-wide table of live tunnels, keyed by id
///
/// Safe to use from every handler task and the control plane at once.
/// Each operation touches a single map shard atomically; snapshots are
/// independent copies.
pub struct Registry<H: TunnelHandle = ConnectionHandler> {
    entries: DashMap<TunnelId, Arc<H>>,
}

impl<H: TunnelHandle> Registry<H> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert a tunnel, replacing any entry with the same id
    ///
    /// A displaced tunnel is closed so it cannot outlive its entry.
    pub fn register(&self, handle: Arc<H>) -> Option<Arc<H>> {
        let displaced = self.entries.insert(handle.id().clone(), Arc::clone(&handle));
        if let Some(old) = &displaced {
            if !Arc::ptr_eq(old, &handle) {
                tracing::warn!(tunnel_id = %handle.id(), "tunnel id collision, replacing existing tunnel");
                old.close();
            }
        }
        displaced
    }

    /// Remove the entry for `id`, if any
    pub fn unregister(&self, id: &TunnelId) -> Option<Arc<H>> {
        self.entries.remove(id).map(|(_, handle)| handle)
    }

    /// Remove `handle`'s entry only if it still refers to `handle`
    ///
    /// Returns false when the entry is absent or belongs to a newer tunnel.
    pub fn unregister_handle(&self, handle: &H) -> bool {
        self.entries
            .remove_if(handle.id(), |_, current| {
                std::ptr::eq(Arc::as_ptr(current), handle)
            })
            .is_some()
    }

    /// Get a tunnel by id
    pub fn lookup(&self, id: &TunnelId) -> Option<Arc<H>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry))
    }

    /// Copy of every live tunnel's record, sorted by id
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut records: Vec<ConnectionInfo> =
            self.entries.iter().map(|entry| entry.info()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Close every live tunnel, returning how many were closed
    pub fn close_all(&self) -> usize {
        let handles: Vec<Arc<H>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handle in &handles {
            handle.close();
        }
        handles.len()
    }

    /// Number of live tunnels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: TunnelHandle> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

//! In-memory registry of live push connections, keyed by workspace.
//!
//! Nothing here is persisted; the registry is rebuilt empty on process
//! restart. A connection present in the registry is, by construction,
//! currently open: sessions unregister synchronously with close detection,
//! and the broadcaster unregisters any connection that fails delivery.
//!
//! Locking is two-level — a read-mostly outer map plus one mutex per
//! workspace — so connection churn in one workspace never serializes against
//! another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound frame capacity per connection. A session that cannot drain this
/// many frames is treated as dead.
const FRAME_BUFFER: usize = 64;

/// One live push connection. Cloneable handle; the socket itself stays inside
/// its session task, which drains `frames` and forwards to the wire.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    principal: String,
    frames: mpsc::Sender<String>,
    connected_at: DateTime<Utc>,
    last_ping_at: Arc<Mutex<DateTime<Utc>>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_ping_at(&self) -> DateTime<Utc> {
        *self.last_ping_at.lock()
    }

    /// Stamp an inbound liveness probe.
    pub fn note_ping(&self) {
        *self.last_ping_at.lock() = Utc::now();
    }

    /// Queue a frame for delivery. Fails if the session is gone or wedged.
    pub fn send_frame(&self, frame: String) -> Result<(), ()> {
        self.frames.try_send(frame).map_err(|_| ())
    }
}

#[derive(Default)]
struct WorkspaceConnections {
    connections: Mutex<HashMap<u64, ConnectionHandle>>,
}

/// Registry of live connections. Explicitly constructed and injected — one
/// instance per process, passed to collaborators — so tests can build
/// isolated instances.
#[derive(Default)]
pub struct ConnectionRegistry {
    workspaces: RwLock<HashMap<String, Arc<WorkspaceConnections>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn workspace(&self, workspace_id: &str) -> Arc<WorkspaceConnections> {
        if let Some(existing) = self.workspaces.read().get(workspace_id) {
            return existing.clone();
        }
        self.workspaces
            .write()
            .entry(workspace_id.to_string())
            .or_default()
            .clone()
    }

    /// Register a new connection and hand back its handle plus the receiving
    /// end of its outbound frame queue.
    pub fn register(
        &self,
        workspace_id: &str,
        principal: impl Into<String>,
    ) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (frames, frames_rx) = mpsc::channel(FRAME_BUFFER);
        let handle = ConnectionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            principal: principal.into(),
            frames,
            connected_at: Utc::now(),
            last_ping_at: Arc::new(Mutex::new(Utc::now())),
        };

        let workspace = self.workspace(workspace_id);
        workspace
            .connections
            .lock()
            .insert(handle.id, handle.clone());
        debug!(workspace_id, connection_id = handle.id, "connection registered");

        (handle, frames_rx)
    }

    /// Remove a connection. Safe to call more than once; the second call is a
    /// no-op. Empty workspace entries are dropped.
    pub fn unregister(&self, workspace_id: &str, connection_id: u64) -> bool {
        let Some(workspace) = self.workspaces.read().get(workspace_id).cloned() else {
            return false;
        };

        let removed = workspace.connections.lock().remove(&connection_id).is_some();
        if removed {
            debug!(workspace_id, connection_id, "connection unregistered");
            let empty = workspace.connections.lock().is_empty();
            if empty {
                let mut workspaces = self.workspaces.write();
                let still_empty = workspaces
                    .get(workspace_id)
                    .is_some_and(|w| w.connections.lock().is_empty());
                if still_empty {
                    workspaces.remove(workspace_id);
                }
            }
        }
        removed
    }

    /// Copy of the live connection set for a workspace at this instant.
    pub fn snapshot(&self, workspace_id: &str) -> Vec<ConnectionHandle> {
        self.workspaces
            .read()
            .get(workspace_id)
            .map(|workspace| workspace.connections.lock().values().cloned().collect())
            .unwrap_or_default()
    }

    /// Live connections in one workspace.
    pub fn workspace_count(&self, workspace_id: &str) -> usize {
        self.workspaces
            .read()
            .get(workspace_id)
            .map(|workspace| workspace.connections.lock().len())
            .unwrap_or(0)
    }

    /// Live connections across all workspaces.
    pub fn connection_count(&self) -> usize {
        self.workspaces
            .read()
            .values()
            .map(|workspace| workspace.connections.lock().len())
            .sum()
    }
}

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

pub type ConnectionId = u64;

/// Handle to a live connection, as seen by other sessions.
///
/// Lines pushed through a `Peer` land in the connection's outbox and are
/// written to the socket by that connection's writer task, in order.
#[derive(Debug, Clone)]
pub struct Peer {
    id: ConnectionId,
    outbox: mpsc::Sender<String>,
}

impl Peer {
    pub fn new(id: ConnectionId, outbox: mpsc::Sender<String>) -> Self {
        Self { id, outbox }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Best-effort delivery of one line. Never waits on a slow peer.
    pub fn deliver(&self, line: &str) -> bool {
        match self.outbox.try_send(line.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(peer = self.id, "outbox full, dropping line");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(peer = self.id, "outbox closed, dropping line");
                false
            }
        }
    }
}

#[derive(Default)]
struct RegistryState {
    names: HashSet<String>,
    connections: HashMap<ConnectionId, Peer>,
}

/// Claimed display names plus the live connection set.
///
/// Both live under one lock so each operation is atomic with respect to the
/// others. Nothing spans calls: a peer returned by [`Registry::snapshot_except`]
/// may already be closing by the time it is written to.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reserves `name` (trimmed) if it is non-empty and not yet taken.
    pub fn claim(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.lock().names.insert(name.to_string())
    }

    pub fn release(&self, name: &str) {
        self.lock().names.remove(name);
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.lock().names.contains(name)
    }

    pub fn register(&self, peer: Peer) {
        self.lock().connections.insert(peer.id, peer);
    }

    pub fn unregister(&self, id: ConnectionId) -> Option<Peer> {
        self.lock().connections.remove(&id)
    }

    pub fn snapshot_except(&self, id: ConnectionId) -> Vec<Peer> {
        self.lock()
            .connections
            .values()
            .filter(|peer| peer.id != id)
            .cloned()
            .collect()
    }

    /// Number of registered connections, named or not.
    pub fn online(&self) -> usize {
        self.lock().connections.len()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section is a single collection call, so a panic
        // elsewhere cannot leave the sets half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Tracking for event-stream WebSocket clients.
//!
//! - `WsConnectionManager`: every open `/ws` connection, with force-close
//! - `ConnectionGuard`: unregisters its connection on drop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

struct ConnectionInfo {
    peer: SocketAddr,
    opened_at: Instant,
}

/// Manages all open event-stream connections.
///
/// Each connection's token is a child of a shared token, so `close_all`
/// signals every handler at once.
pub struct WsConnectionManager {
    connections: DashMap<u64, ConnectionInfo>,
    next_id: AtomicU64,
    /// Replaced after `close_all` so later connections are unaffected.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a connection from `peer`.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(
            id,
            ConnectionInfo {
                peer,
                opened_at: Instant::now(),
            },
        );
        log::info!(
            "[WS] Client {} connected as ws-{} (total: {})",
            peer,
            id,
            self.connections.len()
        );

        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: u64) {
        if let Some((_, info)) = self.connections.remove(&id) {
            log::info!(
                "[WS] Client {} (ws-{}) left after {:?} (remaining: {})",
                info.peer,
                id,
                info.opened_at.elapsed(),
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Signals every open connection to close.
    ///
    /// Returns the number of connections signalled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        let mut token = self.global_cancel.write();
        token.cancel();
        *token = CancellationToken::new();
        if count > 0 {
            log::info!("[WS] Force-closed {} connection(s)", count);
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a connection registered for as long as it lives.
pub struct ConnectionGuard {
    id: u64,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled when the manager force-closes connections.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn guard_drop_unregisters() {
        let manager = Arc::new(WsConnectionManager::new());
        let a = manager.register(peer());
        let b = manager.register(peer());
        assert_ne!(a.id(), b.id());
        assert_eq!(manager.connection_count(), 2);

        drop(a);
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn close_all_cancels_existing_but_not_new() {
        let manager = Arc::new(WsConnectionManager::new());
        let old = manager.register(peer());

        assert_eq!(manager.close_all(), 1);
        assert!(old.cancel_token().is_cancelled());

        let fresh = manager.register(peer());
        assert!(!fresh.cancel_token().is_cancelled());
    }
}

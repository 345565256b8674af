//! Registry of live connections. Owned exclusively by the control loop.

use super::HubStats;
use crate::connection::Connection;
use crate::types::ConnectionId;
use std::collections::HashMap;
use tracing::debug;

/// The hub's view of every live connection, keyed by identity.
///
/// A connection is present iff it has been registered and not yet
/// unregistered or evicted. Only the control loop touches this — single
/// ownership replaces locking.
pub(super) struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    pub(super) fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Insert a connection. Re-inserting an existing identity replaces the
    /// previous handle (last write wins).
    pub(super) fn insert(&mut self, connection: Connection) {
        let id = connection.id();
        if self.connections.insert(id, connection).is_some() {
            debug!(connection = %id, "replaced connection with colliding identity");
        }
    }

    pub(super) fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub(super) fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Identities of every connection tagged with `topic` (exact match; the
    /// empty string selects the untagged group).
    pub(super) fn matching(&self, topic: &str) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|conn| conn.topic() == topic)
            .map(|conn| conn.id())
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.connections.len()
    }

    /// Point-in-time snapshot of connection counts.
    pub(super) fn stats(&self) -> HubStats {
        let mut stats = HubStats {
            connections: self.connections.len(),
            ..HubStats::default()
        };

        for conn in self.connections.values() {
            if conn.topic().is_empty() {
                stats.untagged += 1;
            } else {
                *stats.topics.entry(conn.topic().to_string()).or_insert(0) += 1;
            }
        }

        stats
    }

    /// Close and drop every connection. Used on shutdown.
    pub(super) fn close_all(&mut self) {
        let count = self.connections.len();
        for (_, conn) in self.connections.drain() {
            conn.close();
        }
        if count > 0 {
            debug!(connections = count, "closed all registered connections");
        }
    }
}

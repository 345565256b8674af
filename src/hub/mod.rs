//! The broadcast hub: a single control loop that owns the connection
//! registry and applies every operation in submission order.
//!
//! Callers never touch the registry directly. Each public operation is a
//! command submitted over a bounded channel; the control loop is the sole
//! reader and writer of the registry, so no two operations can observe or
//! mutate it concurrently. FIFO acceptance gives a consistent global order
//! across registrations, unregistrations, and broadcasts regardless of which
//! task submitted them.

mod registry;
#[cfg(test)]
mod tests;

use crate::config::HubConfig;
use crate::connection::Connection;
use crate::types::{ConnectionId, HubError, HubResult};
use registry::Registry;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, info, warn};

/// Operations applied by the control loop.
enum HubCommand {
    Register(Connection),
    Unregister(ConnectionId),
    Broadcast { topic: String, payload: Vec<u8> },
    BroadcastAll { payload: Vec<u8> },
    Stats(oneshot::Sender<HubStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time snapshot of the registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Total registered connections.
    pub connections: usize,
    /// Connections registered without a topic tag.
    pub untagged: usize,
    /// Registered connections per non-empty topic.
    pub topics: HashMap<String, usize>,
}

/// Cloneable handle to the broadcast hub.
///
/// Construct one per process with [`Hub::spawn`] and inject it wherever
/// connections are established; clones share the same control loop. The hub
/// lives until [`Hub::shutdown`] is called or every handle is dropped —
/// either way the control loop closes all registered connections on its way
/// out.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
    config: HubConfig,
}

impl Hub {
    /// Start the control loop on the current runtime and return a handle.
    pub fn spawn(config: HubConfig) -> Self {
        // Capacity 1 keeps submission a near-rendezvous hand-off: a caller
        // suspends until the loop is ready for its command.
        let (commands, receiver) = mpsc::channel(1);
        tokio::spawn(control_loop(receiver));
        Self { commands, config }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a connection to the registry under its identity and topic tag.
    ///
    /// After this call the hub owns the right to write to and evict the
    /// connection; the caller must not write to the peer anymore.
    pub async fn register(&self, connection: Connection) -> HubResult<()> {
        self.submit(HubCommand::Register(connection)).await
    }

    /// Remove a connection and close its underlying resource.
    ///
    /// Unregistering a connection that is not present (never registered, or
    /// already evicted) is a silent no-op — never an error, never a
    /// double-close.
    pub async fn unregister(&self, id: ConnectionId) -> HubResult<()> {
        self.submit(HubCommand::Unregister(id)).await
    }

    /// Deliver `payload` to every registered connection tagged `topic`.
    ///
    /// Exact string match; the empty string selects only the untagged group.
    /// Delivery is best-effort and sequential: a connection whose send fails
    /// is evicted (removed and closed) before iteration continues, and no
    /// per-connection failure reaches the caller. Zero matching connections
    /// is a no-op.
    pub async fn broadcast(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> HubResult<()> {
        self.submit(HubCommand::Broadcast {
            topic: topic.into(),
            payload: payload.into(),
        })
        .await
    }

    /// Deliver `payload` to the connections registered without a topic tag.
    ///
    /// This is not a delivery to every connection in the registry: peers
    /// tagged with a non-empty topic are not reached.
    pub async fn broadcast_all(&self, payload: impl Into<Vec<u8>>) -> HubResult<()> {
        self.submit(HubCommand::BroadcastAll {
            payload: payload.into(),
        })
        .await
    }

    /// Snapshot the current connection counts.
    pub async fn stats(&self) -> HubResult<HubStats> {
        let (reply, response) = oneshot::channel();
        self.submit(HubCommand::Stats(reply)).await?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Stop the control loop, closing every registered connection first.
    ///
    /// Resolves once the loop has finished its cleanup. Idempotent: shutting
    /// down an already-stopped hub succeeds immediately. All subsequent
    /// operations fail with [`HubError::Closed`].
    pub async fn shutdown(&self) -> HubResult<()> {
        let (ack, done) = oneshot::channel();
        match self.submit(HubCommand::Shutdown(ack)).await {
            Ok(()) => {
                let _ = done.await;
                Ok(())
            }
            Err(HubError::Closed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn submit(&self, command: HubCommand) -> HubResult<()> {
        match time::timeout(self.config.submission_timeout(), self.commands.send(command)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HubError::Closed),
            Err(_) => Err(HubError::SubmissionTimeout),
        }
    }
}

/// The single authority over the registry. Applies commands in the order
/// they were accepted and exits on shutdown or when every handle is gone.
async fn control_loop(mut commands: mpsc::Receiver<HubCommand>) {
    let mut registry = Registry::new();

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register(connection) => {
                debug!(connection = %connection.id(), topic = connection.topic(), "registered connection");
                registry.insert(connection);
            }
            HubCommand::Unregister(id) => {
                if let Some(connection) = registry.remove(&id) {
                    connection.close();
                    debug!(connection = %id, "unregistered connection");
                }
            }
            HubCommand::Broadcast { topic, payload } => {
                deliver(&mut registry, &topic, &payload).await;
            }
            HubCommand::BroadcastAll { payload } => {
                deliver(&mut registry, "", &payload).await;
            }
            HubCommand::Stats(reply) => {
                let _ = reply.send(registry.stats());
            }
            HubCommand::Shutdown(ack) => {
                info!(connections = registry.len(), "hub shutting down");
                registry.close_all();
                let _ = ack.send(());
                return;
            }
        }
    }

    // Every handle dropped: same cleanup as an explicit shutdown.
    debug!(connections = registry.len(), "all hub handles dropped, stopping control loop");
    registry.close_all();
}

/// Sequential delivery to every connection tagged `topic`, evicting each
/// connection whose send fails before moving to the next one.
async fn deliver(registry: &mut Registry, topic: &str, payload: &[u8]) {
    let matching = registry.matching(topic);
    if matching.is_empty() {
        return;
    }

    for id in matching {
        let Some(connection) = registry.get(&id) else {
            continue;
        };

        if let Err(err) = connection.send(payload.to_vec()).await {
            warn!(connection = %id, topic, error = %err, "delivery failed, evicting connection");
            if let Some(connection) = registry.remove(&id) {
                connection.close();
            }
        }
    }
}

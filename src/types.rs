//! Core identifiers and error types shared across the hub and gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a registered connection.
///
/// Identities are never reused: a connection that has been unregistered or
/// evicted is terminal, and a reconnecting peer gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced to callers submitting operations to the hub.
///
/// Delivery failures are never part of this set: a failed send to one peer is
/// recovered inside the hub by evicting that peer and is invisible to the
/// caller of `broadcast`.
#[derive(Debug, Error)]
pub enum HubError {
    /// The control loop did not accept the operation within the configured
    /// submission timeout.
    #[error("hub did not accept the operation in time")]
    SubmissionTimeout,

    /// The hub has shut down and no longer accepts operations.
    #[error("hub is shut down")]
    Closed,
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// A single send to one peer failed.
///
/// Internal to the hub: handled by evicting the connection, never propagated.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The peer's writer task is gone (socket closed or errored).
    #[error("peer connection is gone")]
    Closed,

    /// The send did not complete within the per-send timeout.
    #[error("send did not complete in time")]
    Timeout,
}

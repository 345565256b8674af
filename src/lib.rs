//! # chathub
//!
//! Topic-tagged WebSocket fan-out hub.
//!
//! Clients open a long-lived connection tagged with a topic id; the hub
//! delivers each payload to exactly the set of connections currently tagged
//! with that topic. All registry mutations and deliveries flow through one
//! control loop, so there is nothing to lock and a consistent global order
//! holds across every operation. A peer whose socket has died or stalled is
//! evicted on the first failed delivery without disturbing the others.
//!
//! The crate ships two layers:
//! - [`hub`] — the broadcast engine: register/unregister/broadcast over a
//!   cloneable [`Hub`] handle, usable with any transport via
//!   [`Connection::from_parts`].
//! - [`gateway`] + [`server`] — an axum WebSocket endpoint and server
//!   bootstrap wiring the hub to real peers behind a protocol-version gate
//!   and a pluggable bearer-token check.

pub mod config;
pub mod connection;
pub mod gateway;
pub mod hub;
pub mod logging;
pub mod server;
pub mod types;

pub use config::{ConfigError, HubConfig, ServerConfig};
pub use connection::{Connection, OutboundFrame};
pub use gateway::{AccessValidator, GatewayState, SharedSecretValidator, PROTOCOL_VERSION};
pub use hub::{Hub, HubStats};
pub use logging::{init_logging, log_shutdown_info, log_startup_info, LoggingConfig};
pub use server::{serve, ServerError};
pub use types::{ConnectionId, DeliveryError, HubError, HubResult};

//! WebSocket gateway: authenticates inbound connections, hands them to the
//! hub, and bridges their inbound frames into broadcasts.
//!
//! The gateway owns each connection's read loop. Writing to peers is the
//! hub's job alone — after registration the gateway never touches the
//! socket's write half.

use crate::connection::Connection;
use crate::hub::Hub;
use crate::types::ConnectionId;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Protocol version clients must request on the upgrade URL.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Validates bearer tokens before a connection is upgraded.
///
/// Token issuance and verification live upstream; the gateway only asks the
/// injected validator whether to admit the peer. Deployments plug their
/// token service in here.
#[async_trait]
pub trait AccessValidator: Send + Sync {
    async fn validate(&self, token: &str) -> bool;
}

/// Shared-secret validator for single-tenant deployments.
#[derive(Debug, Clone)]
pub struct SharedSecretValidator {
    secret: String,
}

impl SharedSecretValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Read the secret from the `ACCESS_TOKEN` environment variable.
    pub fn from_env() -> Result<Self, crate::config::ConfigError> {
        match std::env::var("ACCESS_TOKEN") {
            Ok(secret) if !secret.is_empty() => Ok(Self::new(secret)),
            _ => Err(crate::config::ConfigError::validation_failed(
                "ACCESS_TOKEN must be set to a non-empty value",
            )),
        }
    }
}

#[async_trait]
impl AccessValidator for SharedSecretValidator {
    async fn validate(&self, token: &str) -> bool {
        token == self.secret
    }
}

/// State shared by every gateway route.
#[derive(Clone)]
pub struct GatewayState {
    pub hub: Hub,
    pub validator: Arc<dyn AccessValidator>,
}

impl GatewayState {
    pub fn new(hub: Hub, validator: Arc<dyn AccessValidator>) -> Self {
        Self { hub, validator }
    }
}

/// WebSocket routes, to be merged into the server router.
pub fn routes() -> Router<GatewayState> {
    Router::new().route("/ws/chat/:id", get(chat_socket))
}

#[derive(Debug, Deserialize)]
struct ProtocolQuery {
    v: Option<String>,
}

/// Upgrade handler for `/ws/chat/:id`.
///
/// Gate order: protocol version, upgrade header, bearer token. A connection
/// reaches the hub only after passing all three.
async fn chat_socket(
    State(state): State<GatewayState>,
    Path(topic): Path<String>,
    Query(query): Query<ProtocolQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if query.v.as_deref() != Some(PROTOCOL_VERSION) {
        return reject(StatusCode::NOT_FOUND, "unsupported protocol version");
    }

    let Some(ws) = ws else {
        return reject(StatusCode::UPGRADE_REQUIRED, "websocket upgrade required");
    };

    let Some(token) = bearer_token(&headers) else {
        return reject(StatusCode::UNAUTHORIZED, "missing bearer token");
    };

    if !state.validator.validate(token).await {
        warn!(topic, "rejected connection with invalid access token");
        return reject(StatusCode::UNAUTHORIZED, "invalid access token");
    }

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, topic, hub))
}

/// Per-connection read loop. Runs until the peer disconnects or errors,
/// then unregisters exactly once.
async fn handle_socket(socket: WebSocket, topic: String, hub: Hub) {
    let (connection, mut inbound) = Connection::attach(socket, topic.clone(), hub.config());
    let id = connection.id();

    if hub.register(connection).await.is_err() {
        debug!(connection = %id, "hub rejected registration, dropping connection");
        return;
    }
    info!(connection = %id, topic, "peer connected");

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if hub.broadcast(topic.as_str(), text.into_bytes()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(payload)) => {
                if hub.broadcast(topic.as_str(), payload).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the protocol layer.
            Ok(_) => {}
            Err(err) => {
                debug!(connection = %id, error = %err, "read failed");
                break;
            }
        }
    }

    unregister(&hub, id).await;
    info!(connection = %id, topic, "peer disconnected");
}

async fn unregister(hub: &Hub, id: ConnectionId) {
    if let Err(err) = hub.unregister(id).await {
        debug!(connection = %id, error = %err, "unregister failed");
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn shared_secret_validator_accepts_only_its_secret() {
        let validator = SharedSecretValidator::new("s3cret");
        assert!(validator.validate("s3cret").await);
        assert!(!validator.validate("wrong").await);
        assert!(!validator.validate("").await);
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }
}

//! Connection handle and the writer task that owns the socket sink.

use crate::config::HubConfig;
use crate::types::{ConnectionId, DeliveryError};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::debug;

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// An opaque payload to deliver to the peer.
    Payload(Vec<u8>),
    /// Ask the writer task to close the socket and exit.
    Close,
}

/// Handle to one persistent bidirectional channel to a peer.
///
/// The handle carries the connection's identity, its topic tag, and the
/// sending side of the writer task's frame buffer. Once registered with the
/// hub, the hub is the only component that writes through it; the gateway
/// keeps the read half of the socket and must not write to the peer itself.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    topic: String,
    outbound: mpsc::Sender<OutboundFrame>,
    send_timeout: Duration,
}

impl Connection {
    /// Wrap an upgraded WebSocket: split it, spawn the writer task, and
    /// return the connection handle together with the read half for the
    /// gateway's read loop.
    pub fn attach(
        socket: WebSocket,
        topic: impl Into<String>,
        config: &HubConfig,
    ) -> (Self, SplitStream<WebSocket>) {
        let (sink, stream) = socket.split();
        let (outbound, frames) = mpsc::channel(config.outbound_buffer);
        let id = ConnectionId::new();

        tokio::spawn(write_frames(id, sink, frames));

        let connection = Self {
            id,
            topic: topic.into(),
            outbound,
            send_timeout: config.send_timeout(),
        };
        (connection, stream)
    }

    /// Build a connection around an arbitrary outbound sender.
    ///
    /// For embedding the hub over transports other than the bundled gateway:
    /// the caller supplies the identity and owns whatever task drains the
    /// receiving side.
    pub fn from_parts(
        id: ConnectionId,
        topic: impl Into<String>,
        outbound: mpsc::Sender<OutboundFrame>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            id,
            topic: topic.into(),
            outbound,
            send_timeout,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The topic tag fixed at accept time. May be empty ("untagged").
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Attempt one bounded delivery to the peer.
    ///
    /// Fails when the writer task is gone or when the peer's buffer stays
    /// full past the per-send timeout. Either failure means the hub evicts
    /// this connection.
    pub(crate) async fn send(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        match time::timeout(
            self.send_timeout,
            self.outbound.send(OutboundFrame::Payload(payload)),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    /// Best-effort close of the underlying resource.
    ///
    /// Asks the writer task to emit a Close frame and exit. Never fails: if
    /// the buffer is full or the task is already gone the socket is on its
    /// way down anyway.
    pub(crate) fn close(&self) {
        let _ = self.outbound.try_send(OutboundFrame::Close);
    }
}

/// Writer task: sole owner of the socket sink.
///
/// Exits on sink error, on an explicit Close request, or when every sender
/// is dropped; sends a Close frame on the way out while the sink still works.
async fn write_frames(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = frames.recv().await {
        match frame {
            OutboundFrame::Payload(bytes) => {
                if let Err(err) = sink.send(Message::Binary(bytes)).await {
                    debug!(connection = %id, error = %err, "socket write failed");
                    return;
                }
            }
            OutboundFrame::Close => break,
        }
    }

    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::from("connection closed"),
        })))
        .await;
    debug!(connection = %id, "writer task finished");
}

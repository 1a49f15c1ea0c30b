//! Per-socket plumbing: the outbound writer task and the inbound adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use roomcast_core::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SocketConfig;
use crate::rooms::{ClientConnection, ConnectionHandle, Inbound, InboundStream};

/// Upper bound on the closing handshake once the writer is done.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A split WebSocket wired to a [`ClientConnection`].
pub struct AttachedSocket {
    /// Handle that queues frames for the writer task.
    pub connection: Arc<ClientConnection>,
    /// Inbound side, reports `Disconnected` once `cancel` fires.
    pub inbound: WsInbound,
    /// The writer task. Finishes promptly after `cancel` fires.
    pub writer: JoinHandle<()>,
    /// Cancelled when either side of the socket is finished.
    pub cancel: CancellationToken,
}

/// Split `socket`, start its writer and return both halves.
///
/// `cancel` should be a child of the server shutdown token. Closing the
/// returned connection cancels it too.
pub fn attach(
    socket: WebSocket,
    config: &SocketConfig,
    cancel: CancellationToken,
) -> AttachedSocket {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(config.max_send_queue);
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), tx, cancel.clone()));

    let writer = tokio::spawn(run_writer(
        sink,
        rx,
        connection.clone(),
        config.clone(),
        cancel.clone(),
    ));
    let inbound = WsInbound {
        stream,
        connection: connection.clone(),
        cancel: cancel.clone(),
    };

    AttachedSocket {
        connection,
        inbound,
        writer,
        cancel,
    }
}

/// Forward queued frames to the socket and send periodic Pings.
///
/// Stops on cancellation, on a write error, when every sender is gone, or
/// when no Pong arrived within the heartbeat timeout. Every write races
/// `cancel`, so a peer that stops reading cannot hold the task. Always
/// cancels `cancel` on exit so the inbound side observes the disconnect.
async fn run_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    connection: Arc<ClientConnection>,
    config: SocketConfig,
    cancel: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(config.heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(text) => Message::Text(text.to_string().into()),
                None => break,
            },
            _ = ping_interval.tick() => {
                if !connection.check_alive()
                    && connection.last_pong_elapsed() > config.heartbeat_timeout
                {
                    warn!(
                        conn_id = %connection.id(),
                        "client unresponsive for {:?}, disconnecting",
                        config.heartbeat_timeout
                    );
                    break;
                }
                Message::Ping(Vec::new().into())
            }
        };

        let written = tokio::select! {
            () = cancel.cancelled() => break,
            result = sink.send(frame) => result,
        };
        if written.is_err() {
            debug!(conn_id = %connection.id(), "socket write failed");
            break;
        }
    }

    cancel.cancel();
    let closing = async {
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
        debug!(conn_id = %connection.id(), "close handshake timed out");
    }
}

/// Inbound adapter over the read half of a WebSocket.
pub struct WsInbound {
    stream: SplitStream<WebSocket>,
    connection: Arc<ClientConnection>,
    cancel: CancellationToken,
}

#[async_trait]
impl InboundStream for WsInbound {
    async fn next_inbound(&mut self) -> Inbound {
        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => return Inbound::Disconnected,
                frame = self.stream.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    self.connection.mark_alive();
                    return Inbound::Text(text.to_string());
                }
                // Some clients send JSON as binary frames
                Some(Ok(Message::Binary(data))) => {
                    self.connection.mark_alive();
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Inbound::Text(text),
                        Err(_) => {
                            debug!(
                                conn_id = %self.connection.id(),
                                len = data.len(),
                                "ignoring non-UTF8 binary frame"
                            );
                        }
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => self.connection.mark_alive(),
                Some(Ok(Message::Close(_))) | None => {
                    debug!(conn_id = %self.connection.id(), "client closed connection");
                    return Inbound::Disconnected;
                }
                Some(Err(error)) => {
                    debug!(conn_id = %self.connection.id(), %error, "socket read failed");
                    return Inbound::Disconnected;
                }
            }
        }
    }
}

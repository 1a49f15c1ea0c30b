//! Connection handles: the registry's view of one live client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use roomcast_core::{ConnectionId, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Something a room can deliver text frames to.
///
/// Identity is the [`ConnectionId`]; a room never holds two handles with the
/// same id.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Stable identity of this connection.
    fn id(&self) -> &ConnectionId;

    /// Deliver one serialized envelope.
    async fn send(&self, text: Arc<str>) -> Result<(), TransportError>;

    /// Tear the connection down. Idempotent.
    fn close(&self);

    /// Resolves once [`close`](Self::close) was called or the transport
    /// went away on its own.
    async fn closed(&self);
}

/// A connected client whose frames are written by a separate writer task.
pub struct ClientConnection {
    id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    /// Cancelled when either side of the connection is finished.
    cancel: CancellationToken,
    /// Whether the client has responded since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
}

impl ClientConnection {
    /// Create a connection feeding `tx`, torn down through `cancel`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>, cancel: CancellationToken) -> Self {
        Self {
            id,
            tx,
            cancel,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    /// Create a connection with a fresh id and a channel of `capacity` frames.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self::new(ConnectionId::new(), tx, CancellationToken::new());
        (Arc::new(conn), rx)
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectionHandle for ClientConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send(&self, text: Arc<str>) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx.send(text).await.map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

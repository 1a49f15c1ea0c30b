//! WebSocket transport for room and echo sessions.
//!
//! Each upgraded socket gets a [`ClientConnection`](crate::rooms::ClientConnection)
//! backed by a bounded queue and a writer task that also runs the heartbeat.
//! The session itself only sees [`ConnectionHandle`] and
//! [`InboundStream`](crate::rooms::InboundStream).

pub mod socket;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::WebSocket;
use metrics::{counter, gauge};
use roomcast_settings::ServerSettings;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::rooms::{ConnectionHandle, RoomContext, run_echo_session, run_room_session};

/// Transport limits for one socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketConfig {
    /// Outbound frames queued before sends start waiting.
    pub max_send_queue: usize,
    /// Interval between server Pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered gone.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerSettings> for SocketConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            max_send_queue: settings.max_send_queue,
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_timeout: settings.heartbeat_timeout(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

/// Counts open WebSocket connections across both endpoints.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicUsize,
}

impl ConnectionTracker {
    /// Create a tracker with no open connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection on `endpoint`; dropping the guard records
    /// its disconnect.
    pub fn open(self: &Arc<Self>, endpoint: &'static str) -> ConnectionGuard {
        let _ = self.active.fetch_add(1, Ordering::Relaxed);
        counter!(WS_CONNECTIONS_TOTAL, "endpoint" => endpoint).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        ConnectionGuard {
            tracker: self.clone(),
            endpoint,
        }
    }

    /// Connections currently open.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// One open connection held by a [`ConnectionTracker`].
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    endpoint: &'static str,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.tracker.active.fetch_sub(1, Ordering::Relaxed);
        counter!(WS_DISCONNECTIONS_TOTAL, "endpoint" => self.endpoint).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

/// Run a room session over an upgraded socket.
pub async fn serve_room(
    socket: WebSocket,
    room_id: String,
    ctx: RoomContext,
    config: SocketConfig,
    cancel: CancellationToken,
    tracker: Arc<ConnectionTracker>,
) {
    let _guard = tracker.open("room");
    let attached = socket::attach(socket, &config, cancel);
    let conn_id = attached.connection.id().clone();
    info!(%conn_id, room_id, "client connected");

    let summary = run_room_session(&ctx, room_id, attached.connection, attached.inbound).await;

    attached.cancel.cancel();
    let _ = attached.writer.await;
    info!(%conn_id, relayed = summary.relayed, "client disconnected");
}

/// Run an echo session over an upgraded socket.
pub async fn serve_echo(
    socket: WebSocket,
    ctx: RoomContext,
    config: SocketConfig,
    cancel: CancellationToken,
    tracker: Arc<ConnectionTracker>,
) {
    let _guard = tracker.open("echo");
    let attached = socket::attach(socket, &config, cancel);
    let conn_id = attached.connection.id().clone();
    info!(%conn_id, "echo client connected");

    let echoed = run_echo_session(&ctx, attached.connection, attached.inbound).await;

    attached.cancel.cancel();
    let _ = attached.writer.await;
    info!(%conn_id, echoed, "echo client disconnected");
}

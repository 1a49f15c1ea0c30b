//! `RoomcastServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use roomcast_settings::ServerSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::rooms::{RoomContext, RoomRegistry, RoomSummary};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{self, ConnectionTracker, SocketConfig};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Room membership and fan-out.
    pub context: RoomContext,
    /// Shutdown coordinator; every socket runs under a child token.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// Per-socket transport limits.
    pub socket: SocketConfig,
    /// Largest inbound message accepted.
    pub max_message_size: usize,
    /// Open WebSocket connections.
    pub connections: Arc<ConnectionTracker>,
}

/// The roomcast server.
pub struct RoomcastServer {
    config: ServerSettings,
    context: RoomContext,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
    connections: Arc<ConnectionTracker>,
}

impl RoomcastServer {
    /// Create a server with its own empty registry.
    pub fn new(config: ServerSettings, metrics: PrometheusHandle) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let context = RoomContext::new(registry, config.send_timeout());
        Self {
            config,
            context,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
            connections: Arc::new(ConnectionTracker::new()),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            context: self.context.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            socket: SocketConfig::from(&self.config),
            max_message_size: self.config.max_message_size,
            connections: self.connections.clone(),
        };

        Router::new()
            .route("/ws/chat/{room_id}", get(chat_ws_handler))
            .route("/ws/echo", get(echo_ws_handler))
            .route("/health", get(health_handler))
            .route("/rooms", get(rooms_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "roomcast server listening");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerSettings {
        &self.config
    }
}

/// GET /ws/chat/{room_id}
async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let cancel = state.shutdown.child_token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            websocket::serve_room(
                socket,
                room_id,
                state.context,
                state.socket,
                cancel,
                state.connections,
            )
        })
}

/// GET /ws/echo
async fn echo_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let cancel = state.shutdown.child_token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            websocket::serve_echo(
                socket,
                state.context,
                state.socket,
                cancel,
                state.connections,
            )
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.active(),
        state.context.registry.room_count(),
    ))
}

/// GET /rooms
async fn rooms_handler(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.context.registry.rooms())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
}

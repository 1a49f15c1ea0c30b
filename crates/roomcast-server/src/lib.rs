//! # roomcast-server
//!
//! Room-scoped WebSocket fan-out.
//!
//! - Rooms: a concurrent registry of member handles, created on first join
//!   and deleted when the last member leaves
//! - Broadcasting: one snapshot, concurrent bounded sends, eviction of members
//!   whose send failed
//! - Sessions: join notice, chat relay, leave notice; plus an echo endpoint
//! - HTTP endpoints: health, room listing, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod health;
pub mod metrics;
pub mod rooms;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use server::RoomcastServer;

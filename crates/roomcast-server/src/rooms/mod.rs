//! Rooms: membership, fan-out and per-connection sessions.
//!
//! - [`connection`]: the handle a room delivers frames to
//! - [`registry`]: room id to member set, rooms exist only while non-empty
//! - [`broadcast`]: snapshot, concurrent fan-out, eviction of failed members
//! - [`session`]: room session lifecycle (join, relay, leave)
//! - [`echo`]: single-connection echo session
//! - [`inbound`]: transport-agnostic inbound frames

pub mod broadcast;
pub mod connection;
pub mod context;
pub mod echo;
pub mod inbound;
pub mod registry;
pub mod session;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use connection::{ClientConnection, ConnectionHandle};
pub use context::RoomContext;
pub use echo::run_echo_session;
pub use inbound::{Inbound, InboundStream};
pub use registry::{RoomRegistry, RoomSummary};
pub use session::{SessionState, SessionSummary, run_room_session};

//! Shared dependencies handed to every session.

use std::sync::Arc;
use std::time::Duration;

use roomcast_core::MessageIdGenerator;

use super::broadcast::Broadcaster;
use super::registry::RoomRegistry;

/// Everything a session needs, cheap to clone per connection.
#[derive(Clone)]
pub struct RoomContext {
    /// Room membership.
    pub registry: Arc<RoomRegistry>,
    /// Fan-out over `registry`.
    pub broadcaster: Broadcaster,
    /// Chat message id source shared by all rooms.
    pub message_ids: Arc<MessageIdGenerator>,
}

impl RoomContext {
    /// Build a context over `registry` with the given per-send timeout.
    pub fn new(registry: Arc<RoomRegistry>, send_timeout: Duration) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry.clone(), send_timeout),
            registry,
            message_ids: Arc::new(MessageIdGenerator::new()),
        }
    }
}

//! Typed messages sent to clients.
//!
//! Every envelope is serialized once into a single-line JSON object whose
//! `type` field names the event kind. The timestamp is captured when the
//! envelope is built, not when it is sent.

use serde::{Deserialize, Serialize};

use crate::clock::now_timestamp;

/// A message delivered to one or more connections as one text frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Private welcome sent only to a connection that just joined a room.
    System {
        /// Human-readable notice.
        message: String,
        /// Construction time (RFC 3339).
        timestamp: String,
        /// Room the connection joined.
        room_id: String,
    },
    /// Broadcast to a room when a connection joins it.
    UserJoined {
        /// Human-readable notice.
        message: String,
        /// Construction time (RFC 3339).
        timestamp: String,
        /// Room that gained a member.
        room_id: String,
        /// Live member count when the envelope was built.
        user_count: usize,
    },
    /// Broadcast to a room when a connection leaves it.
    UserLeft {
        /// Human-readable notice.
        message: String,
        /// Construction time (RFC 3339).
        timestamp: String,
        /// Room that lost a member.
        room_id: String,
        /// Live member count when the envelope was built.
        user_count: usize,
    },
    /// A relayed chat message enriched with server metadata.
    ChatMessage {
        /// Sender label supplied by the client (or `"Anonymous"`).
        user: String,
        /// Message body supplied by the client (or empty).
        message: String,
        /// Construction time (RFC 3339).
        timestamp: String,
        /// Room the message was relayed in.
        room_id: String,
        /// Server-assigned message id.
        id: u64,
    },
    /// Reply to the originating connection on the echo endpoint.
    Echo {
        /// The frame exactly as received.
        original: String,
        /// Construction time (RFC 3339).
        timestamp: String,
        /// `"Echo: "` followed by the original frame.
        message: String,
    },
}

impl Envelope {
    /// Welcome notice for a connection entering `room_id`.
    pub fn system(room_id: &str) -> Self {
        Self::System {
            message: format!("Connected to room {room_id}"),
            timestamp: now_timestamp(),
            room_id: room_id.to_owned(),
        }
    }

    /// Join notice carrying the room's current member count.
    pub fn user_joined(room_id: &str, user_count: usize) -> Self {
        Self::UserJoined {
            message: "A user joined the room".to_owned(),
            timestamp: now_timestamp(),
            room_id: room_id.to_owned(),
            user_count,
        }
    }

    /// Leave notice carrying the room's remaining member count.
    pub fn user_left(room_id: &str, user_count: usize) -> Self {
        Self::UserLeft {
            message: "A user left the room".to_owned(),
            timestamp: now_timestamp(),
            room_id: room_id.to_owned(),
            user_count,
        }
    }

    /// Chat relay with a server timestamp and id.
    pub fn chat_message(
        user: impl Into<String>,
        message: impl Into<String>,
        room_id: &str,
        id: u64,
    ) -> Self {
        Self::ChatMessage {
            user: user.into(),
            message: message.into(),
            timestamp: now_timestamp(),
            room_id: room_id.to_owned(),
            id,
        }
    }

    /// Echo reply wrapping the received frame.
    pub fn echo(original: &str) -> Self {
        Self::Echo {
            original: original.to_owned(),
            timestamp: now_timestamp(),
            message: format!("Echo: {original}"),
        }
    }

    /// Wire name of the event kind (the `type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::ChatMessage { .. } => "chat_message",
            Self::Echo { .. } => "echo",
        }
    }

    /// Serialize to a single-line JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

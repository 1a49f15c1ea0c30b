//! Room session lifecycle: one connection from join through leave.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use roomcast_core::{ChatPayload, ConnectionId, Envelope};
use tracing::{debug, info, instrument, warn};

use super::connection::ConnectionHandle;
use super::context::RoomContext;
use super::inbound::{Inbound, InboundStream};
use crate::metrics::CHAT_MESSAGES_TOTAL;

/// Where a room session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, not yet a member.
    Connecting,
    /// Member of the room, welcome sent.
    Joined,
    /// Relaying chat payloads.
    Relaying,
    /// Removed from the room. Terminal.
    Left,
}

impl SessionState {
    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Joined => "joined",
            Self::Relaying => "relaying",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished room session did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    /// Room the session joined.
    pub room_id: String,
    /// The session's connection.
    pub connection_id: ConnectionId,
    /// Chat messages relayed from this connection.
    pub relayed: u64,
    /// Final state (always [`SessionState::Left`]).
    pub state: SessionState,
}

/// Run a room session for a connected client.
///
/// 1. Joins `room_id` and privately sends a `system` welcome
/// 2. Broadcasts `user_joined` to the room, newcomer included
/// 3. Relays every inbound payload as a `chat_message` broadcast
/// 4. On disconnect, leaves the room and broadcasts `user_left`
///
/// A failed welcome send skips straight to step 4. So does eviction: the
/// broadcaster closes an evicted connection, which ends the relay loop even
/// while the transport is still delivering inbound frames.
#[instrument(skip_all, fields(room_id = %room_id, conn_id = %connection.id()))]
pub async fn run_room_session<I: InboundStream>(
    ctx: &RoomContext,
    room_id: String,
    connection: Arc<dyn ConnectionHandle>,
    mut inbound: I,
) -> SessionSummary {
    let connection_id = connection.id().clone();
    let mut state = SessionState::Connecting;
    let mut relayed = 0u64;

    let member_count = ctx.registry.join(&room_id, connection.clone());
    info!(member_count, "joined room");

    match ctx
        .broadcaster
        .send_to(connection.as_ref(), &Envelope::system(&room_id))
        .await
    {
        Ok(()) => {
            state = SessionState::Joined;
            let count = ctx.registry.member_count(&room_id);
            let notice = Envelope::user_joined(&room_id, count);
            let _ = ctx.broadcaster.broadcast(&room_id, &notice).await;
        }
        Err(error) => {
            warn!(%error, "failed to send welcome, leaving room");
        }
    }

    if state == SessionState::Joined {
        state = SessionState::Relaying;
        loop {
            let next = tokio::select! {
                biased;
                () = connection.closed() => Inbound::Disconnected,
                next = inbound.next_inbound() => next,
            };
            let Inbound::Text(text) = next else { break };

            let payload = ChatPayload::from_text(&text);
            let envelope = Envelope::chat_message(
                payload.user,
                payload.message,
                &room_id,
                ctx.message_ids.next_id(),
            );
            let report = ctx.broadcaster.broadcast(&room_id, &envelope).await;
            relayed += 1;
            counter!(CHAT_MESSAGES_TOTAL).increment(1);
            debug!(
                delivered = report.delivered,
                evicted = report.evicted,
                "relayed chat message"
            );
        }
    }

    debug!(from = %state, "session ending");
    state = SessionState::Left;
    let remaining = ctx.registry.leave(&room_id, &connection_id);
    let notice = Envelope::user_left(&room_id, remaining);
    let report = ctx.broadcaster.broadcast(&room_id, &notice).await;
    info!(remaining, recipients = report.recipients, relayed, "left room");

    SessionSummary {
        room_id,
        connection_id,
        relayed,
        state,
    }
}

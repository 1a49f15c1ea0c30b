//! Echo session: every inbound frame is sent straight back.

use std::sync::Arc;

use roomcast_core::Envelope;
use tracing::{debug, info, instrument};

use super::connection::ConnectionHandle;
use super::context::RoomContext;
use super::inbound::{Inbound, InboundStream};

/// Run an echo session until the client disconnects, the connection is
/// closed, or a reply fails.
///
/// The connection never joins a room. Returns the number of echoes sent.
#[instrument(skip_all, fields(conn_id = %connection.id()))]
pub async fn run_echo_session<I: InboundStream>(
    ctx: &RoomContext,
    connection: Arc<dyn ConnectionHandle>,
    mut inbound: I,
) -> u64 {
    let mut echoed = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            () = connection.closed() => Inbound::Disconnected,
            next = inbound.next_inbound() => next,
        };
        let Inbound::Text(text) = next else { break };
        if let Err(error) = ctx
            .broadcaster
            .send_to(connection.as_ref(), &Envelope::echo(&text))
            .await
        {
            debug!(%error, "echo reply failed");
            break;
        }
        echoed += 1;
    }
    info!(echoed, "echo session closed");
    echoed
}

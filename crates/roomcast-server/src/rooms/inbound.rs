//! Transport-agnostic inbound frame source.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// The next thing a session sees from its client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// One text payload.
    Text(String),
    /// The client is gone: closed, errored, timed out or shut down.
    Disconnected,
}

/// A source of inbound frames for one connection.
///
/// Once `Disconnected` has been returned the source is finished; sessions
/// stop calling it.
#[async_trait]
pub trait InboundStream: Send {
    /// Wait for the next inbound frame.
    async fn next_inbound(&mut self) -> Inbound;
}

#[async_trait]
impl InboundStream for mpsc::Receiver<String> {
    async fn next_inbound(&mut self) -> Inbound {
        self.recv().await.map_or(Inbound::Disconnected, Inbound::Text)
    }
}

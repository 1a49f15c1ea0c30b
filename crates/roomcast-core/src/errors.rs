//! Transport error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// A send or receive failure on one connection.
///
/// Always recovered locally: the broadcaster evicts the recipient, a session
/// terminates. Never propagated to other connections.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection's outbound side is gone (writer task exited, socket closed).
    #[error("connection closed")]
    Closed,
    /// The send did not complete within the allowed time.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Timeout(_) => "timeout",
        }
    }
}

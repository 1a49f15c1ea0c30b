//! # roomcast-core
//!
//! Shared building blocks for the roomcast fan-out server.
//!
//! - [`envelope`]: the typed, single-line JSON messages sent to clients
//! - [`inbound`]: lenient parsing of client chat payloads
//! - [`ids`]: connection identifiers
//! - [`clock`]: envelope timestamps and the chat message id generator
//! - [`errors`]: transport error taxonomy
//! - [`logging`]: `tracing` subscriber bootstrap and test log capture

#![deny(unsafe_code)]

pub mod clock;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod inbound;
pub mod logging;

pub use clock::{MessageIdGenerator, now_timestamp};
pub use envelope::Envelope;
pub use errors::TransportError;
pub use ids::ConnectionId;
pub use inbound::{ChatPayload, PayloadError};

//! Switchboard endpoints.
//!
//! An [`Endpoint`] is one named connection from an execution context to the
//! hub. It opens a channel, handshakes (retrying until the hub answers),
//! queues anything sent before the handshake completes, and correlates
//! responses with requests through per-endpoint callback ids.

mod connection;
mod pending;
mod probe;
mod types;

pub use connection::Endpoint;
pub use probe::{ContextProbe, ProbeFut, StaticProbe};
pub use types::{
    ConnectionState, DEFAULT_CLEANUP_BATCH, DEFAULT_PENDING_HIGH_WATER, DEFAULT_RETRY_INTERVAL_MS,
    EndpointConfig, EndpointError, EndpointStats, IncomingMessage, MessageHandler, NoHandler,
    PendingResponse, Responder, SendError,
};

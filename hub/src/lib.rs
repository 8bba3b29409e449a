//! The Switchboard hub.
//!
//! Runs in the hub-role context. It owns the registry of live protocol
//! channels, answers handshakes, and relays every MESSAGE and RESPONSE to the
//! channels its address resolves to. Nothing is delivered to a channel that
//! has not completed its handshake.

mod hub;
mod registry;

pub use hub::{ConnectionCallback, ConnectionEvent, Hub, HubHandle, HubOptions};
pub use registry::RegistrationInfo;

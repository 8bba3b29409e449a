//! Transport channels for Switchboard.
//!
//! A [`Channel`] is one end of a named, duplex, in-order pipe carrying JSON
//! frames. The host application normally creates channels; this crate also
//! provides the in-memory loopback pair ([`channel_pair`]) used whenever a
//! context has to talk to the hub living in the same process.

mod channel;
mod connect;

pub use channel::{Channel, ChannelId, ChannelSink, ChannelStream, Frame, TransportError, channel_pair};
pub use connect::{Acceptor, AcceptorSlot, Connector, LoopbackConnector, SlotOccupied};

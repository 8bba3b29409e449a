//! Opening channels toward the hub.

use std::fmt;
use std::sync::{Arc, OnceLock};

use switchboard_types::SenderInfo;
use thiserror::Error;

use crate::channel::{Channel, TransportError, channel_pair};

/// Opens named channels on behalf of an endpoint.
///
/// Each call returns the endpoint's end of a fresh channel. Failures are
/// reported but the caller is expected to retry on its own schedule.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, name: &str) -> Result<Channel, TransportError>;
}

/// Receives the far end of channels opened by peers.
///
/// Returns the channel back when it is not interested in it.
pub trait Acceptor: Send + Sync + 'static {
    fn accept(&self, channel: Channel) -> Result<(), Channel>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("an acceptor is already installed")]
pub struct SlotOccupied;

/// Late-bound place where the hub registers itself as the acceptor.
///
/// Connectors hold a clone from the start; channels offered before anything
/// is installed are refused.
#[derive(Clone, Default)]
pub struct AcceptorSlot(Arc<OnceLock<Arc<dyn Acceptor>>>);

impl AcceptorSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, acceptor: Arc<dyn Acceptor>) -> Result<(), SlotOccupied> {
        self.0.set(acceptor).map_err(|_| SlotOccupied)
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.0.get().is_some()
    }

    /// Hand a channel to the installed acceptor, or return it.
    pub fn offer(&self, channel: Channel) -> Result<(), Channel> {
        match self.0.get() {
            Some(acceptor) => acceptor.accept(channel),
            None => Err(channel),
        }
    }
}

impl fmt::Debug for AcceptorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptorSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// In-process connector: builds a loopback pair and offers the far end to
/// whatever acceptor sits in the slot.
///
/// If nobody accepts, the far end is dropped and the attempt is refused; the
/// endpoint retries on its own schedule.
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    slot: AcceptorSlot,
    sender: SenderInfo,
}

impl LoopbackConnector {
    #[must_use]
    pub fn new(slot: AcceptorSlot, sender: SenderInfo) -> Self {
        Self { slot, sender }
    }

    #[must_use]
    pub fn sender(&self) -> &SenderInfo {
        &self.sender
    }
}

impl Connector for LoopbackConnector {
    fn connect(&self, name: &str) -> Result<Channel, TransportError> {
        let (near, far) = channel_pair(name, self.sender.clone());
        if let Err(far) = self.slot.offer(far) {
            tracing::debug!(name, channel = %far.id(), "no acceptor took the channel");
            return Err(TransportError::Refused {
                name: name.to_string(),
                reason: "no hub is accepting channels".to_string(),
            });
        }
        Ok(near)
    }
}

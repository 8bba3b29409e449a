//! Public types consumed by endpoint users.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_types::{AddressError, CallbackId, InstanceKey, NameError, Origin, Role, SenderInfo};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::connection::Command;

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 500;
pub const DEFAULT_PENDING_HIGH_WATER: usize = 100_000;
pub const DEFAULT_CLEANUP_BATCH: u64 = 5_000;

/// Tunables for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// How long to wait for INIT_ACK before reopening the channel.
    pub retry_interval_ms: u64,
    /// Unanswered requests tolerated before a sweep.
    pub pending_high_water: usize,
    /// How many of the oldest unanswered requests one sweep drops.
    pub cleanup_batch: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            pending_high_water: DEFAULT_PENDING_HIGH_WATER,
            cleanup_batch: DEFAULT_CLEANUP_BATCH,
        }
    }
}

impl EndpointConfig {
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Discovering the instance key, no channel yet.
    Connecting,
    /// INIT sent, waiting for the hub to acknowledge.
    AwaitingAck,
    Ready,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingAck => "awaiting_ack",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStats {
    pub state: ConnectionState,
    /// Requests still waiting for a response.
    pub pending: usize,
    /// Envelopes held back until the handshake completes.
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("connection does not exist anymore, was it disconnected?")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error(transparent)]
    InvalidName(#[from] NameError),
}

/// Receives MESSAGE envelopes addressed to an endpoint.
///
/// Called on the endpoint's task; keep it short and hand heavy work off.
/// The responder can be moved elsewhere and used later.
pub trait MessageHandler: Send + 'static {
    fn on_message(&mut self, message: IncomingMessage);
}

impl<F> MessageHandler for F
where
    F: FnMut(IncomingMessage) + Send + 'static,
{
    fn on_message(&mut self, message: IncomingMessage) {
        self(message);
    }
}

/// Handler for endpoints that only send.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHandler;

impl MessageHandler for NoHandler {
    fn on_message(&mut self, message: IncomingMessage) {
        tracing::trace!(from = %message.from, "message ignored, endpoint has no handler");
    }
}

#[derive(Debug)]
pub struct IncomingMessage {
    pub payload: Value,
    /// `role:name[:instance]` of the original sender.
    pub from: Origin,
    /// Descriptor stamped by the hub.
    pub sender: Option<SenderInfo>,
    pub responder: Responder,
}

/// Where a RESPONSE goes: back to the requester's role, name and instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReplyRoute {
    pub to: Role,
    /// Prefixed name of the requesting channel.
    pub to_name: String,
    pub to_instance: Option<InstanceKey>,
    pub callback_id: CallbackId,
}

/// Answers one incoming message. Consumed on use.
#[derive(Debug)]
pub struct Responder {
    route: Option<ReplyRoute>,
    commands: Option<mpsc::UnboundedSender<Command>>,
}

impl Responder {
    pub(crate) fn new(route: Option<ReplyRoute>, commands: Option<mpsc::UnboundedSender<Command>>) -> Self {
        Self { route, commands }
    }

    /// Whether the sender is waiting for an answer.
    #[must_use]
    pub fn expects_response(&self) -> bool {
        self.route.is_some()
    }

    /// Send `payload` back to the requester. Without a callback id this does
    /// nothing.
    pub fn respond(self, payload: Value) {
        let (Some(route), Some(commands)) = (self.route, self.commands) else {
            return;
        };
        if commands.send(Command::Respond { route, payload }).is_err() {
            tracing::debug!("endpoint gone, response dropped");
        }
    }
}

/// Resolves with the RESPONSE payload for one request.
///
/// Resolves at most once. When no answer can arrive any more (the target
/// never existed, the endpoint disconnected, or the entry was swept) it
/// stays pending; bound the wait with `tokio::time::timeout` if needed.
#[derive(Debug)]
pub struct PendingResponse {
    rx: Option<oneshot::Receiver<Value>>,
}

impl PendingResponse {
    pub(crate) fn new(rx: oneshot::Receiver<Value>) -> Self {
        Self { rx: Some(rx) }
    }
}

impl Future for PendingResponse {
    type Output = Value;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Value> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(value)) => {
                self.rx = None;
                Poll::Ready(value)
            }
            Poll::Ready(Err(_)) => {
                self.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

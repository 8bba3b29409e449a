//! Channel ends and the loopback pair.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use switchboard_types::SenderInfo;
use thiserror::Error;
use tokio::sync::mpsc;

/// What travels over a channel: one JSON object per message.
pub type Frame = serde_json::Value;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one channel end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel '{name}' is closed")]
    Closed { name: String },
    #[error("could not open channel '{name}': {reason}")]
    Refused { name: String, reason: String },
}

/// The writing half of a channel end: name, sender descriptor, `post`, `close`.
#[derive(Debug)]
pub struct ChannelSink {
    id: ChannelId,
    name: Arc<str>,
    sender: SenderInfo,
    tx: mpsc::UnboundedSender<Frame>,
}

impl ChannelSink {
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor of the context that opened the channel.
    #[must_use]
    pub fn sender(&self) -> &SenderInfo {
        &self.sender
    }

    /// Deliver a frame to the other end. Frames arrive in posting order.
    pub fn post(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| {
            tracing::warn!(channel = %self.id, name = %self.name, "post on a closed channel");
            TransportError::Closed {
                name: self.name.to_string(),
            }
        })
    }

    /// Whether the other end has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close this end for writing. The other end's stream finishes once it
    /// has drained the frames already posted.
    pub fn close(self) {
        tracing::trace!(channel = %self.id, name = %self.name, "closing channel");
    }
}

/// The reading half of a channel end. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ChannelStream {
    id: ChannelId,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl ChannelStream {
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The next frame, or `None` once the other end has closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// A frame if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

/// One end of a duplex channel.
#[derive(Debug)]
pub struct Channel {
    sink: ChannelSink,
    stream: ChannelStream,
}

impl Channel {
    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.sink.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.sink.name()
    }

    #[must_use]
    pub fn sender(&self) -> &SenderInfo {
        self.sink.sender()
    }

    pub fn post(&self, frame: Frame) -> Result<(), TransportError> {
        self.sink.post(frame)
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.stream.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.stream.try_recv()
    }

    /// Close both directions of this end.
    pub fn close(self) {
        self.sink.close();
    }

    #[must_use]
    pub fn split(self) -> (ChannelSink, ChannelStream) {
        (self.sink, self.stream)
    }
}

/// Build two linked in-memory channel ends.
///
/// Each end is owned by one side; whatever one end posts, the other receives
/// in order. `sender` describes the context that opened the pair and is
/// reported by both ends.
#[must_use]
pub fn channel_pair(name: &str, sender: SenderInfo) -> (Channel, Channel) {
    let name: Arc<str> = Arc::from(name);
    let (near_tx, far_rx) = mpsc::unbounded_channel();
    let (far_tx, near_rx) = mpsc::unbounded_channel();

    let near_id = ChannelId::next();
    let far_id = ChannelId::next();

    let near = Channel {
        sink: ChannelSink {
            id: near_id,
            name: Arc::clone(&name),
            sender: sender.clone(),
            tx: near_tx,
        },
        stream: ChannelStream {
            id: near_id,
            rx: near_rx,
        },
    };
    let far = Channel {
        sink: ChannelSink {
            id: far_id,
            name,
            sender,
            tx: far_tx,
        },
        stream: ChannelStream {
            id: far_id,
            rx: far_rx,
        },
    };
    (near, far)
}

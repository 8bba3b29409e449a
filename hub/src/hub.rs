//! The relay actor.
//!
//! One task owns the registry. Per-channel reader tasks forward inbound
//! frames and close notifications into the task's queue, so every registry
//! mutation happens on the hub task in arrival order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use switchboard_transport::{Acceptor, Channel, ChannelId, ChannelSink, ChannelStream, Frame};
use switchboard_types::{
    Envelope, EnvelopeKind, InstanceKey, InstanceScope, InstanceSlot, Role, SenderInfo,
    is_protocol_name, strip_prefix,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::registry::{BucketKey, Registry, RegistrationInfo};

/// Reported to the connect/disconnect callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub role: Role,
    /// Unprefixed channel name.
    pub name: String,
    /// `None` for the hub role.
    pub instance: Option<InstanceKey>,
}

pub type ConnectionCallback = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct HubOptions {
    pub on_connect: Option<ConnectionCallback>,
    pub on_disconnect: Option<ConnectionCallback>,
}

impl HubOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_connect(mut self, callback: impl Fn(&ConnectionEvent) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(callback));
        self
    }

    pub fn with_on_disconnect(
        mut self,
        callback: impl Fn(&ConnectionEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for HubOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubOptions")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

enum HubInput {
    Accepted(Channel),
    Frame { id: ChannelId, frame: Frame },
    Closed { id: ChannelId },
    Snapshot(oneshot::Sender<Vec<RegistrationInfo>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cheap handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubInput>,
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle")
            .field("running", &self.is_running())
            .finish()
    }
}

impl HubHandle {
    /// Take ownership of a newly opened channel.
    ///
    /// Channels without the protocol prefix are not ours and come back
    /// untouched, as does everything once the hub has stopped.
    pub fn accept_channel(&self, channel: Channel) -> Result<(), Channel> {
        if !is_protocol_name(channel.name()) {
            return Err(channel);
        }
        if let Err(mpsc::error::SendError(HubInput::Accepted(channel))) =
            self.tx.send(HubInput::Accepted(channel))
        {
            return Err(channel);
        }
        Ok(())
    }

    /// Current registrations, ordered by channel. Empty once stopped.
    pub async fn snapshot(&self) -> Vec<RegistrationInfo> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(HubInput::Snapshot(reply)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Close every channel and stop the hub task.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(HubInput::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl Acceptor for HubHandle {
    fn accept(&self, channel: Channel) -> Result<(), Channel> {
        self.accept_channel(channel)
    }
}

pub struct Hub {
    options: HubOptions,
    registry: Registry,
    /// Accepted channels that have not completed INIT yet.
    handshaking: HashMap<ChannelId, ChannelSink>,
}

impl Hub {
    fn new(options: HubOptions) -> Self {
        Self {
            options,
            registry: Registry::new(),
            handshaking: HashMap::new(),
        }
    }

    /// Start a hub task on the current tokio runtime.
    #[must_use]
    pub fn spawn(options: HubOptions) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();
        tokio::spawn(Self::new(options).run(rx, weak));
        HubHandle { tx }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<HubInput>,
        weak: mpsc::WeakUnboundedSender<HubInput>,
    ) {
        let mut readers: HashMap<ChannelId, JoinHandle<()>> = HashMap::new();

        while let Some(input) = rx.recv().await {
            match input {
                HubInput::Accepted(channel) => {
                    let Some(tx) = weak.upgrade() else {
                        break;
                    };
                    let (sink, stream) = channel.split();
                    readers.insert(sink.id(), spawn_reader(stream, tx));
                    self.adopt(sink);
                }
                HubInput::Frame { id, frame } => self.on_frame(id, frame),
                HubInput::Closed { id } => {
                    readers.remove(&id);
                    self.on_closed(id);
                }
                HubInput::Snapshot(reply) => {
                    let _ = reply.send(self.registry.snapshot());
                }
                HubInput::Shutdown(reply) => {
                    for (_, reader) in readers.drain() {
                        reader.abort();
                    }
                    self.close_all();
                    let _ = reply.send(());
                    break;
                }
            }
        }
        tracing::debug!("hub stopped");
    }

    fn adopt(&mut self, sink: ChannelSink) {
        tracing::debug!(channel = %sink.id(), name = strip_prefix(sink.name()), "accepted channel");
        self.handshaking.insert(sink.id(), sink);
    }

    fn on_frame(&mut self, id: ChannelId, frame: Frame) {
        let envelope = match Envelope::from_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "dropping undecodable frame");
                return;
            }
        };

        match envelope.kind {
            EnvelopeKind::Init => self.on_init(id, &envelope),
            EnvelopeKind::Message | EnvelopeKind::Response => self.relay(id, envelope),
            EnvelopeKind::InitAck => {
                tracing::warn!(channel = %id, "dropping init_ack sent to the hub");
            }
        }
    }

    fn on_init(&mut self, id: ChannelId, envelope: &Envelope) {
        if let Some((_, reg)) = self.registry.find(id) {
            tracing::debug!(channel = %id, "repeated init, acknowledging again");
            ack(&reg.sink);
            return;
        }

        let Some(sink) = self.handshaking.get(&id) else {
            tracing::warn!(channel = %id, "init on an unknown channel");
            return;
        };

        let role = envelope.from;
        let Some(slot) = sender_slot(role, envelope.instance_key, sink.sender()) else {
            tracing::warn!(
                channel = %id,
                role = %role,
                name = strip_prefix(sink.name()),
                "init without an instance key, dropping"
            );
            return;
        };

        let Some(sink) = self.handshaking.remove(&id) else {
            return;
        };
        let event = ConnectionEvent {
            role,
            name: strip_prefix(sink.name()).to_string(),
            instance: slot.instance(),
        };
        tracing::debug!(role = %role, name = %event.name, instance = %slot, "channel registered");

        ack(&sink);
        self.registry.register(BucketKey::new(role, slot), sink);

        if let Some(on_connect) = &self.options.on_connect {
            on_connect(&event);
        }
    }

    fn relay(&mut self, id: ChannelId, mut envelope: Envelope) {
        let Some((registered, reg)) = self.registry.find(id) else {
            tracing::warn!(
                channel = %id,
                kind = envelope.kind.as_str(),
                "relay before handshake, dropping"
            );
            return;
        };
        let sender_info = reg.sink.sender().clone();

        let (to, to_names) = match envelope.routing() {
            Ok((to, names)) => (to, names.to_vec()),
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "dropping envelope");
                return;
            }
        };

        let from = envelope.from;
        let sender_instance = match from.instance_scope() {
            InstanceScope::Singleton => None,
            InstanceScope::Declared => envelope.instance_key.or(registered.slot.instance()),
            InstanceScope::Derived => sender_info.instance_key,
        };

        let target_slot = if to.is_hub() {
            Some(InstanceSlot::Singleton)
        } else if from.is_hub() {
            envelope.to_instance_key.map(InstanceSlot::Key)
        } else {
            sender_instance.map(InstanceSlot::Key)
        };
        let Some(target_slot) = target_slot else {
            tracing::warn!(from = %from, to = %to, "no target instance for relay, dropping");
            return;
        };

        envelope.relayed_from_instance_key = sender_instance;
        envelope.sender = Some(sender_info);

        let frame = match envelope.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "could not encode relayed envelope");
                return;
            }
        };

        let key = BucketKey::new(to, target_slot);
        let resolution = self.registry.resolve(key, &to_names);
        if !resolution.bucket_found {
            tracing::info!(
                role = %to,
                instance = %target_slot,
                "no channels for target, not relaying"
            );
            return;
        }
        for name in &resolution.unmatched {
            tracing::warn!(role = %to, name = strip_prefix(name), "no channel with this name");
        }

        tracing::trace!(
            kind = envelope.kind.as_str(),
            from = %from,
            to = %to,
            instance = %target_slot,
            recipients = resolution.targets.len(),
            "relaying"
        );
        for target in resolution.targets {
            let _ = target.post(frame.clone());
        }
    }

    fn on_closed(&mut self, id: ChannelId) {
        if self.handshaking.remove(&id).is_some() {
            tracing::debug!(channel = %id, "channel closed before handshake");
            return;
        }
        let Some((key, reg)) = self.registry.remove(id) else {
            return;
        };
        let event = ConnectionEvent {
            role: key.role,
            name: strip_prefix(reg.name()).to_string(),
            instance: key.slot.instance(),
        };
        tracing::debug!(role = %event.role, name = %event.name, instance = %key.slot, "channel removed");
        if let Some(on_disconnect) = &self.options.on_disconnect {
            on_disconnect(&event);
        }
    }

    fn close_all(&mut self) {
        for (_, sink) in self.handshaking.drain() {
            sink.close();
        }
        for reg in self.registry.drain() {
            reg.sink.close();
        }
    }
}

fn ack(sink: &ChannelSink) {
    match Envelope::init_ack().to_frame() {
        Ok(frame) => {
            let _ = sink.post(frame);
        }
        Err(e) => tracing::warn!(error = %e, "could not encode init_ack"),
    }
}

/// Bucket slot for a channel: the sentinel for the hub role, the declared key
/// for peers that declare one, the transport's key for derived peers.
fn sender_slot(role: Role, declared: Option<InstanceKey>, sender: &SenderInfo) -> Option<InstanceSlot> {
    match role.instance_scope() {
        InstanceScope::Singleton => Some(InstanceSlot::Singleton),
        InstanceScope::Declared => declared.map(InstanceSlot::Key),
        InstanceScope::Derived => sender.instance_key.map(InstanceSlot::Key),
    }
}

fn spawn_reader(mut stream: ChannelStream, tx: mpsc::UnboundedSender<HubInput>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = stream.id();
        while let Some(frame) = stream.recv().await {
            if tx.send(HubInput::Frame { id, frame }).is_err() {
                return;
            }
        }
        let _ = tx.send(HubInput::Closed { id });
    })
}

//! The endpoint actor: handshake with retry, outbox, and request correlation.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use switchboard_transport::{Channel, Connector, Frame};
use switchboard_types::{
    Address, AddressError, ChannelName, Envelope, EnvelopeKind, InstanceKey, InstanceScope, Role,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::pending::CallbackTable;
use crate::probe::ContextProbe;
use crate::types::{
    ConnectionState, EndpointConfig, EndpointStats, IncomingMessage, MessageHandler,
    PendingResponse, ReplyRoute, Responder, SendError,
};

pub(crate) enum Command {
    Send {
        to: Address,
        payload: Value,
        reply: Option<oneshot::Sender<Value>>,
    },
    Respond {
        route: ReplyRoute,
        payload: Value,
    },
    Stats(oneshot::Sender<EndpointStats>),
    Disconnect,
}

/// Handle to a named endpoint running on its own task.
///
/// Dropping the handle disconnects the endpoint.
pub struct Endpoint {
    name: ChannelName,
    role: Role,
    commands: mpsc::UnboundedSender<Command>,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}

impl Endpoint {
    /// Start an endpoint on the current tokio runtime and begin its handshake.
    pub fn spawn(
        name: ChannelName,
        probe: Arc<dyn ContextProbe>,
        connector: Arc<dyn Connector>,
        handler: impl MessageHandler,
        config: EndpointConfig,
    ) -> Self {
        let role = probe.role();
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection {
            role,
            name: name.prefixed(),
            probe,
            connector,
            handler: Box::new(handler),
            config,
            state: ConnectionState::Connecting,
            channel: None,
            declared: None,
            outbox: VecDeque::new(),
            pending: CallbackTable::new(config.pending_high_water, config.cleanup_batch),
            commands: tx.downgrade(),
        };
        tokio::spawn(connection.run(rx));
        Self {
            name,
            role,
            commands: tx,
            disconnected: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Send `payload` and get a future for the response.
    ///
    /// Before the handshake completes the message is queued. Delivery misses
    /// are not reported; the returned future then never resolves.
    pub fn send(&self, to: &Address, payload: Value) -> Result<PendingResponse, SendError> {
        self.validate(to)?;
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Send {
            to: to.clone(),
            payload,
            reply: Some(reply),
        })?;
        Ok(PendingResponse::new(rx))
    }

    /// [`send`](Self::send) with a `role:name[,name2...][:instanceKey]` string.
    pub fn send_to(&self, to: &str, payload: Value) -> Result<PendingResponse, SendError> {
        let address = Address::parse(to)?;
        self.send(&address, payload)
    }

    /// Send without asking for a response.
    pub fn notify(&self, to: &Address, payload: Value) -> Result<(), SendError> {
        self.validate(to)?;
        self.submit(Command::Send {
            to: to.clone(),
            payload,
            reply: None,
        })
    }

    /// Close the channel. Later sends fail; outstanding responses never arrive.
    pub fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::AcqRel) {
            tracing::debug!(name = %self.name, role = %self.role, "disconnecting");
            let _ = self.commands.send(Command::Disconnect);
        }
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire) || self.commands.is_closed()
    }

    /// Connection state and table sizes; `None` once disconnected.
    pub async fn stats(&self) -> Option<EndpointStats> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Stats(reply)).ok()?;
        rx.await.ok()
    }

    fn validate(&self, to: &Address) -> Result<(), SendError> {
        if self.is_disconnected() {
            return Err(SendError::Disconnected);
        }
        if self.role.is_hub() && !to.role().is_hub() && to.instance().is_none() {
            return Err(AddressError::MissingInstanceKey { role: to.role() }.into());
        }
        Ok(())
    }

    fn submit(&self, command: Command) -> Result<(), SendError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(SendError::Disconnected);
        }
        self.commands
            .send(command)
            .map_err(|_| SendError::Disconnected)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct Connection {
    role: Role,
    /// Prefixed channel name.
    name: String,
    probe: Arc<dyn ContextProbe>,
    connector: Arc<dyn Connector>,
    handler: Box<dyn MessageHandler>,
    config: EndpointConfig,
    state: ConnectionState,
    channel: Option<Channel>,
    /// Instance declared at handshake time.
    declared: Option<InstanceKey>,
    outbox: VecDeque<Envelope>,
    pending: CallbackTable<oneshot::Sender<Value>>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Connection {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if self.role.instance_scope() == InstanceScope::Declared {
            self.declared = self.probe.instance_key().await;
        }
        self.open_channel();

        let mut retry = tokio::time::interval(self.config.retry_interval());
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        retry.tick().await;

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.on_command(command).await.is_break() {
                        break;
                    }
                }
                frame = next_frame(&mut self.channel) => match frame {
                    Some(frame) => self.on_frame(frame),
                    None => self.on_channel_lost(),
                },
                _ = retry.tick(), if self.state == ConnectionState::AwaitingAck => {
                    tracing::debug!(name = %self.name, role = %self.role, "no init_ack yet, retrying");
                    self.open_channel();
                }
            }
        }

        self.state = ConnectionState::Closed;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        tracing::debug!(
            name = %self.name,
            role = %self.role,
            unanswered = self.pending.len(),
            "endpoint closed"
        );
    }

    /// Replace the current channel with a fresh one and send INIT on it.
    fn open_channel(&mut self) {
        if let Some(old) = self.channel.take() {
            old.close();
        }
        self.state = ConnectionState::AwaitingAck;

        let channel = match self.connector.connect(&self.name) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::debug!(name = %self.name, error = %e, "could not open channel to hub");
                return;
            }
        };
        let init = Envelope::init(self.role, self.name.clone(), self.declared);
        match init.to_frame() {
            Ok(frame) => {
                let _ = channel.post(frame);
            }
            Err(e) => tracing::warn!(error = %e, "could not encode init"),
        }
        tracing::trace!(name = %self.name, role = %self.role, channel = %channel.id(), "init sent");
        self.channel = Some(channel);
    }

    fn on_channel_lost(&mut self) {
        self.channel = None;
        if self.state == ConnectionState::Ready {
            tracing::debug!(name = %self.name, role = %self.role, "hub channel closed, reconnecting");
            self.state = ConnectionState::AwaitingAck;
        }
    }

    async fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Send { to, payload, reply } => {
                let callback_id = reply.map(|reply| self.pending.insert(reply));
                let mut envelope = Envelope::message(
                    self.role,
                    self.name.clone(),
                    to.role(),
                    to.prefixed_names(),
                    payload,
                );
                envelope.callback_id = callback_id;
                self.stamp_instance(&mut envelope, to.instance()).await;
                tracing::trace!(to = %to, callback_id = ?callback_id.map(|id| id.value()), "send");
                self.dispatch(envelope);
            }
            Command::Respond { route, payload } => {
                let mut envelope = Envelope::response(
                    self.role,
                    self.name.clone(),
                    route.to,
                    route.to_name,
                    route.callback_id,
                    payload,
                );
                self.stamp_instance(&mut envelope, route.to_instance).await;
                tracing::trace!(callback_id = %route.callback_id, "respond");
                self.dispatch(envelope);
            }
            Command::Stats(reply) => {
                let _ = reply.send(EndpointStats {
                    state: self.state,
                    pending: self.pending.len(),
                    queued: self.outbox.len(),
                });
            }
            Command::Disconnect => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Declaring peers carry their current instance; the hub role names the
    /// target instance for peer targets.
    async fn stamp_instance(&mut self, envelope: &mut Envelope, target: Option<InstanceKey>) {
        match self.role.instance_scope() {
            InstanceScope::Declared => {
                envelope.instance_key = self.probe.instance_key().await.or(self.declared);
            }
            InstanceScope::Singleton => {
                if envelope.to.is_some_and(|to| !to.is_hub()) {
                    envelope.to_instance_key = target;
                }
            }
            InstanceScope::Derived => {}
        }
    }

    fn dispatch(&mut self, envelope: Envelope) {
        if self.state != ConnectionState::Ready {
            self.outbox.push_back(envelope);
            return;
        }
        let Some(channel) = &self.channel else {
            self.outbox.push_back(envelope);
            return;
        };
        match envelope.to_frame() {
            Ok(frame) => {
                let _ = channel.post(frame);
            }
            Err(e) => tracing::warn!(error = %e, "could not encode envelope"),
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        let envelope = match Envelope::from_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(name = %self.name, error = %e, "dropping undecodable frame");
                return;
            }
        };

        match envelope.kind {
            EnvelopeKind::InitAck => self.on_init_ack(),
            EnvelopeKind::Message | EnvelopeKind::Response => {
                if let Err(e) = envelope.routing() {
                    tracing::warn!(name = %self.name, error = %e, "dropping envelope");
                    return;
                }
                if envelope.kind == EnvelopeKind::Message {
                    self.on_message(envelope);
                } else {
                    self.on_response(envelope);
                }
            }
            EnvelopeKind::Init => {
                tracing::warn!(name = %self.name, "unexpected init received by endpoint");
            }
        }
    }

    fn on_init_ack(&mut self) {
        if self.state != ConnectionState::AwaitingAck {
            tracing::debug!(name = %self.name, "duplicate init_ack ignored");
            return;
        }
        self.state = ConnectionState::Ready;
        tracing::debug!(
            name = %self.name,
            role = %self.role,
            queued = self.outbox.len(),
            "handshake complete, flushing"
        );
        while let Some(envelope) = self.outbox.pop_front() {
            self.dispatch(envelope);
        }
    }

    fn on_message(&mut self, envelope: Envelope) {
        let from = envelope.origin();
        let route = envelope.callback_id.map(|callback_id| ReplyRoute {
            to: envelope.from,
            to_name: envelope.from_name.clone().unwrap_or_default(),
            to_instance: envelope.relayed_from_instance_key,
            callback_id,
        });
        let responder = Responder::new(route, self.commands.upgrade());
        self.handler.on_message(IncomingMessage {
            payload: envelope.payload,
            from,
            sender: envelope.sender,
            responder,
        });
    }

    fn on_response(&mut self, envelope: Envelope) {
        let Some(callback_id) = envelope.callback_id else {
            tracing::info!(name = %self.name, "response without callback id ignored");
            return;
        };
        match self.pending.take(callback_id) {
            Some(reply) => {
                let _ = reply.send(envelope.payload);
            }
            None => {
                tracing::info!(
                    name = %self.name,
                    callback_id = %callback_id,
                    "ignoring response, callback does not exist (probably already answered)"
                );
            }
        }
    }
}

async fn next_frame(channel: &mut Option<Channel>) -> Option<Frame> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

//! Switchboard: addressed messaging between the execution contexts of one
//! host application.
//!
//! Every context builds a [`Messenger`] describing where it runs. The hub-role
//! context calls [`Messenger::init_hub`] once; any context creates named
//! endpoints with [`Messenger::create_endpoint`] and talks to other endpoints
//! through addresses like `devtool:panel:42`.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use serde_json::json;
//! use switchboard::{
//!     AcceptorSlot, EndpointConfig, HubOptions, Messenger, NoHandler, Role, SenderInfo,
//!     StaticProbe,
//! };
//!
//! let slot = AcceptorSlot::new();
//! let background = Messenger::loopback(
//!     StaticProbe::new(Role::Background),
//!     slot.clone(),
//!     SenderInfo::new("background"),
//!     EndpointConfig::default(),
//! );
//! background.init_hub(HubOptions::default());
//! let _server = background.create_endpoint("server", |msg: switchboard::IncomingMessage| {
//!     msg.responder.respond(json!({"ack": true}));
//! })?;
//!
//! let devtool = Messenger::loopback(
//!     StaticProbe::new(Role::Devtool).with_instance(7),
//!     slot,
//!     SenderInfo::new("devtools"),
//!     EndpointConfig::default(),
//! );
//! let panel = devtool.create_endpoint("panel", NoHandler)?;
//! let answer = panel.send_to("background:server", json!({"greeting": "hi"}))?.await;
//! assert_eq!(answer, json!({"ack": true}));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

pub use switchboard_config::{ConfigError, SwitchboardConfig, config_path};
pub use switchboard_endpoint::{
    ConnectionState, ContextProbe, Endpoint, EndpointConfig, EndpointError, EndpointStats,
    IncomingMessage, MessageHandler, NoHandler, PendingResponse, ProbeFut, Responder, SendError,
    StaticProbe,
};
pub use switchboard_hub::{ConnectionCallback, ConnectionEvent, Hub, HubHandle, HubOptions, RegistrationInfo};
pub use switchboard_transport::{
    Acceptor, AcceptorSlot, Channel, ChannelId, Connector, Frame, LoopbackConnector, SlotOccupied,
    TransportError, channel_pair,
};
pub use switchboard_types::{
    Address, AddressError, CallbackId, ChannelName, Envelope, EnvelopeKind, InstanceKey,
    InstanceSlot, NameError, Origin, Role, SenderInfo, is_protocol_name,
};

/// Entry point for one execution context.
pub struct Messenger {
    probe: Arc<dyn ContextProbe>,
    connector: Arc<dyn Connector>,
    config: EndpointConfig,
    /// Where a hub started here registers itself, for in-process peers.
    slot: Option<AcceptorSlot>,
    hub: OnceLock<HubHandle>,
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("role", &self.role())
            .field("config", &self.config)
            .field("hub", &self.hub.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Messenger {
    /// A messenger whose endpoints open channels through `connector`.
    ///
    /// The hub role never reaches its own hub over the host transport: its
    /// endpoints get an in-process loopback connector and `connector` is
    /// dropped. A hub started from it is returned by
    /// [`init_hub`](Self::init_hub); wiring it to the host's transport is up
    /// to the caller.
    pub fn new(
        probe: impl ContextProbe,
        connector: impl Connector,
        config: EndpointConfig,
    ) -> Self {
        let probe: Arc<dyn ContextProbe> = Arc::new(probe);
        let role = probe.role();
        if role.is_hub() {
            tracing::debug!(role = %role, "hub role endpoints use the in-process loopback");
            let slot = AcceptorSlot::new();
            let connector = LoopbackConnector::new(slot.clone(), SenderInfo::new(role.as_str()));
            return Self::assemble(probe, Arc::new(connector), Some(slot), config);
        }
        Self::assemble(probe, Arc::new(connector), None, config)
    }

    /// A messenger on in-process loopback channels.
    ///
    /// All messengers sharing `slot` reach the same hub, which the hub-role
    /// messenger installs there on [`init_hub`](Self::init_hub). `sender` is
    /// the descriptor the hub sees on this context's channels.
    pub fn loopback(
        probe: impl ContextProbe,
        slot: AcceptorSlot,
        sender: SenderInfo,
        config: EndpointConfig,
    ) -> Self {
        let connector = LoopbackConnector::new(slot.clone(), sender);
        Self::assemble(Arc::new(probe), Arc::new(connector), Some(slot), config)
    }

    fn assemble(
        probe: Arc<dyn ContextProbe>,
        connector: Arc<dyn Connector>,
        slot: Option<AcceptorSlot>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            probe,
            connector,
            config,
            slot,
            hub: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.probe.role()
    }

    /// Open a named endpoint in this context.
    ///
    /// The name may not be empty, the wildcard `*`, or contain `:` or `,`.
    pub fn create_endpoint(
        &self,
        name: &str,
        handler: impl MessageHandler,
    ) -> Result<Endpoint, EndpointError> {
        let name = ChannelName::new(name)?;
        tracing::debug!(role = %self.role(), name = %name, "creating endpoint");
        Ok(Endpoint::spawn(
            name,
            Arc::clone(&self.probe),
            Arc::clone(&self.connector),
            handler,
            self.config,
        ))
    }

    /// Start the hub. Only the hub role may do this, and only once; other
    /// calls are ignored with a warning and return `None`.
    pub fn init_hub(&self, options: HubOptions) -> Option<HubHandle> {
        let role = self.role();
        if !role.is_hub() {
            tracing::warn!(role = %role, "the hub can only be initialized in the background role");
            return None;
        }

        let mut started = false;
        let handle = self.hub.get_or_init(|| {
            started = true;
            Hub::spawn(options)
        });
        if !started {
            tracing::warn!("hub already initialized, ignoring");
            return None;
        }

        if let Some(slot) = &self.slot
            && let Err(e) = slot.install(Arc::new(handle.clone()))
        {
            tracing::warn!(error = %e, "could not install hub as acceptor");
        }
        tracing::debug!("hub initialized");
        Some(handle.clone())
    }

    /// The hub started by this messenger, if any.
    #[must_use]
    pub fn hub(&self) -> Option<&HubHandle> {
        self.hub.get()
    }

    /// Whether `channel` carries Switchboard traffic.
    #[must_use]
    pub fn is_protocol_channel(channel: &Channel) -> bool {
        is_protocol_name(channel.name())
    }
}

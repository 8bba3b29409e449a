//! Shared fixtures: an in-process hub with loopback peers.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchboard::{
    AcceptorSlot, ConnectionEvent, ConnectionState, Endpoint, EndpointConfig, HubHandle,
    HubOptions, IncomingMessage, InstanceKey, Messenger, Role, SenderInfo, StaticProbe,
};
use tokio::sync::mpsc;

/// A loopback slot plus the background messenger that owns the hub.
pub struct Bed {
    pub slot: AcceptorSlot,
    pub background: Messenger,
    pub hub: HubHandle,
    pub connects: Arc<Mutex<Vec<ConnectionEvent>>>,
    pub disconnects: Arc<Mutex<Vec<ConnectionEvent>>>,
}

impl Bed {
    pub fn start() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    pub fn with_config(config: EndpointConfig) -> Self {
        let slot = AcceptorSlot::new();
        let background = Messenger::loopback(
            StaticProbe::new(Role::Background),
            slot.clone(),
            SenderInfo::new("background"),
            config,
        );
        let connects = Arc::new(Mutex::new(Vec::new()));
        let disconnects = Arc::new(Mutex::new(Vec::new()));
        let on_connect = Arc::clone(&connects);
        let on_disconnect = Arc::clone(&disconnects);
        let hub = background
            .init_hub(
                HubOptions::new()
                    .with_on_connect(move |event| on_connect.lock().unwrap().push(event.clone()))
                    .with_on_disconnect(move |event| {
                        on_disconnect.lock().unwrap().push(event.clone());
                    }),
            )
            .unwrap();
        Self {
            slot,
            background,
            hub,
            connects,
            disconnects,
        }
    }

    /// A peer context. Declaring roles get `instance` from their probe;
    /// content scripts get it through the channel's sender descriptor.
    pub fn peer(&self, role: Role, instance: i64) -> Messenger {
        peer_on(&self.slot, role, instance, EndpointConfig::default())
    }
}

pub fn peer_on(slot: &AcceptorSlot, role: Role, instance: i64, config: EndpointConfig) -> Messenger {
    let (probe, sender) = match role {
        Role::ContentScript => (
            StaticProbe::new(role),
            SenderInfo::new(format!("tab-{instance}")).with_instance(InstanceKey::new(instance)),
        ),
        _ => (
            StaticProbe::new(role).with_instance(instance),
            SenderInfo::new(format!("{role}-{instance}")),
        ),
    };
    Messenger::loopback(probe, slot.clone(), sender, config)
}

/// A handler that forwards every message to the returned receiver.
pub fn recorder() -> (
    impl FnMut(IncomingMessage) + Send + 'static,
    mpsc::UnboundedReceiver<IncomingMessage>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |message: IncomingMessage| {
        let _ = tx.send(message);
    };
    (handler, rx)
}

/// A handler that answers every request with `{"from": <origin>, "echo": <payload>}`.
pub fn echo(message: IncomingMessage) {
    let reply = serde_json::json!({
        "from": message.from.to_string(),
        "echo": message.payload,
    });
    message.responder.respond(reply);
}

/// Wait until the endpoint has completed its handshake.
pub async fn ready(endpoint: &Endpoint) {
    loop {
        let stats = endpoint.stats().await.unwrap();
        if stats.state == ConnectionState::Ready {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Nothing arrives on `rx` for a while.
pub async fn quiet(rx: &mut mpsc::UnboundedReceiver<IncomingMessage>) -> bool {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .is_err()
}

pub async fn within<F: std::future::Future>(future: F) -> Option<F::Output> {
    tokio::time::timeout(Duration::from_secs(5), future).await.ok()
}

//! Handshake, disconnect and hub setup.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use switchboard::{
    AcceptorSlot, Channel, ConnectionEvent, ConnectionState, Connector, EndpointConfig,
    EndpointError, HubOptions, InstanceKey, Messenger, NameError, NoHandler, Role, SendError,
    SenderInfo, StaticProbe, TransportError, channel_pair,
};

use crate::common::{Bed, echo, peer_on, ready, recorder, within};

#[tokio::test(start_paused = true)]
async fn endpoint_started_before_the_hub_connects_once_it_exists() {
    let slot = AcceptorSlot::new();
    let devtools = peer_on(&slot, Role::Devtool, 3, EndpointConfig::default());
    let panel = devtools.create_endpoint("panel", NoHandler).unwrap();

    let early = panel.send_to("background:server", json!("first")).unwrap();
    let late = panel.send_to("background:server", json!("second")).unwrap();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let stats = panel.stats().await.unwrap();
    assert_eq!(stats.state, ConnectionState::AwaitingAck);
    assert_eq!(stats.queued, 2);

    let background = Messenger::loopback(
        StaticProbe::new(Role::Background),
        slot.clone(),
        SenderInfo::new("background"),
        EndpointConfig::default(),
    );
    background.init_hub(HubOptions::default()).unwrap();
    let (handler, mut seen) = recorder();
    let server = background.create_endpoint("server", handler).unwrap();
    ready(&server).await;
    ready(&panel).await;

    let first = seen.recv().await.unwrap();
    let second = seen.recv().await.unwrap();
    assert_eq!(first.payload, json!("first"));
    assert_eq!(second.payload, json!("second"));
    first.responder.respond(json!(1));
    second.responder.respond(json!(2));

    assert_eq!(within(early).await, Some(json!(1)));
    assert_eq!(within(late).await, Some(json!(2)));
}

#[tokio::test(start_paused = true)]
async fn connect_and_disconnect_are_reported_with_unprefixed_names() {
    let bed = Bed::start();
    let server = bed.background.create_endpoint("server", NoHandler).unwrap();
    ready(&server).await;
    let devtools = bed.peer(Role::Devtool, 6);
    let panel = devtools.create_endpoint("panel", NoHandler).unwrap();
    ready(&panel).await;

    assert_eq!(
        *bed.connects.lock().unwrap(),
        [
            ConnectionEvent {
                role: Role::Background,
                name: "server".to_string(),
                instance: None,
            },
            ConnectionEvent {
                role: Role::Devtool,
                name: "panel".to_string(),
                instance: Some(InstanceKey::new(6)),
            },
        ]
    );

    panel.disconnect();
    while bed.hub.snapshot().await.len() > 1 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let snapshot = bed.hub.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "server");
    assert_eq!(
        *bed.disconnects.lock().unwrap(),
        [ConnectionEvent {
            role: Role::Devtool,
            name: "panel".to_string(),
            instance: Some(InstanceKey::new(6)),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn closing_one_channel_leaves_its_siblings_registered() {
    let bed = Bed::start();
    let tab = bed.peer(Role::Popup, 2);
    let a = tab.create_endpoint("same", echo).unwrap();
    let b = tab.create_endpoint("same", echo).unwrap();
    let server = bed.background.create_endpoint("server", NoHandler).unwrap();
    for endpoint in [&a, &b, &server] {
        ready(endpoint).await;
    }

    drop(a);
    while bed.hub.snapshot().await.len() > 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let answer = within(server.send_to("popup:same:2", json!("still there?")).unwrap()).await;
    assert_eq!(
        answer,
        Some(json!({"from": "background:server", "echo": "still there?"}))
    );
    assert_eq!(bed.disconnects.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_after_disconnect_fails_immediately() {
    let bed = Bed::start();
    let server = bed.background.create_endpoint("server", NoHandler).unwrap();
    ready(&server).await;

    server.disconnect();
    assert!(server.is_disconnected());
    assert_eq!(
        server.send_to("background:server", json!(1)).unwrap_err(),
        SendError::Disconnected
    );
    assert!(server.stats().await.is_none());
}

/// Counts connection attempts and refuses all of them.
#[derive(Clone, Default)]
struct HostTransport(Arc<AtomicUsize>);

impl Connector for HostTransport {
    fn connect(&self, name: &str) -> Result<Channel, TransportError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Refused {
            name: name.to_string(),
            reason: "host transport".to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn hub_role_reaches_its_own_hub_without_the_host_transport() {
    let host = HostTransport::default();
    let background = Messenger::new(
        StaticProbe::new(Role::Background),
        host.clone(),
        EndpointConfig::default(),
    );
    let hub = background.init_hub(HubOptions::default()).unwrap();
    let server = background.create_endpoint("server", echo).unwrap();
    ready(&server).await;

    let names: Vec<_> = hub.snapshot().await.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["server".to_string()]);
    assert_eq!(host.0.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn peers_built_with_new_use_the_given_connector() {
    let host = HostTransport::default();
    let devtools = Messenger::new(
        StaticProbe::new(Role::Devtool).with_instance(2),
        host.clone(),
        EndpointConfig::default(),
    );
    let _panel = devtools.create_endpoint("panel", NoHandler).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(host.0.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn hub_starts_once_and_only_in_the_background_role() {
    let bed = Bed::start();
    assert!(bed.background.init_hub(HubOptions::default()).is_none());
    assert!(bed.background.hub().is_some());

    let popup = bed.peer(Role::Popup, 1);
    assert!(popup.init_hub(HubOptions::default()).is_none());
    assert!(popup.hub().is_none());
}

#[tokio::test(start_paused = true)]
async fn endpoint_names_are_validated() {
    let bed = Bed::start();
    assert_eq!(
        bed.background.create_endpoint("", NoHandler).unwrap_err(),
        EndpointError::InvalidName(NameError::Empty)
    );
    assert_eq!(
        bed.background.create_endpoint("*", NoHandler).unwrap_err(),
        EndpointError::InvalidName(NameError::Wildcard)
    );
    assert!(matches!(
        bed.background.create_endpoint("a:b", NoHandler),
        Err(EndpointError::InvalidName(NameError::Separator { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn foreign_channels_are_left_alone() {
    let bed = Bed::start();
    let (_ours, theirs) = channel_pair("devtools-page", SenderInfo::new("x"));
    assert!(!Messenger::is_protocol_channel(&theirs));
    assert!(bed.hub.accept_channel(theirs).is_err());

    let (_ours, protocol) = channel_pair("__messenger__panel", SenderInfo::new("x"));
    assert!(Messenger::is_protocol_channel(&protocol));
    assert!(bed.hub.accept_channel(protocol).is_ok());
}

#[tokio::test(start_paused = true)]
async fn hub_shutdown_sends_endpoints_back_to_handshaking() {
    let bed = Bed::start();
    let tab = bed.peer(Role::Devtool, 1);
    let panel = tab.create_endpoint("panel", NoHandler).unwrap();
    ready(&panel).await;

    bed.hub.shutdown().await;
    assert!(!bed.hub.is_running());

    loop {
        let stats = panel.stats().await.unwrap();
        if stats.state == ConnectionState::AwaitingAck {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

//! Routing: who receives a relayed message and who does not.

use serde_json::json;
use switchboard::{Address, InstanceKey, NoHandler, Role};

use crate::common::{Bed, quiet, ready, recorder};

#[tokio::test(start_paused = true)]
async fn message_reaches_only_the_named_channel_of_the_instance() {
    let bed = Bed::start();
    let server = bed.background.create_endpoint("server", NoHandler).unwrap();

    let tab1 = bed.peer(Role::Devtool, 1);
    let tab2 = bed.peer(Role::Devtool, 2);
    let (handler, mut panel1_rx) = recorder();
    let panel1 = tab1.create_endpoint("panel", handler).unwrap();
    let (handler, mut other1_rx) = recorder();
    let other1 = tab1.create_endpoint("other", handler).unwrap();
    let (handler, mut panel2_rx) = recorder();
    let panel2 = tab2.create_endpoint("panel", handler).unwrap();
    for endpoint in [&server, &panel1, &other1, &panel2] {
        ready(endpoint).await;
    }

    let to = Address::parse("devtool:panel:1").unwrap();
    server.notify(&to, json!({"n": 1})).unwrap();

    let got = panel1_rx.recv().await.unwrap();
    assert_eq!(got.payload, json!({"n": 1}));
    assert_eq!(got.from.to_string(), "background:server");
    assert_eq!(got.sender.unwrap().identity, "background");
    assert!(quiet(&mut panel1_rx).await, "delivered exactly once");
    assert!(quiet(&mut other1_rx).await);
    assert!(quiet(&mut panel2_rx).await);
}

#[tokio::test(start_paused = true)]
async fn wildcard_with_explicit_names_delivers_once_per_channel() {
    let bed = Bed::start();
    let server = bed.background.create_endpoint("server", NoHandler).unwrap();

    let tab = bed.peer(Role::Popup, 3);
    let (handler, mut a_rx) = recorder();
    let a = tab.create_endpoint("a", handler).unwrap();
    let (handler, mut b_rx) = recorder();
    let b = tab.create_endpoint("b", handler).unwrap();
    for endpoint in [&server, &a, &b] {
        ready(endpoint).await;
    }

    server
        .notify(&Address::parse("popup:a,*,b:3").unwrap(), json!("all"))
        .unwrap();

    assert_eq!(a_rx.recv().await.unwrap().payload, json!("all"));
    assert_eq!(b_rx.recv().await.unwrap().payload, json!("all"));
    assert!(quiet(&mut a_rx).await);
    assert!(quiet(&mut b_rx).await);
}

#[tokio::test(start_paused = true)]
async fn several_names_in_one_address() {
    let bed = Bed::start();
    let (handler, mut first_rx) = recorder();
    let first = bed.background.create_endpoint("first", handler).unwrap();
    let (handler, mut second_rx) = recorder();
    let second = bed.background.create_endpoint("second", handler).unwrap();
    let (handler, mut third_rx) = recorder();
    let third = bed.background.create_endpoint("third", handler).unwrap();

    let tab = bed.peer(Role::Devtool, 5);
    let sender = tab.create_endpoint("sender", NoHandler).unwrap();
    for endpoint in [&first, &second, &third, &sender] {
        ready(endpoint).await;
    }

    sender
        .notify(&Address::parse("background:first,second,missing").unwrap(), json!(1))
        .unwrap();

    let got = first_rx.recv().await.unwrap();
    assert_eq!(got.from.to_string(), "devtool:sender:5");
    assert_eq!(got.from.instance(), Some(InstanceKey::new(5)));
    assert!(second_rx.recv().await.is_some());
    assert!(quiet(&mut third_rx).await);
}

#[tokio::test(start_paused = true)]
async fn peers_reach_peers_of_their_own_instance_only() {
    let bed = Bed::start();
    let devtools7 = bed.peer(Role::Devtool, 7);
    let page7 = bed.peer(Role::ContentScript, 7);
    let page8 = bed.peer(Role::ContentScript, 8);

    let panel = devtools7.create_endpoint("panel", NoHandler).unwrap();
    let (handler, mut rx7) = recorder();
    let cs7 = page7.create_endpoint("cs", handler).unwrap();
    let (handler, mut rx8) = recorder();
    let cs8 = page8.create_endpoint("cs", handler).unwrap();
    for endpoint in [&panel, &cs7, &cs8] {
        ready(endpoint).await;
    }

    panel
        .notify(&Address::parse("content_script:cs").unwrap(), json!("same tab"))
        .unwrap();

    let got = rx7.recv().await.unwrap();
    assert_eq!(got.payload, json!("same tab"));
    assert_eq!(got.from.to_string(), "devtool:panel:7");
    assert!(quiet(&mut rx8).await);
}

#[tokio::test(start_paused = true)]
async fn content_script_origin_carries_the_derived_instance() {
    let bed = Bed::start();
    let (handler, mut rx) = recorder();
    let server = bed.background.create_endpoint("server", handler).unwrap();
    let page = bed.peer(Role::ContentScript, 12);
    let cs = page.create_endpoint("cs", NoHandler).unwrap();
    ready(&server).await;
    ready(&cs).await;

    cs.notify(&Address::parse("background:server").unwrap(), json!(null))
        .unwrap();

    let got = rx.recv().await.unwrap();
    assert_eq!(got.from.to_string(), "content_script:cs:12");
    assert!(!got.responder.expects_response());
    assert_eq!(got.sender.unwrap().instance_key, Some(InstanceKey::new(12)));
}

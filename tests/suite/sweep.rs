//! Unanswered requests are eventually dropped.

use serde_json::json;
use switchboard::{EndpointConfig, Role};

use crate::common::{Bed, ready, recorder, within};

#[tokio::test(start_paused = true)]
async fn crossing_the_high_water_mark_drops_the_oldest_batch() {
    let config = EndpointConfig {
        pending_high_water: 3,
        cleanup_batch: 2,
        ..EndpointConfig::default()
    };
    let bed = Bed::with_config(config);
    let server = bed.background.create_endpoint("server", crate::common::echo).unwrap();
    let tab = bed.peer(Role::Devtool, 1);
    let (handler, mut held) = recorder();
    let panel = tab.create_endpoint("panel", handler).unwrap();
    ready(&server).await;
    ready(&panel).await;

    let mut pending = Vec::new();
    for n in 1..=3 {
        pending.push(server.send_to("devtool:panel:1", json!(n)).unwrap());
    }
    assert_eq!(server.stats().await.unwrap().pending, 3);

    pending.push(server.send_to("devtool:panel:1", json!(4)).unwrap());
    assert_eq!(server.stats().await.unwrap().pending, 2);

    // Answer everything, including the two requests that were dropped.
    for _ in 0..4 {
        let message = held.recv().await.unwrap();
        let n = message.payload.clone();
        message.responder.respond(n);
    }

    let mut pending = pending.into_iter();
    let first = pending.next().unwrap();
    let second = pending.next().unwrap();
    let third = pending.next().unwrap();
    let fourth = pending.next().unwrap();
    assert_eq!(within(third).await, Some(json!(3)));
    assert_eq!(within(fourth).await, Some(json!(4)));
    assert_eq!(within(first).await, None);
    assert_eq!(within(second).await, None);
    assert_eq!(server.stats().await.unwrap().pending, 0);
}

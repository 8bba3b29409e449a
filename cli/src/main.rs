//! Runs a hub and a few peer contexts in one process and shows a round of
//! traffic between them. Set `RUST_LOG=switchboard=debug` to watch the
//! protocol.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use switchboard::{
    AcceptorSlot, Address, HubOptions, IncomingMessage, InstanceKey, Messenger, NoHandler, Role,
    SenderInfo, StaticProbe, SwitchboardConfig,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const TAB: i64 = 7;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = SwitchboardConfig::load().context("loading switchboard config")?;
    if let Some(path) = SwitchboardConfig::path() {
        tracing::debug!(path = %path.display(), "config location");
    }

    let slot = AcceptorSlot::new();

    let background = Messenger::loopback(
        StaticProbe::new(Role::Background),
        slot.clone(),
        SenderInfo::new("background"),
        config.endpoint,
    );
    let hub = background
        .init_hub(
            HubOptions::new()
                .with_on_connect(|event| {
                    tracing::info!(role = %event.role, name = %event.name, instance = ?event.instance, "connected");
                })
                .with_on_disconnect(|event| {
                    tracing::info!(role = %event.role, name = %event.name, instance = ?event.instance, "disconnected");
                }),
        )
        .context("background messenger did not start a hub")?;

    let server = background.create_endpoint("server", |message: IncomingMessage| {
        tracing::info!(from = %message.from, payload = %message.payload, "server received");
        message.responder.respond(json!({ "ack": true }));
    })?;

    let devtool = Messenger::loopback(
        StaticProbe::new(Role::Devtool).with_instance(TAB),
        slot.clone(),
        SenderInfo::new("devtools"),
        config.endpoint,
    );
    let panel = devtool.create_endpoint("panel", |message: IncomingMessage| {
        tracing::info!(from = %message.from, payload = %message.payload, "panel received");
    })?;

    let content = Messenger::loopback(
        StaticProbe::new(Role::ContentScript),
        slot,
        SenderInfo::new("page").with_instance(InstanceKey::new(TAB)),
        config.endpoint,
    );
    let page = content.create_endpoint("page", |message: IncomingMessage| {
        let echo = message.payload.clone();
        message.responder.respond(json!({ "echo": echo }));
    })?;

    let answer = tokio::time::timeout(
        RESPONSE_TIMEOUT,
        panel.send_to("background:server", json!({ "greeting": "hi" }))?,
    )
    .await
    .context("no response from background:server")?;
    println!("panel <- server: {answer}");

    let answer = tokio::time::timeout(
        RESPONSE_TIMEOUT,
        server.send_to(&format!("content_script:page:{TAB}"), json!("ping"))?,
    )
    .await
    .context("no response from the content script")?;
    println!("server <- page: {answer}");

    let address: Address = format!("devtool:*:{TAB}").parse()?;
    server.notify(&address, json!({ "status": "all good" }))?;

    let sidekick = devtool.create_endpoint("sidekick", NoHandler)?;
    let answer = tokio::time::timeout(
        RESPONSE_TIMEOUT,
        sidekick.send_to("content_script:page", json!("hello from the same tab"))?,
    )
    .await
    .context("no response from the content script")?;
    println!("sidekick <- page: {answer}");

    for registration in hub.snapshot().await {
        println!(
            "registered {}:{} instance={:?}",
            registration.role, registration.name, registration.instance
        );
    }

    page.disconnect();
    hub.shutdown().await;
    Ok(())
}

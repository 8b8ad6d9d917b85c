//! Realtime example: follow ticket updates and platform broadcasts until Ctrl-C.
//!
//! Run with tracing enabled:
//! ```sh
//! REALTIME_WS_URL=wss://realtime.example.com/app RUST_LOG=info cargo run --example ticket_updates --features ws,tracing
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=realtime.log REALTIME_DEBUG=1 RUST_LOG=debug cargo run --example ticket_updates --features ws,tracing
//! ```

use std::fs::File;

use futures::StreamExt as _;
use serde_json::{Value, json};
use ticket_realtime::ws::{Config, ConnectionManager, LocalEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let manager = ConnectionManager::websocket(Config::from_env())?;

    manager.on(LocalEvent::Connected, |_: &Value| info!(event = "connected"));
    manager.on(LocalEvent::Disconnected, |data: &Value| {
        warn!(event = "disconnected", code = %data["code"], reason = %data["reason"]);
    });
    manager.on(LocalEvent::MaxReconnectAttempts, |data: &Value| {
        warn!(event = "max-reconnect-attempts", attempts = %data["attempts"]);
    });
    manager.on("platform.status", |data: &Value| info!(event = "platform.status", %data));

    let _alerts = manager.subscribe("alerts.new", |payload: &Value| {
        info!(channel = "alerts.new", %payload);
    });
    let mut updates = Box::pin(manager.subscription_stream("ticket.updates"));

    // Queued until the connection opens.
    manager.send(&json!({ "type": "client.hello", "client": "ticket_updates" }));
    manager.connect();

    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(payload) => info!(channel = "ticket.updates", %payload),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!(status = %serde_json::to_string(&manager.status())?);
    manager.destroy();

    Ok(())
}

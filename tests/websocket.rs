#![cfg(feature = "ws")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use ticket_realtime::ws::{Config, ConnectionManager, LocalEvent};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Command {
    Send(String),
    /// Drop every connection without a close frame
    Kick,
}

/// Mock realtime server.
struct MockWsServer {
    addr: SocketAddr,
    /// Commands applied to ALL connected clients
    command_tx: broadcast::Sender<Command>,
    /// Text frames received from clients
    inbound_rx: mpsc::UnboundedReceiver<Value>,
    /// One entry per accepted connection
    accepted_rx: mpsc::UnboundedReceiver<()>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<Command>(100);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Value>();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel::<()>();

        let commands = command_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                drop(accepted_tx.send(()));

                let (mut write, mut read) = ws_stream.split();
                let inbound_tx = inbound_tx.clone();
                let mut command_rx = commands.subscribe();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        if let Ok(value) = serde_json::from_str(text.as_str()) {
                                            drop(inbound_tx.send(value));
                                        }
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(Command::Send(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(Command::Kick) | Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            inbound_rx,
            accepted_rx,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/app", self.addr)
    }

    /// Send a frame to all connected clients.
    fn send(&self, frame: &Value) {
        drop(self.command_tx.send(Command::Send(frame.to_string())));
    }

    fn kick(&self) {
        drop(self.command_tx.send(Command::Kick));
    }

    async fn accepted(&mut self) {
        timeout(Duration::from_secs(5), self.accepted_rx.recv())
            .await
            .unwrap()
            .unwrap();
    }

    /// Receive the next client frame whose `type` is `kind`, skipping others.
    async fn recv_type(&mut self, kind: &str) -> Value {
        timeout(Duration::from_secs(5), async {
            loop {
                let frame = self.inbound_rx.recv().await.unwrap();
                if frame["type"] == kind {
                    return frame;
                }
            }
        })
        .await
        .unwrap()
    }
}

fn config(server: &MockWsServer) -> Config {
    let mut config = Config::new(server.ws_url());
    config.reconnect.interval = Duration::from_millis(50);
    config
}

async fn wait_connected(manager: &ConnectionManager) {
    let mut states = manager.state_receiver();
    timeout(Duration::from_secs(5), states.wait_for(|state| state.is_connected()))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn subscribe_and_receive_deliveries() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::websocket(config(&server)).unwrap();
    let mut updates = Box::pin(manager.subscription_stream("ticket.updates"));

    manager.connect();
    server.accepted().await;

    let request = server.recv_type("subscribe").await;
    assert_eq!(request["channel"], "ticket.updates");
    wait_connected(&manager).await;

    server.send(&json!({
        "type": "subscription",
        "channel": "ticket.updates",
        "payload": { "ticket": 7, "status": "reserved" },
    }));

    let payload = timeout(Duration::from_secs(5), updates.next()).await.unwrap().unwrap();
    assert_eq!(payload, json!({ "ticket": 7, "status": "reserved" }));
}

#[tokio::test]
async fn answers_server_ping() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::websocket(config(&server)).unwrap();

    manager.connect();
    server.accepted().await;
    wait_connected(&manager).await;

    server.send(&json!({ "type": "heartbeat", "action": "ping" }));

    let pong = server.recv_type("heartbeat").await;
    assert_eq!(pong["action"], "pong");
}

#[tokio::test]
async fn reconnects_and_replays_after_drop() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::websocket(config(&server)).unwrap();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    manager.on(LocalEvent::Disconnected, move |data: &Value| {
        drop(disconnect_tx.send(data.clone()));
    });
    manager.subscribe("alerts.new", |_: &Value| {});

    manager.connect();
    server.accepted().await;
    assert_eq!(server.recv_type("subscribe").await["channel"], "alerts.new");
    wait_connected(&manager).await;

    server.kick();
    let disconnected = timeout(Duration::from_secs(5), disconnect_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(disconnected["code"], 1000);

    server.accepted().await;
    assert_eq!(server.recv_type("subscribe").await["channel"], "alerts.new");
    wait_connected(&manager).await;
    assert_eq!(manager.status().reconnect_attempts, 0);
}

#[tokio::test]
async fn queued_sends_flush_on_connect() {
    let mut server = MockWsServer::start().await;
    let manager = ConnectionManager::websocket(config(&server)).unwrap();

    assert!(!manager.send(&json!({ "type": "ticket.hold", "seq": 1 })));
    assert!(!manager.send(&json!({ "type": "ticket.hold", "seq": 2 })));
    manager.connect();
    server.accepted().await;

    assert_eq!(server.recv_type("ticket.hold").await["seq"], 1);
    assert_eq!(server.recv_type("ticket.hold").await["seq"], 2);
}

#[tokio::test]
async fn invalid_url_schedules_retry() {
    let mut config = Config::new("https://realtime.example.com/app");
    config.reconnect.interval = Duration::from_secs(60);
    let manager = ConnectionManager::websocket(config).unwrap();
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    manager.on(LocalEvent::Error, move |data: &Value| {
        drop(error_tx.send(data.clone()));
    });

    manager.connect();

    let error = error_rx.recv().await.unwrap();
    assert!(error["message"].as_str().unwrap().contains("https://realtime.example.com/app"));
    assert!(!manager.status().connected);
}

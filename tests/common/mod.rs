#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use ticket_realtime::error::Error;
use ticket_realtime::ws::{Config, Connector, ConnectionManager, Transport, TransportEvents};
use tokio::time::Instant;

pub const URL: &str = "wss://realtime.test/app";

/// One call to [`Connector::open`].
#[derive(Debug, Clone)]
pub struct Attempt {
    pub at: Instant,
    pub events: TransportEvents,
}

#[derive(Debug, Default)]
struct Script {
    attempts: Mutex<Vec<Attempt>>,
    /// Every frame written to any transport, in order
    frames: Mutex<Vec<String>>,
    /// Every `close()` requested on any transport
    closes: Mutex<Vec<(u16, String)>>,
    refuse_opens: AtomicBool,
    reject_writes: AtomicBool,
    transports: AtomicUsize,
}

/// Scripted connector. Nothing happens on a transport until the test drives its events.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Script>,
}

struct MockTransport {
    script: Arc<Script>,
    closed: AtomicBool,
}

impl Transport for MockTransport {
    fn send(&self, text: &str) -> bool {
        if self.closed.load(Ordering::SeqCst) || self.script.reject_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.script.frames.lock().unwrap().push(text.to_owned());
        true
    }

    fn close(&self, code: u16, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        self.script
            .closes
            .lock()
            .unwrap()
            .push((code, reason.to_owned()));
    }
}

impl Connector for MockConnector {
    fn open(&self, _url: &str, events: TransportEvents) -> ticket_realtime::Result<Box<dyn Transport>> {
        self.script.attempts.lock().unwrap().push(Attempt {
            at: Instant::now(),
            events,
        });
        if self.script.refuse_opens.load(Ordering::SeqCst) {
            return Err(Error::validation("connection refused"));
        }
        self.script.transports.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport {
            script: Arc::clone(&self.script),
            closed: AtomicBool::new(false),
        }))
    }
}

impl MockConnector {
    pub fn attempts(&self) -> Vec<Attempt> {
        self.script.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.script.attempts.lock().unwrap().len()
    }

    /// Events handle of the most recent attempt.
    pub fn latest(&self) -> TransportEvents {
        self.script
            .attempts
            .lock()
            .unwrap()
            .last()
            .map(|attempt| attempt.events.clone())
            .unwrap()
    }

    /// Complete the most recent attempt.
    pub fn accept(&self) {
        self.latest().opened();
    }

    /// Push a server frame on the most recent attempt.
    pub fn push(&self, frame: &Value) {
        self.latest().message(frame.to_string());
    }

    /// Drop the most recent attempt abnormally.
    pub fn drop_abnormally(&self) {
        self.latest().closed(1006, "connection reset");
    }

    pub fn refuse_opens(&self, refuse: bool) {
        self.script.refuse_opens.store(refuse, Ordering::SeqCst);
    }

    pub fn reject_writes(&self, reject: bool) {
        self.script.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Frames written so far, parsed.
    pub fn frames(&self) -> Vec<Value> {
        self.script
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Frames written so far, then forget them.
    pub fn take_frames(&self) -> Vec<Value> {
        let frames = self.frames();
        self.script.frames.lock().unwrap().clear();
        frames
    }

    /// Channels of the `subscribe` envelopes written so far.
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.frames_of_type("subscribe")
            .iter()
            .map(|frame| frame["channel"].as_str().unwrap().to_owned())
            .collect()
    }

    pub fn frames_of_type(&self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.script.closes.lock().unwrap().clone()
    }
}

/// Collects the payloads handed to a listener.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    pub fn callback(&self) -> impl Fn(&Value) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |payload: &Value| seen.lock().unwrap().push(payload.clone())
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// Configuration used by most tests: quick retries, long heartbeat.
pub fn config() -> Config {
    let mut config = Config::new(URL);
    config.reconnect.interval = Duration::from_millis(1000);
    config
}

pub fn manager(config: Config) -> (ConnectionManager, MockConnector) {
    let connector = MockConnector::default();
    let manager = ConnectionManager::new(config, connector.clone()).unwrap();
    (manager, connector)
}

/// Manager with an open connection and no frames recorded yet.
pub fn connected(config: Config) -> (ConnectionManager, MockConnector) {
    let (manager, connector) = manager(config);
    manager.connect();
    connector.accept();
    connector.take_frames();
    (manager, connector)
}

/// Let spawned timer tasks run, advancing paused time by `duration`.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

//! Transport adapter seam.
//!
//! A [`Connector`] makes one connection attempt per [`Connector::open`] call and hands back a
//! [`Transport`] for writing. Everything the connection does afterwards is reported through the
//! [`TransportEvents`] it was given: exactly one callback per underlying event.

use std::sync::Weak;

/// Close code for an orderly, intentional shutdown. Suppresses reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code used when the heartbeat timeout declares the connection dead.
pub const HEARTBEAT_TIMEOUT_CLOSURE: u16 = 4000;

/// Write half of an open (or opening) connection.
///
/// Both methods are called while the connection manager holds its state lock. They must not
/// invoke the attempt's [`TransportEvents`] synchronously; report the outcome of a close (or a
/// failed write) from the transport's own task, or not at all.
pub trait Transport: Send + Sync + 'static {
    /// Attempt to write one text frame.
    ///
    /// Returns `true` when the connection is open and the write was attempted, `false` when
    /// the caller must keep the frame for later.
    fn send(&self, text: &str) -> bool;

    /// Request an orderly shutdown.
    ///
    /// The manager has already abandoned this attempt when it calls `close`, so a `closed`
    /// event reported afterwards is ignored.
    fn close(&self, code: u16, reason: &str);
}

/// Factory for transports.
///
/// `open` is called while the connection manager holds its state lock. Implementations must
/// not invoke `events` synchronously from inside `open`; connection progress is reported from
/// the connector's own task.
pub trait Connector: Send + Sync + 'static {
    /// Start one connection attempt to `url`.
    ///
    /// An `Err` here (malformed URL, missing runtime) is treated by the connection manager
    /// exactly like an abnormal close.
    fn open(&self, url: &str, events: TransportEvents) -> crate::Result<Box<dyn Transport>>;
}

/// Something that happened on a transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Failed(String),
}

pub(crate) trait EventSink: Send + Sync {
    fn deliver(&self, generation: u64, event: TransportEvent);
}

/// Callback handle given to a [`Connector`] for one connection attempt.
///
/// Events delivered after the attempt has been superseded (a newer attempt was opened, or the
/// manager was disconnected) are dropped by the receiver.
#[derive(Clone)]
pub struct TransportEvents {
    generation: u64,
    sink: Weak<dyn EventSink>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, sink: Weak<dyn EventSink>) -> Self {
        Self { generation, sink }
    }

    /// Connection attempt this handle belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        self.deliver(TransportEvent::Opened);
    }

    pub fn message(&self, text: String) {
        self.deliver(TransportEvent::Message(text));
    }

    pub fn closed(&self, code: u16, reason: &str) {
        self.deliver(TransportEvent::Closed {
            code,
            reason: reason.to_owned(),
        });
    }

    pub fn failed(&self, message: &str) {
        self.deliver(TransportEvent::Failed(message.to_owned()));
    }

    fn deliver(&self, event: TransportEvent) {
        if let Some(sink) = self.sink.upgrade() {
            sink.deliver(self.generation, event);
        }
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

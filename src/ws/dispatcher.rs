//! Local publish/subscribe for lifecycle and broadcast events. Never mirrored over the wire.

use serde_json::Value;

use super::registry::{Callback, Dispatch, ListenerId, ListenerRegistry};

/// Events the connection manager emits on its own.
///
/// Server broadcasts are emitted under whatever event name they carry, so listeners are keyed
/// by plain strings; these are the names the manager itself uses.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum LocalEvent {
    /// Transport opened. Payload: `null`
    Connected,
    /// Left the connected state. Payload: `{ "code", "reason" }`
    Disconnected,
    /// Transport failure or failed open attempt. Payload: `{ "message" }`
    Error,
    /// Server sent an `error` envelope. Payload: `{ "message" }`
    ServerError,
    /// Retries exhausted. Payload: `{ "attempts" }`
    MaxReconnectAttempts,
    /// Network reported offline. Payload: `null`
    NetworkOffline,
}

#[derive(Debug, Default)]
pub(crate) struct EventDispatcher {
    listeners: ListenerRegistry,
}

impl EventDispatcher {
    pub(crate) fn on(&mut self, event: &str, id: ListenerId, callback: Callback) {
        self.listeners.insert(event, id, callback);
    }

    pub(crate) fn off(&mut self, event: &str, id: Option<ListenerId>) {
        self.listeners.remove(event, id);
    }

    /// Collect the listeners for `event`; `None` when nobody is listening.
    pub(crate) fn prepare(&self, event: &str, data: Value) -> Option<Dispatch> {
        let callbacks = self.listeners.listeners(event);
        if callbacks.is_empty() {
            return None;
        }
        Some(Dispatch::new("event", event, callbacks, data))
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }
}

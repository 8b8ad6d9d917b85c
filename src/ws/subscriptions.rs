//! Channel → listener map that survives reconnects.
//!
//! The registry is the single source of truth for which channels should be subscribed on the
//! server. After every successful open the connection manager replays it: at most one
//! `subscribe` envelope per channel, however many listeners the channel has.

use std::collections::BTreeSet;

use serde_json::Value;

use super::registry::{Callback, Dispatch, ListenerId, ListenerRegistry};

#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    channels: ListenerRegistry,
}

impl SubscriptionRegistry {
    /// Returns `true` when `channel` gained its first listener and needs a subscribe envelope.
    pub(crate) fn add(&mut self, channel: &str, id: ListenerId, callback: Callback) -> bool {
        self.channels.insert(channel, id, callback)
    }

    /// Returns `true` when `channel` lost its last listener and needs an unsubscribe envelope.
    pub(crate) fn remove(&mut self, channel: &str, id: Option<ListenerId>) -> bool {
        self.channels.remove(channel, id)
    }

    pub(crate) fn deliver(&self, channel: &str, payload: Value) -> Option<Dispatch> {
        let callbacks = self.channels.listeners(channel);
        if callbacks.is_empty() {
            return None;
        }
        Some(Dispatch::new("subscription", channel, callbacks, payload))
    }

    pub(crate) fn channels(&self) -> Vec<String> {
        self.channels.keys()
    }

    /// Channels to re-subscribe after an open, skipping those already covered on the new
    /// transport (sent directly, flushed, or still waiting in the outbound queue).
    pub(crate) fn replay_plan(&self, covered: &BTreeSet<String>) -> Vec<String> {
        self.channels
            .keys()
            .into_iter()
            .filter(|channel| !covered.contains(channel))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.channels.clear();
    }
}

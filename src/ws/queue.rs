#![expect(
    clippy::module_name_repetitions,
    reason = "Queue types expose their domain in the name for clarity"
)]

use std::collections::{BTreeSet, VecDeque};

/// Subscription bookkeeping carried by queued control envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Control {
    Subscribe(String),
    Unsubscribe(String),
}

/// One serialized envelope waiting for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Queued {
    pub(crate) text: String,
    pub(crate) control: Option<Control>,
}

/// Result of one drain pass.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub(crate) sent: usize,
    /// Channels whose subscribe envelope was flushed
    pub(crate) subscribed: BTreeSet<String>,
}

/// FIFO buffer for envelopes sent while disconnected.
///
/// Entries leave only through a successful send; a failed send stops the drain with the
/// failing entry still at the head.
///
/// The queue only ever flushes onto a freshly opened transport, where the server holds no
/// subscriptions. Control envelopes are coalesced accordingly: at most one subscribe per
/// channel is kept, and an unsubscribe cancels the pending subscribe instead of being queued.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    entries: VecDeque<Queued>,
}

impl OutboundQueue {
    pub(crate) fn enqueue(&mut self, entry: Queued) {
        match &entry.control {
            Some(Control::Subscribe(channel)) if self.is_pending(channel) => {}
            Some(Control::Unsubscribe(channel)) => {
                self.entries.retain(
                    |queued| !matches!(&queued.control, Some(Control::Subscribe(c)) if c == channel),
                );
            }
            _ => self.entries.push_back(entry),
        }
    }

    /// Whether a subscribe envelope for `channel` is waiting to be flushed.
    pub(crate) fn is_pending(&self, channel: &str) -> bool {
        self.entries
            .iter()
            .any(|queued| matches!(&queued.control, Some(Control::Subscribe(c)) if c == channel))
    }

    /// Channels with a subscribe envelope waiting to be flushed.
    pub(crate) fn pending_subscriptions(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|queued| match &queued.control {
                Some(Control::Subscribe(channel)) => Some(channel.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drop every queued subscribe envelope, keeping application messages.
    pub(crate) fn discard_controls(&mut self) {
        self.entries.retain(|queued| queued.control.is_none());
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn drain<F>(&mut self, mut send: F) -> Drained
    where
        F: FnMut(&str) -> bool,
    {
        let mut drained = Drained::default();
        while let Some(head) = self.entries.front() {
            if !send(&head.text) {
                break;
            }
            drained.sent += 1;
            if let Some(Control::Subscribe(channel)) = self.entries.pop_front().and_then(|q| q.control) {
                drained.subscribed.insert(channel);
            }
        }
        drained
    }
}

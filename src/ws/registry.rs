//! Keyed, ordered listener sets.
//!
//! Both the channel subscriptions and the local event listeners are a map from a string key to
//! callbacks kept in registration order. A key with no callbacks left is removed.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

/// Listener callback. Receives the payload of the delivered message or event.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: BTreeMap<String, Vec<(ListenerId, Callback)>>,
}

impl ListenerRegistry {
    /// Register `callback` under `key`. Returns `true` if the key is new.
    pub(crate) fn insert(&mut self, key: &str, id: ListenerId, callback: Callback) -> bool {
        match self.entries.get_mut(key) {
            Some(listeners) => {
                listeners.push((id, callback));
                false
            }
            None => {
                self.entries.insert(key.to_owned(), vec![(id, callback)]);
                true
            }
        }
    }

    /// Remove one listener, or all of them when `id` is `None`.
    ///
    /// Returns `true` if this call removed the key.
    pub(crate) fn remove(&mut self, key: &str, id: Option<ListenerId>) -> bool {
        let Some(listeners) = self.entries.get_mut(key) else {
            return false;
        };
        match id {
            Some(id) => listeners.retain(|(existing, _)| *existing != id),
            None => listeners.clear(),
        }
        if listeners.is_empty() {
            self.entries.remove(key);
            return true;
        }
        false
    }

    /// Snapshot of the callbacks for `key`, in registration order.
    pub(crate) fn listeners(&self, key: &str) -> Vec<Callback> {
        self.entries
            .get(key)
            .map(|listeners| listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, listeners)| (key, listeners.len())))
            .finish()
    }
}

/// Callbacks collected under the state lock, run after it is released.
pub(crate) struct Dispatch {
    scope: &'static str,
    key: String,
    callbacks: Vec<Callback>,
    data: Value,
}

impl Dispatch {
    pub(crate) fn new(scope: &'static str, key: &str, callbacks: Vec<Callback>, data: Value) -> Self {
        Self {
            scope,
            key: key.to_owned(),
            callbacks,
            data,
        }
    }

    pub(crate) fn run(self) -> usize {
        invoke_all(self.scope, &self.key, &self.callbacks, &self.data)
    }
}

/// Invoke every callback with `data`, isolating panics so one listener cannot starve the rest.
///
/// Returns the number of callbacks that panicked.
pub(crate) fn invoke_all(scope: &str, key: &str, callbacks: &[Callback], data: &Value) -> usize {
    let mut panicked = 0;
    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(data))).is_err() {
            panicked += 1;
            #[cfg(feature = "tracing")]
            tracing::error!(scope, key, "Listener panicked, continuing delivery");
            #[cfg(not(feature = "tracing"))]
            let _ = (scope, key);
        }
    }
    panicked
}

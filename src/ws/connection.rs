#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::dispatcher::{EventDispatcher, LocalEvent};
use super::envelope::{Envelope, parse_envelope};
use super::error::WsError;
use super::heartbeat::HeartbeatMonitor;
use super::queue::{Control, Drained, OutboundQueue, Queued};
use super::reconnect::{ReconnectController, Retry};
use super::registry::{Dispatch, ListenerId};
use super::subscriptions::SubscriptionRegistry;
use super::task;
use super::transport::{
    Connector, EventSink, HEARTBEAT_TIMEOUT_CLOSURE, NORMAL_CLOSURE, Transport, TransportEvent,
    TransportEvents,
};
use crate::{Result, error::Error};

/// Delay before a manual [`ConnectionManager::reconnect`] opens a new transport, giving the
/// previous socket time to drain.
const MANUAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting for a retry timer, or given up after exhausting retries
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
    },
    /// Closed on purpose; no automatic retries
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Snapshot returned by [`ConnectionManager::status`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub subscriptions: Vec<String>,
    pub queued_messages: usize,
}

/// Network reachability reported by the host environment.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Page or application visibility reported by the host environment.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Handle for one channel listener, returned by [`ConnectionManager::subscribe`].
///
/// Dropping the handle keeps the listener registered; call [`Subscription::unsubscribe`] to
/// remove it.
#[derive(Debug)]
pub struct Subscription {
    shared: Weak<Shared>,
    channel: String,
    id: ListenerId,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove this listener. The channel is unsubscribed on the server when it was the last one.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(&self.channel, Some(self.id));
        }
    }
}

/// Handle for one local event listener, returned by [`ConnectionManager::on`].
#[derive(Debug)]
pub struct EventListener {
    shared: Weak<Shared>,
    event: String,
    id: ListenerId,
}

impl EventListener {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn off(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.off(&self.event, Some(self.id));
        }
    }
}

struct UnsubscribeOnDrop(Option<Subscription>);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }
}

/// Manages one realtime connection: lifecycle, heartbeat, reconnection, outbound queueing,
/// channel subscriptions and local events.
///
/// The manager is a cheap handle; clones share the same connection. Nothing here returns an
/// error after construction: failures surface as [`LocalEvent`]s and log lines.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(Config::new("wss://realtime.example.com/app"), connector)?;
///
/// let _sub = manager.subscribe("ticket.updates", |payload| {
///     println!("update: {payload}");
/// });
/// manager.on(LocalEvent::Connected, |_| println!("connected"));
/// manager.connect();
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: Config,
    connector: Box<dyn Connector>,
    runtime: Handle,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    weak_self: Weak<Shared>,
}

struct Inner {
    state: ConnectionState,
    /// Bumped for every transport opened or abandoned; events tagged otherwise are stale
    generation: u64,
    transport: Option<Box<dyn Transport>>,
    /// Channels whose subscribe envelope was written to the current transport
    announced: BTreeSet<String>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectController,
    queue: OutboundQueue,
    subscriptions: SubscriptionRegistry,
    events: EventDispatcher,
    destroyed: bool,
}

impl ConnectionManager {
    /// Create a new connection manager. Does not connect; call [`Self::connect`].
    ///
    /// Must be called from within a tokio runtime, which drives the heartbeat and retry timers.
    pub fn new<C: Connector>(config: Config, connector: C) -> Result<Self> {
        if config.heartbeat_interval.is_zero() {
            return Err(Error::validation("heartbeat_interval must be non-zero"));
        }
        let runtime = Handle::try_current().map_err(|_e| WsError::NoRuntime)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Arc::new_cyclic(|weak_self| Shared {
            config,
            connector: Box::new(connector),
            runtime,
            state_tx,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                generation: 0,
                transport: None,
                announced: BTreeSet::new(),
                heartbeat: HeartbeatMonitor::default(),
                reconnect: ReconnectController::default(),
                queue: OutboundQueue::default(),
                subscriptions: SubscriptionRegistry::default(),
                events: EventDispatcher::default(),
                destroyed: false,
            }),
            weak_self: weak_self.clone(),
        });

        Ok(Self { shared })
    }

    /// Create a manager backed by the tokio-tungstenite transport.
    #[cfg(feature = "ws")]
    pub fn websocket(config: Config) -> Result<Self> {
        Self::new(config, super::tungstenite::TungsteniteConnector)
    }

    /// Open the connection. No-op unless currently disconnected or closed.
    pub fn connect(&self) {
        self.shared.with(|shared, inner, fx| {
            if inner.destroyed {
                return;
            }
            match inner.state {
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    inner.reconnect.reset();
                    shared.open_transport(inner, fx);
                }
                _state => {
                    #[cfg(feature = "tracing")]
                    if shared.config.debug {
                        tracing::debug!(state = ?_state, "connect() ignored, connection already active");
                    }
                }
            }
        });
    }

    /// Close the connection for good. Registries are kept; [`Self::connect`] re-opens.
    pub fn disconnect(&self) {
        self.shared.with(|shared, inner, fx| {
            if inner.destroyed || inner.state == ConnectionState::Closed {
                return;
            }
            shared.shutdown(inner, fx, "client disconnect");
        });
    }

    /// Drop the current connection and any pending retry, reset the attempt count, and open a
    /// fresh connection after a short delay.
    pub fn reconnect(&self) {
        self.shared.reconnect();
    }

    /// Send an envelope, or queue it until the next successful open.
    ///
    /// Returns `true` when it was written to an open transport.
    pub fn send<R: Serialize>(&self, message: &R) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "Unable to serialize outbound message");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_json::Error = &e;
                return false;
            }
        };
        self.shared
            .with(|shared, inner, _| shared.send_text(inner, text, None))
    }

    /// Listen to pushes on `channel`. The first listener on a channel subscribes it on the server.
    pub fn subscribe<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.shared.with(|shared, inner, _| {
            if inner.destroyed {
                return;
            }
            if inner.subscriptions.add(channel, id, Arc::new(callback)) {
                #[cfg(feature = "tracing")]
                if shared.config.debug {
                    tracing::debug!(channel, "Subscribing to channel");
                }
                shared.send_control(inner, &Envelope::subscribe(channel), Control::Subscribe(channel.to_owned()));
            }
        });

        Subscription {
            shared: Arc::downgrade(&self.shared),
            channel: channel.to_owned(),
            id,
        }
    }

    /// Remove one listener from `channel`, or all of them when `listener` is `None`.
    pub fn unsubscribe(&self, channel: &str, listener: Option<ListenerId>) {
        self.shared.unsubscribe(channel, listener);
    }

    /// Stream of payloads pushed on `channel`. Dropping the stream removes its listener.
    pub fn subscription_stream(&self, channel: &str) -> impl Stream<Item = Value> + use<> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(channel, move |payload| {
            _ = tx.send(payload.clone());
        });
        let guard = UnsubscribeOnDrop(Some(subscription));

        async_stream::stream! {
            let _guard = guard;
            while let Some(payload) = rx.recv().await {
                yield payload;
            }
        }
    }

    /// Listen to a local event: a [`LocalEvent`] or the name of a server broadcast.
    pub fn on<E, F>(&self, event: E, callback: F) -> EventListener
    where
        E: AsRef<str>,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.as_ref();
        let id = ListenerId::next();
        self.shared.with(|_, inner, _| {
            if !inner.destroyed {
                inner.events.on(event, id, Arc::new(callback));
            }
        });

        EventListener {
            shared: Arc::downgrade(&self.shared),
            event: event.to_owned(),
            id,
        }
    }

    /// Remove one local listener, or all listeners for `event` when `listener` is `None`.
    pub fn off<E: AsRef<str>>(&self, event: E, listener: Option<ListenerId>) {
        self.shared.off(event.as_ref(), listener);
    }

    /// React to a network reachability change from the host environment.
    pub fn notify_network(&self, status: NetworkStatus) {
        match status {
            NetworkStatus::Online => {
                if self.shared.is_recoverable() {
                    self.reconnect();
                }
            }
            NetworkStatus::Offline => {
                self.shared.with(|shared, inner, fx| {
                    if !inner.destroyed {
                        shared.emit(inner, fx, LocalEvent::NetworkOffline, Value::Null);
                    }
                });
            }
        }
    }

    /// React to a visibility change from the host environment.
    pub fn notify_visibility(&self, visibility: Visibility) {
        if visibility == Visibility::Visible && self.shared.is_recoverable() {
            self.reconnect();
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        let inner = self.shared.lock();
        Status {
            connected: inner.state.is_connected(),
            reconnect_attempts: inner.reconnect.attempts(),
            subscriptions: inner.subscriptions.channels(),
            queued_messages: inner.queue.len(),
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Close the connection and clear every registry and the queue. The manager is inert
    /// afterwards.
    pub fn destroy(&self) {
        self.shared.with(|shared, inner, fx| {
            if inner.destroyed {
                return;
            }
            if inner.state != ConnectionState::Closed {
                shared.shutdown(inner, fx, "client destroyed");
            }
            inner.subscriptions.clear();
            inner.events.clear();
            inner.queue.clear();
            inner.destroyed = true;
        });
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner is only mutated by our own code, never while user callbacks run.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the state lock, then invoke the listeners it collected.
    fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Self, &mut Inner, &mut Vec<Dispatch>) -> R,
    {
        let mut fx = Vec::new();
        let result = {
            let mut inner = self.lock();
            f(self, &mut *inner, &mut fx)
        };
        for dispatch in fx {
            dispatch.run();
        }
        result
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        if self.config.debug {
            tracing::debug!(from = ?inner.state, to = ?state, "Connection state change");
        }
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, inner: &Inner, fx: &mut Vec<Dispatch>, event: LocalEvent, data: Value) {
        #[cfg(feature = "tracing")]
        if self.config.debug {
            tracing::debug!(event = %event, "Emitting local event");
        }
        fx.extend(inner.events.prepare(event.as_ref(), data));
    }

    fn is_live(inner: &Inner, generation: u64) -> bool {
        !inner.destroyed && inner.generation == generation
    }

    fn is_recoverable(&self) -> bool {
        let inner = self.lock();
        !inner.destroyed
            && matches!(
                inner.state,
                ConnectionState::Disconnected | ConnectionState::Reconnecting { .. }
            )
    }

    fn open_transport(&self, inner: &mut Inner, fx: &mut Vec<Dispatch>) {
        inner.reconnect.cancel();
        if let Some(stale) = inner.transport.take() {
            stale.close(NORMAL_CLOSURE, "superseded");
        }
        inner.generation += 1;
        self.set_state(inner, ConnectionState::Connecting);

        let sink: Weak<dyn EventSink> = self.weak_self.clone();
        let events = TransportEvents::new(inner.generation, sink);
        match self.connector.open(&self.config.url, events) {
            Ok(transport) => inner.transport = Some(transport),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(url = %self.config.url, error = %e, "Unable to open transport");
                self.emit(inner, fx, LocalEvent::Error, json!({ "message": e.to_string() }));
                self.schedule_retry(inner, fx);
            }
        }
    }

    fn schedule_retry(&self, inner: &mut Inner, fx: &mut Vec<Dispatch>) {
        match inner.reconnect.schedule(&self.config.reconnect) {
            Retry::Scheduled {
                attempt,
                delay,
                token,
            } => {
                #[cfg(feature = "tracing")]
                tracing::info!(attempt, delay_ms = delay.as_millis(), "Scheduling reconnect");
                self.set_state(inner, ConnectionState::Reconnecting { attempt });
                self.spawn_retry(token, delay);
            }
            Retry::Exhausted { attempts } => {
                #[cfg(feature = "tracing")]
                tracing::error!(attempts, "Max reconnection attempts reached");
                self.set_state(inner, ConnectionState::Reconnecting { attempt: attempts });
                self.emit(
                    inner,
                    fx,
                    LocalEvent::MaxReconnectAttempts,
                    json!({ "attempts": attempts }),
                );
            }
            Retry::GaveUp => {}
        }
    }

    fn spawn_retry(&self, token: CancellationToken, delay: Duration) {
        let weak = self.weak_self.clone();
        task::spawn_after(&self.runtime, token, delay, move |token| {
            if let Some(shared) = weak.upgrade() {
                shared.retry_fired(&token);
            }
        });
    }

    fn retry_fired(&self, token: &CancellationToken) {
        self.with(|shared, inner, fx| {
            if inner.destroyed || !inner.reconnect.is_current(token) {
                return;
            }
            inner.reconnect.fired();
            shared.open_transport(inner, fx);
        });
    }

    fn reconnect(&self) {
        self.with(|shared, inner, fx| {
            if inner.destroyed {
                return;
            }
            #[cfg(feature = "tracing")]
            tracing::info!("Manual reconnect requested");
            shared.drop_transport(inner, fx, NORMAL_CLOSURE, "client reconnect");
            let token = inner.reconnect.schedule_manual();
            shared.set_state(inner, ConnectionState::Reconnecting { attempt: 0 });
            shared.spawn_retry(token, MANUAL_RECONNECT_DELAY);
        });
    }

    /// Stop the heartbeat, close and forget the transport, and report the disconnect if the
    /// connection was up. Later events from the old transport are ignored.
    fn drop_transport(&self, inner: &mut Inner, fx: &mut Vec<Dispatch>, code: u16, reason: &str) {
        inner.heartbeat.stop();
        if let Some(transport) = inner.transport.take() {
            transport.close(code, reason);
        }
        inner.announced.clear();
        inner.generation += 1;
        if inner.state.is_connected() {
            self.emit(
                inner,
                fx,
                LocalEvent::Disconnected,
                json!({ "code": code, "reason": reason }),
            );
        }
    }

    fn shutdown(&self, inner: &mut Inner, fx: &mut Vec<Dispatch>, reason: &str) {
        inner.reconnect.cancel();
        self.drop_transport(inner, fx, NORMAL_CLOSURE, reason);
        self.set_state(inner, ConnectionState::Closed);
    }

    fn unsubscribe(&self, channel: &str, listener: Option<ListenerId>) {
        self.with(|shared, inner, _| {
            if inner.destroyed {
                return;
            }
            if inner.subscriptions.remove(channel, listener) {
                #[cfg(feature = "tracing")]
                if shared.config.debug {
                    tracing::debug!(channel, "Unsubscribing from channel");
                }
                shared.send_control(
                    inner,
                    &Envelope::unsubscribe(channel),
                    Control::Unsubscribe(channel.to_owned()),
                );
            }
        });
    }

    fn off(&self, event: &str, listener: Option<ListenerId>) {
        self.with(|_, inner, _| inner.events.off(event, listener));
    }

    /// Public send path: write now if connected, otherwise queue.
    fn send_text(&self, inner: &mut Inner, text: String, control: Option<Control>) -> bool {
        if inner.destroyed {
            return false;
        }
        if inner.state.is_connected()
            && let Some(transport) = inner.transport.as_deref()
            && transport.send(&text)
        {
            #[cfg(feature = "tracing")]
            if self.config.debug {
                tracing::trace!(%text, "Sent message");
            }
            match control {
                Some(Control::Subscribe(channel)) => {
                    inner.announced.insert(channel);
                }
                Some(Control::Unsubscribe(channel)) => {
                    inner.announced.remove(&channel);
                }
                None => {}
            }
            return true;
        }

        if let Some(Control::Unsubscribe(channel)) = &control {
            inner.announced.remove(channel);
        }

        #[cfg(feature = "tracing")]
        if self.config.debug {
            tracing::debug!(queued = inner.queue.len() + 1, "Queued message until connected");
        }
        inner.queue.enqueue(Queued { text, control });
        false
    }

    fn send_control(&self, inner: &mut Inner, envelope: &Envelope, control: Control) -> bool {
        match serde_json::to_string(envelope) {
            Ok(text) => self.send_text(inner, text, Some(control)),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, kind = envelope.kind(), "Unable to serialize envelope");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_json::Error = &e;
                false
            }
        }
    }

    /// Write straight to the transport without queueing. Used for heartbeats, which are
    /// meaningless once the connection is gone.
    fn send_direct(&self, inner: &Inner, envelope: &Envelope) -> bool {
        let Some(transport) = inner.transport.as_deref() else {
            return false;
        };
        match serde_json::to_string(envelope) {
            Ok(text) => transport.send(&text),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, kind = envelope.kind(), "Unable to serialize envelope");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_json::Error = &e;
                false
            }
        }
    }

    fn drain(&self, inner: &mut Inner) -> Drained {
        let Some(transport) = inner.transport.as_deref() else {
            return Drained::default();
        };
        let drained = inner.queue.drain(|text| transport.send(text));

        #[cfg(feature = "tracing")]
        if self.config.debug && drained.sent > 0 {
            tracing::debug!(
                sent = drained.sent,
                remaining = inner.queue.len(),
                "Flushed queued messages"
            );
        }
        drained
    }

    /// Subscribe every registered channel the current transport has not seen yet and that has
    /// no subscribe envelope waiting in the queue.
    fn replay(&self, inner: &mut Inner) {
        let mut covered = inner.queue.pending_subscriptions();
        covered.extend(inner.announced.iter().cloned());
        let channels = inner.subscriptions.replay_plan(&covered);

        #[cfg(feature = "tracing")]
        if self.config.debug && !channels.is_empty() {
            tracing::debug!(count = channels.len(), "Re-subscribing to channels");
        }
        for channel in channels {
            self.send_control(inner, &Envelope::subscribe(channel.as_str()), Control::Subscribe(channel));
        }
    }

    fn start_heartbeat(&self, inner: &mut Inner) {
        let token = inner.heartbeat.start();
        let weak = self.weak_self.clone();
        task::spawn_every(
            &self.runtime,
            token,
            self.config.heartbeat_interval,
            move |token| match weak.upgrade() {
                Some(shared) => shared.heartbeat_tick(token),
                None => token.cancel(),
            },
        );
    }

    fn heartbeat_tick(&self, token: &CancellationToken) {
        self.with(|shared, inner, fx| {
            if inner.destroyed || !inner.heartbeat.is_current(token) {
                return;
            }
            if inner.heartbeat.is_expired(shared.config.heartbeat_timeout) {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    timeout = ?shared.config.heartbeat_timeout,
                    "Heartbeat timeout: nothing received, dropping connection"
                );
                shared.drop_transport(inner, fx, HEARTBEAT_TIMEOUT_CLOSURE, "heartbeat timeout");
                shared.schedule_retry(inner, fx);
                return;
            }
            shared.send_direct(inner, &HeartbeatMonitor::ping());
        });
    }

    fn handle_open(&self, generation: u64) {
        let replay_after = self.with(|shared, inner, fx| {
            if !Self::is_live(inner, generation) || inner.state != ConnectionState::Connecting {
                return false;
            }
            #[cfg(feature = "tracing")]
            tracing::info!(url = %shared.config.url, "Connected");

            shared.set_state(inner, ConnectionState::Connected { since: Instant::now() });
            inner.reconnect.reset();
            inner.announced.clear();
            shared.start_heartbeat(inner);

            if shared.config.replay_before_drain {
                // The registry covers every queued subscribe; only application messages remain.
                inner.queue.discard_controls();
                shared.replay(inner);
                let drained = shared.drain(inner);
                inner.announced.extend(drained.subscribed);
                shared.emit(inner, fx, LocalEvent::Connected, Value::Null);
                return false;
            }

            let drained = shared.drain(inner);
            inner.announced.extend(drained.subscribed);
            shared.emit(inner, fx, LocalEvent::Connected, Value::Null);
            true
        });

        // Replay runs after the "connected" listeners, matching the documented open sequence.
        // Channels those listeners subscribed in the meantime are already announced.
        if replay_after {
            self.with(|shared, inner, _| {
                if Self::is_live(inner, generation) && inner.state.is_connected() {
                    shared.replay(inner);
                }
            });
        }
    }

    fn handle_message(&self, inner: &mut Inner, fx: &mut Vec<Dispatch>, text: &str) {
        inner.heartbeat.record_inbound();

        #[cfg(feature = "tracing")]
        if self.config.debug {
            tracing::trace!(%text, "Received WebSocket text message");
        }

        match parse_envelope(text) {
            Ok(Envelope::Heartbeat(heartbeat)) => {
                if let Some(reply) = HeartbeatMonitor::reply_to(&heartbeat) {
                    self.send_direct(inner, &reply);
                }
            }
            Ok(Envelope::Subscription(delivery)) => {
                match inner.subscriptions.deliver(&delivery.channel, delivery.payload) {
                    Some(dispatch) => fx.push(dispatch),
                    None => {
                        #[cfg(feature = "tracing")]
                        if self.config.debug {
                            tracing::debug!(channel = %delivery.channel, "No listeners for channel");
                        }
                    }
                }
            }
            Ok(Envelope::Broadcast(broadcast)) => {
                fx.extend(inner.events.prepare(&broadcast.event, broadcast.payload));
            }
            Ok(Envelope::Error(error)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(message = %error.message, "Server reported an error");
                self.emit(
                    inner,
                    fx,
                    LocalEvent::ServerError,
                    json!({ "message": error.message }),
                );
            }
            Ok(_envelope) => {
                #[cfg(feature = "tracing")]
                if self.config.debug {
                    tracing::debug!(kind = _envelope.kind(), "Ignoring client-bound control envelope");
                }
            }
            Err(WsError::UnknownMessageType(_kind)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(kind = %_kind, "Ignoring message with unknown type");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %_e, "Failed to parse WebSocket message");
            }
        }
    }

    fn handle_close(&self, inner: &mut Inner, fx: &mut Vec<Dispatch>, code: u16, reason: &str) {
        #[cfg(feature = "tracing")]
        tracing::info!(code, reason, "Transport closed");

        self.drop_transport(inner, fx, code, reason);
        if code == NORMAL_CLOSURE {
            inner.reconnect.cancel();
            self.set_state(inner, ConnectionState::Closed);
        } else {
            self.schedule_retry(inner, fx);
        }
    }
}

impl EventSink for Shared {
    fn deliver(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_open(generation),
            TransportEvent::Message(text) => self.with(|shared, inner, fx| {
                if Self::is_live(inner, generation) && inner.state.is_connected() {
                    shared.handle_message(inner, fx, &text);
                }
            }),
            TransportEvent::Closed { code, reason } => self.with(|shared, inner, fx| {
                if Self::is_live(inner, generation) {
                    shared.handle_close(inner, fx, code, &reason);
                }
            }),
            TransportEvent::Failed(message) => self.with(|shared, inner, fx| {
                if Self::is_live(inner, generation) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %message, "Transport failure");
                    shared.emit(inner, fx, LocalEvent::Error, json!({ "message": message }));
                }
            }),
        }
    }
}

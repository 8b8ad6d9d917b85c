//! Realtime connection infrastructure.
//!
//! One [`ConnectionManager`] owns one persistent connection and multiplexes any number of
//! channel subscriptions over it. It keeps the connection alive with heartbeats, retries with
//! capped exponential backoff, queues outbound messages while offline, and re-subscribes every
//! channel after each successful (re)connect.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Lifecycle state machine and public API
//! - [`Connector`] / [`Transport`]: Seam to the underlying socket; [`TungsteniteConnector`]
//!   is the default implementation behind the `ws` feature
//! - [`Envelope`]: JSON wire format, discriminated by `type`
//! - [`LocalEvent`]: Lifecycle notifications delivered through [`ConnectionManager::on`]
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::websocket(Config::from_env())?;
//!
//! let subscription = manager.subscribe("ticket.updates", |payload| {
//!     println!("{payload}");
//! });
//! manager.connect();
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub(crate) mod heartbeat;
pub(crate) mod queue;
pub(crate) mod reconnect;
pub mod registry;
pub(crate) mod subscriptions;
pub(crate) mod task;
pub mod transport;
#[cfg(feature = "ws")]
pub mod tungstenite;

pub use config::{Config, ReconnectConfig};
pub use connection::{
    ConnectionManager, ConnectionState, EventListener, NetworkStatus, Status, Subscription,
    Visibility,
};
pub use dispatcher::LocalEvent;
pub use envelope::{Envelope, parse_envelope};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use registry::{Callback, ListenerId};
pub use transport::{Connector, Transport, TransportEvent, TransportEvents};
#[cfg(feature = "ws")]
pub use tungstenite::{TungsteniteConnector, TungsteniteTransport};

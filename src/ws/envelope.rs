//! Wire envelopes exchanged over the realtime transport.
//!
//! Every frame is a JSON object discriminated by its `type` field. Known types map onto
//! [`Envelope`] variants; anything else is reported as [`WsError::UnknownMessageType`] so the
//! caller can log and skip it.

use std::borrow::Cow;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WsError;

/// Types the parser understands. Kept in sync with the [`Envelope`] variants.
const KNOWN_TYPES: [&str; 6] = [
    "heartbeat",
    "subscription",
    "broadcast",
    "error",
    "subscribe",
    "unsubscribe",
];

/// One discrete message on the wire.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Keep-alive ping or pong, in either direction
    Heartbeat(Heartbeat),
    /// Server push for a subscribed channel
    Subscription(Delivery),
    /// Server-wide event, re-emitted locally under its event name
    Broadcast(Broadcast),
    /// Error reported by the server
    Error(ServerError),
    /// Client request to start receiving a channel
    Subscribe(ChannelRequest),
    /// Client request to stop receiving a channel
    Unsubscribe(ChannelRequest),
}

impl Envelope {
    #[must_use]
    pub fn ping() -> Self {
        Self::Heartbeat(Heartbeat {
            action: Some(HeartbeatAction::Ping),
            timestamp: Some(now()),
        })
    }

    #[must_use]
    pub fn pong() -> Self {
        Self::Heartbeat(Heartbeat {
            action: Some(HeartbeatAction::Pong),
            timestamp: Some(now()),
        })
    }

    #[must_use]
    pub fn subscribe<S: Into<String>>(channel: S) -> Self {
        Self::Subscribe(ChannelRequest {
            channel: channel.into(),
            timestamp: Some(now()),
        })
    }

    #[must_use]
    pub fn unsubscribe<S: Into<String>>(channel: S) -> Self {
        Self::Unsubscribe(ChannelRequest {
            channel: channel.into(),
            timestamp: Some(now()),
        })
    }

    /// The wire `type` of this envelope.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => "heartbeat",
            Self::Subscription(_) => "subscription",
            Self::Broadcast(_) => "broadcast",
            Self::Error(_) => "error",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HeartbeatAction {
    Ping,
    Pong,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<HeartbeatAction>,
    /// ISO-8601, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Payload pushed to a subscribed channel.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub event: String,
    #[serde(default, alias = "data")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
struct TypePeek<'a> {
    #[serde(rename = "type", borrow, default)]
    kind: Option<Cow<'a, str>>,
}

/// Parse one inbound text frame.
///
/// The `type` is peeked first so unknown types are reported as
/// [`WsError::UnknownMessageType`] rather than as a parse failure.
pub fn parse_envelope(text: &str) -> Result<Envelope, WsError> {
    let peek: TypePeek<'_> = serde_json::from_str(text).map_err(WsError::MessageParse)?;
    match peek.kind.as_deref() {
        Some(kind) if KNOWN_TYPES.contains(&kind) => {
            serde_json::from_str(text).map_err(WsError::MessageParse)
        }
        Some(kind) => Err(WsError::UnknownMessageType(kind.to_owned())),
        None => Err(WsError::UnknownMessageType(String::new())),
    }
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! WebSocket transport backed by `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt as _, StreamExt as _};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::error::WsError;
use super::transport::{ABNORMAL_CLOSURE, Connector, Transport, TransportEvents};
use crate::Result;

/// Close code reported when the server closed without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens one WebSocket per [`Connector::open`] call on the current tokio runtime.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Write half of a tokio-tungstenite connection.
#[derive(Debug)]
pub struct TungsteniteTransport {
    sender: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl Transport for TungsteniteTransport {
    fn send(&self, text: &str) -> bool {
        self.open.load(Ordering::Acquire) && self.sender.send(Outgoing::Text(text.to_owned())).is_ok()
    }

    fn close(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::Release);
        _ = self.sender.send(Outgoing::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let endpoint = Url::parse(url)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(WsError::InvalidUrl(url.to_owned()).into());
        }
        let runtime = Handle::try_current().map_err(|_e| WsError::NoRuntime)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        runtime.spawn(run(endpoint.to_string(), receiver, Arc::clone(&open), events));

        Ok(Box::new(TungsteniteTransport { sender, open }))
    }
}

/// Drive one connection until either side closes it.
///
/// A close requested through the transport is not reported back: the connection manager has
/// already moved on from this attempt.
async fn run(
    endpoint: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    open: Arc<AtomicBool>,
    events: TransportEvents,
) {
    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let error = WsError::Connection(e).to_string();
            #[cfg(feature = "tracing")]
            tracing::warn!(%endpoint, %error, "Unable to connect");
            events.failed(&error);
            events.closed(ABNORMAL_CLOSURE, &error);
            return;
        }
    };

    open.store(true, Ordering::Release);
    events.opened();

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => events.message(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    open.store(false, Ordering::Release);
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                    );
                    events.closed(code, &reason);
                    return;
                }
                Some(Ok(_)) => {
                    // Binary frames and protocol-level ping/pong carry no envelopes.
                }
                Some(Err(e)) => {
                    open.store(false, Ordering::Release);
                    let error = WsError::Connection(e).to_string();
                    events.failed(&error);
                    events.closed(ABNORMAL_CLOSURE, &error);
                    return;
                }
                None => {
                    open.store(false, Ordering::Release);
                    events.closed(ABNORMAL_CLOSURE, "stream ended");
                    return;
                }
            },

            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        open.store(false, Ordering::Release);
                        let error = WsError::Connection(e).to_string();
                        events.failed(&error);
                        events.closed(ABNORMAL_CLOSURE, &error);
                        return;
                    }
                }
                Some(Outgoing::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    _ = write.send(Message::Close(Some(frame))).await;
                    return;
                }
                None => {
                    _ = write.close().await;
                    return;
                }
            },
        }
    }
}

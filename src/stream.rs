//! Live event stream over a WebSocket.
//!
//! Protocol:
//!
//! 1. Upgrade `<base_url>/v1/events/stream`, with `https` mapped to `wss`
//!    and `http` to `ws`. The bearer credential rides on the upgrade
//!    request.
//! 2. Send exactly one subscription frame before reading anything:
//!    `{"type":"subscribe","event_types":[...],"device_ids":[...]}`.
//!    Empty or unset filters are left out of the frame.
//! 3. Each inbound `{"type":"event","event":{...}}` frame yields one
//!    decoded [`Event`]. Frames of any other `type` are skipped.
//!
//! The stream never ends on its own while the socket is up. It ends
//! (`next_event` returns `None`) when the server closes the socket or the
//! connection drops; nothing reconnects. To stop from the caller's side,
//! call [`EventStream::close`] or drop the stream.

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::client::MeshLogicClient;
use crate::error::{DecodeError, MeshLogicError, Result};
use crate::event::{Event, EventType};

const STREAM_PATH: &str = "/v1/events/stream";

/// Filters for [`Events::stream`](crate::events::Events::stream).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSubscription {
    /// Only these event types. Empty means all.
    pub event_types: Vec<EventType>,
    /// Only events from these devices. Empty means all.
    pub device_ids: Vec<String>,
}

impl StreamSubscription {
    /// Restricts the stream to the given event types.
    pub fn event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types = types.into_iter().collect();
        self
    }

    /// Restricts the stream to the given devices.
    pub fn device_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.device_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    fn frame(&self) -> SubscribeFrame<'_> {
        SubscribeFrame {
            kind: "subscribe",
            event_types: non_empty(&self.event_types),
            device_ids: non_empty(&self.device_ids),
        }
    }
}

/// Wire form of the subscription message.
#[derive(Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_types: Option<&'a [EventType]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_ids: Option<&'a [String]>,
}

fn non_empty<T>(items: &[T]) -> Option<&[T]> {
    (!items.is_empty()).then_some(items)
}

/// An open event subscription.
///
/// Holds the socket for as long as it lives; dropping it releases the
/// connection without a close handshake.
pub struct EventStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl EventStream {
    pub(crate) async fn connect(
        client: &MeshLogicClient,
        subscription: &StreamSubscription,
    ) -> Result<Self> {
        let url = stream_url(client.base_url())?;
        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", client.api_key().expose_secret()))
            .map_err(|_| {
                MeshLogicError::authentication("API key contains characters not allowed in a header")
            })?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (mut socket, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!(%url, "event stream connected");

        let frame = serde_json::to_string(&subscription.frame())?;
        socket.send(Message::text(frame)).await?;
        tracing::info!(
            event_types = subscription.event_types.len(),
            device_ids = subscription.device_ids.len(),
            "event stream subscribed"
        );

        Ok(EventStream { socket })
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the connection is closed or dropped. Malformed
    /// frames yield `Some(Err(..))` and the stream stays usable; socket
    /// errors also yield `Some(Err(..))`, after which the next call
    /// normally returns `None`.
    pub async fn next_event(&mut self) -> Option<Result<Event>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            let frame: Value = match message {
                Message::Text(text) => match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => return Some(Err(e.into())),
                },
                Message::Binary(data) => match serde_json::from_slice(&data) {
                    Ok(frame) => frame,
                    Err(e) => return Some(Err(e.into())),
                },
                Message::Close(reason) => {
                    tracing::info!(?reason, "event stream closed by server");
                    return None;
                }
                // Pings are answered by tungstenite itself.
                _ => continue,
            };
            if let Some(result) = decode_frame(&frame) {
                return Some(result);
            }
        }
    }

    /// Sends a close frame and waits for the socket to shut down.
    pub async fn close(mut self) -> Result<()> {
        match self.socket.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                tracing::info!("event stream closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

/// Interprets one parsed frame. `None` means "not an event, keep reading".
fn decode_frame(frame: &Value) -> Option<Result<Event>> {
    let kind = frame.get("type").and_then(Value::as_str);
    if kind != Some("event") {
        tracing::debug!(frame_type = ?kind, "ignoring stream frame");
        return None;
    }
    Some(match frame.get("event") {
        Some(event) => Event::from_value(event),
        None => Err(DecodeError::MissingField {
            field: "event".to_string(),
        }
        .into()),
    })
}

/// Derives the WebSocket URL from the REST base URL.
fn stream_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| MeshLogicError::Config(format!("invalid base URL '{base_url}': {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(MeshLogicError::Config(format!(
                "no WebSocket scheme for base URL scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| MeshLogicError::Config(format!("cannot switch '{base_url}' to {scheme}")))?;
    let path = format!("{}{STREAM_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

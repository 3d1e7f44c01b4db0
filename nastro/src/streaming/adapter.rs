//! Provider-specific hooks for the streaming client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nastro_core::NastroError;
use nastro_types::{EventPayload, StreamingCapabilities};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// The underlying socket type handed to adapters during authentication.
pub type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One event parsed out of a wire message, before ingress stamping.
///
/// The client owns `receive_time`, `source`, and `sequence`; adapters only
/// supply what the wire actually carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    /// Raw symbol as delivered.
    pub symbol: String,
    /// Decoded payload.
    pub payload: EventPayload,
    /// Provider timestamp, when the wire format carries one.
    pub event_time: Option<DateTime<Utc>>,
}

/// Provider-specific behavior plugged into [`StreamClient`].
///
/// Implementations live outside this workspace (one per vendor wire format);
/// the client drives the shared lifecycle: connect, authenticate, receive,
/// heartbeat, reconnect, resubscribe.
///
/// [`StreamClient`]: super::StreamClient
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    /// Stable lowercase provider identifier; uppercased onto event sources.
    fn name(&self) -> &'static str;

    /// What the provider can stream.
    fn capabilities(&self) -> StreamingCapabilities;

    /// WebSocket endpoint to dial.
    fn endpoint(&self) -> Result<Url, NastroError>;

    /// Extra handshake headers (auth tokens, subprotocol hints).
    fn handshake_headers(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Provider-specific auth exchange run right after the socket opens,
    /// before streaming starts. Errors abort the connect attempt.
    async fn authenticate(&self, socket: &mut WsSocket) -> Result<(), NastroError> {
        let _ = socket;
        Ok(())
    }

    /// Build the total-state subscription message for the given symbol sets.
    ///
    /// Called with the full current state on every change and after every
    /// reconnect; this is not a delta protocol. `None` suppresses the send
    /// (nothing subscribed and the provider needs no empty update).
    fn subscription_message(
        &self,
        trades: &[String],
        depth: &[String],
        quotes: &[String],
    ) -> Option<String>;

    /// Decode one text frame. A frame may carry any number of events;
    /// decode errors are logged by the client and do not stop the stream.
    fn parse_message(&self, text: &str) -> Result<Vec<ParsedEvent>, NastroError>;

    /// Payload of the lightweight liveness probe. `None` uses a protocol
    /// ping frame.
    fn heartbeat_probe(&self) -> Option<String> {
        None
    }
}

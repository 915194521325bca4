//! Push-channel transport.
//!
//! [`PushTransport`] is the seam between the connection manager and the
//! wire. A successful [`connect`](PushTransport::connect) yields a
//! [`PushSession`]: a pair of channels whose inbound half closes when
//! the underlying connection drops. [`WsTransport`] implements it over
//! WebSocket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::messages::{parse_message, ClientMessage, ServerMessage};

/// A live push-channel connection.
///
/// Dropping `outbound` asks the transport to close the connection.
/// `inbound` yielding `None` means the connection is gone.
#[derive(Debug)]
pub struct PushSession {
    /// Identifier sent during the handshake, for log correlation.
    pub client_id: String,
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Something that can open push-channel sessions.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Whether the runtime can use this transport at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Open a new session.
    async fn connect(&self) -> Result<PushSession, ClientError>;
}

/// WebSocket transport targeting a single push endpoint.
pub struct WsTransport {
    ws_url: String,
}

impl WsTransport {
    /// * `ws_url` - WebSocket endpoint, e.g. `ws://host:5000/ws`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    /// Connect to the push endpoint.
    ///
    /// Generates a unique `client_id` (UUID v4) and appends it as a
    /// query parameter, then spawns a pump task that bridges the socket
    /// to the session channels.
    async fn connect(&self) -> Result<PushSession, ClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}clientId={client_id}", self.ws_url);

        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            ClientError::Connection(format!(
                "Failed to connect to push channel at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(client_id = %client_id, "Connected to push channel at {}", self.ws_url);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws_stream, inbound_tx, outbound_rx, client_id.clone()));

        Ok(PushSession {
            client_id,
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Drive one WebSocket: forward outbound control messages and parse
/// inbound text frames until either side goes away.
async fn pump(
    ws_stream: WsStream,
    inbound: mpsc::UnboundedSender<ServerMessage>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    client_id: String,
) {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => {
                let Some(msg) = out else {
                    // Session dropped by the manager.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                tracing::debug!(client_id = %client_id, event = msg.name(), "Sending control message");
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(client_id = %client_id, error = %e, "Failed to encode control message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    tracing::error!(client_id = %client_id, error = %e, "Failed to send control message");
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match parse_message(&text) {
                        Ok(msg) => {
                            if inbound.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                client_id = %client_id,
                                error = %e,
                                raw_message = %text,
                                "Failed to parse push message",
                            );
                        }
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(client_id = %client_id, ?frame, "Push channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(client_id = %client_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::info!(client_id = %client_id, "WebSocket stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

/// Errors that can occur when opening or using a push session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish the connection.
    #[error("Connection error: {0}")]
    Connection(String),
}

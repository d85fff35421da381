//! Transport seam between the lifecycle manager and the wire.
//!
//! The client owns no socket type directly; it asks an injected
//! [`TransportFactory`] for a [`TransportHandle`] per connection attempt.
//! That keeps the lifecycle machine testable against a scripted transport
//! and keeps every client instance isolated (no process-global socket).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{RealtimeError, RtResult};

/// Close code for a deliberate, normal closure. No reconnect.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code for a policy violation. Treated as fatal (auth class).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Synthetic code when the peer closed without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Event observed on an open transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A UTF-8 text frame
    Text(String),
    /// A binary frame, passed through undecoded
    Binary(Vec<u8>),
    /// The peer closed the connection
    Closed { code: u16, reason: String },
    /// A transport-level error; the connection is unusable
    Error(String),
}

/// Channel pair for one live connection.
///
/// Dropping `outgoing` closes the connection gracefully; the implementation
/// sends a normal close frame and tears the socket down.
pub struct TransportHandle {
    /// Outbound text frames
    pub outgoing: mpsc::Sender<String>,
    /// Inbound events
    pub incoming: mpsc::Receiver<TransportEvent>,
}

/// Opens transports on demand. One call per connection attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a connection to `url` and return its channel pair.
    async fn connect(&self, url: &str) -> RtResult<TransportHandle>;
}

/// Production factory backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    buffer: usize,
}

impl WebSocketTransport {
    pub fn new(buffer: usize) -> Self {
        Self { buffer: buffer.max(1) }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransport {
    async fn connect(&self, url: &str) -> RtResult<TransportHandle> {
        let (stream, _) = connect_async(url).await.map_err(RealtimeError::from)?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(self.buffer);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.buffer);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        match outbound {
                            Some(text) => {
                                if let Err(e) = sink.send(Message::Text(text.into())).await {
                                    tracing::warn!("Failed to send frame: {}", e);
                                    let _ = event_tx
                                        .send(TransportEvent::Error(e.to_string()))
                                        .await;
                                    return;
                                }
                            }
                            None => {
                                // Writer dropped: deliberate shutdown
                                let _ = sink
                                    .send(Message::Close(Some(CloseFrame {
                                        code: CloseCode::Normal,
                                        reason: "client disconnect".into(),
                                    })))
                                    .await;
                                return;
                            }
                        }
                    }
                    inbound = source.next() => {
                        match inbound {
                            Some(Ok(Message::Text(text))) => {
                                if event_tx
                                    .send(TransportEvent::Text(text.to_string()))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                if event_tx
                                    .send(TransportEvent::Binary(data.to_vec()))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = sink.send(Message::Pong(data)).await {
                                    tracing::warn!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Close(frame))) => {
                                let code = frame
                                    .as_ref()
                                    .map(|f| u16::from(f.code))
                                    .unwrap_or(CLOSE_NO_STATUS);
                                let reason = frame
                                    .as_ref()
                                    .map(|f| f.reason.to_string())
                                    .unwrap_or_default();
                                let _ = event_tx
                                    .send(TransportEvent::Closed { code, reason })
                                    .await;
                                return;
                            }
                            Some(Ok(Message::Frame(_))) => {}
                            Some(Err(e)) => {
                                tracing::warn!("WebSocket error: {}", e);
                                let _ = event_tx
                                    .send(TransportEvent::Error(e.to_string()))
                                    .await;
                                return;
                            }
                            None => {
                                let _ = event_tx
                                    .send(TransportEvent::Closed {
                                        code: CLOSE_NO_STATUS,
                                        reason: "stream ended".to_string(),
                                    })
                                    .await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(TransportHandle {
            outgoing: out_tx,
            incoming: event_rx,
        })
    }
}

//! Transport seam between the chat client and the socket.
//!
//! A [`Connector`] opens one connection and returns a [`Link`]: a command
//! channel into the socket and an event channel out of it. The client state
//! machine only ever sees these channels, so tests can drive it with an
//! in-memory connector and the real client uses [`WsConnector`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::ClientError;

/// Command sent into an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Request a graceful close handshake.
    Close,
}

/// Signal emitted by an open link. `Closed` is always the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Error(String),
    Closed,
}

/// Both halves of one open connection.
pub struct Link {
    pub tx: mpsc::UnboundedSender<Outbound>,
    pub rx: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens connections. Success means the connection is open.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Link, ClientError>;
}

/// Websocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, ClientError> {
        let (ws, _) = connect_async(url).await?;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, out_rx, event_tx));
        Ok(Link { tx: out_tx, rx: event_rx })
    }
}

/// Shuttle frames between the socket and the link channels until closed.
async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut write, mut read) = ws.split();
    let mut closing = false;

    loop {
        tokio::select! {
            cmd = out_rx.recv(), if !closing => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                // A dropped sender means the client moved on; close politely.
                Some(Outbound::Close) | None => {
                    closing = true;
                    if let Err(e) = write.close().await {
                        debug!(error = %e, "transport: close handshake failed");
                        break;
                    }
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = event_tx.send(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }

    let _ = event_tx.send(TransportEvent::Closed);
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

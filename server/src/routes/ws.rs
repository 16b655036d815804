//! WebSocket handler: per-connection lifecycle and chat relay.
//!
//! DESIGN
//! ======
//! On upgrade, the connection is registered and enters a `select!` loop:
//! - Incoming client frames → `ConnectionEvent` → `Connection::handle`
//! - Relayed envelopes from the registry → forward to client
//!
//! `Connection` is a small state machine that never touches the socket. It
//! mutates the registry and asks it to broadcast; the socket loop owns all
//! transport concerns, which keeps the lifecycle testable with plain channels.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register → private welcome → `joined` to everyone else
//! 2. Client text → parse → chat broadcast to all, sender included
//! 3. Close → unregister → `left` to everyone remaining
//! 4. Error → unregister, then close (which finds nothing, so no `left`)

use axum::extract::State;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use envelope::ChatMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Capacity of each connection's outbound queue.
const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Open,
    Errored,
    Closed,
}

/// Transport signals fed into a [`Connection`].
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A text frame from the client.
    Text(String),
    /// Graceful shutdown of the transport.
    Closed,
    /// Transport failure. Always followed by `Closed`.
    Error(String),
}

/// Server-side view of one client connection.
pub struct Connection {
    client_id: Uuid,
    username: String,
    phase: Phase,
}

impl Connection {
    /// Register a new connection and announce it.
    ///
    /// Returns the connection in `Open` together with the private welcome
    /// message, which the caller must deliver to this client only. The
    /// `joined` notice goes to every other open connection.
    pub async fn accept(state: &AppState, tx: mpsc::Sender<Utf8Bytes>) -> (Self, ChatMessage) {
        let client_id = Uuid::new_v4();
        let mut conn = Self { client_id, username: String::new(), phase: Phase::Connecting };

        conn.username = state.registry.register(client_id, tx).await;
        conn.phase = Phase::Open;

        let welcome = ChatMessage::system(format!("Welcome, {}!", conn.username));
        let joined = ChatMessage::system(format!("{} joined the chat", conn.username));
        state.registry.broadcast(&joined, Some(client_id)).await;

        (conn, welcome)
    }

    #[must_use]
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply one transport event. Events after `Closed` are ignored.
    pub async fn handle(&mut self, state: &AppState, event: ConnectionEvent) {
        match (self.phase, event) {
            (Phase::Closed, event) => {
                debug!(client_id = %self.client_id, ?event, "ws: event after close ignored");
            }
            (Phase::Open, ConnectionEvent::Text(text)) => self.on_text(state, &text).await,
            (_, ConnectionEvent::Text(_)) => {}
            (_, ConnectionEvent::Error(error)) => self.on_error(state, &error).await,
            (_, ConnectionEvent::Closed) => self.on_close(state).await,
        }
    }

    async fn on_text(&self, state: &AppState, text: &str) {
        let request = match envelope::decode_request(text) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "ws: malformed inbound message dropped");
                return;
            }
        };

        let message = ChatMessage::chat(self.username.clone(), request.data);
        state.registry.broadcast(&message, None).await;
    }

    async fn on_close(&mut self, state: &AppState) {
        if let Some(username) = state.registry.unregister(self.client_id).await {
            let left = ChatMessage::system(format!("{username} left the chat"));
            state.registry.broadcast(&left, None).await;
        }
        self.phase = Phase::Closed;
        info!(client_id = %self.client_id, username = %self.username, "ws: client disconnected");
    }

    async fn on_error(&mut self, state: &AppState, error: &str) {
        if self.phase == Phase::Errored {
            return;
        }
        warn!(client_id = %self.client_id, username = %self.username, error, "ws: transport error");
        state.registry.unregister(self.client_id).await;
        self.phase = Phase::Errored;
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION LOOP
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<Utf8Bytes>(OUTBOUND_CAPACITY);
    let (mut conn, welcome) = Connection::accept(&state, tx).await;
    info!(client_id = %conn.client_id(), username = %conn.username(), "ws: client connected");

    // The welcome goes out before the relay loop starts draining `rx`, so
    // it is always the first frame this client sees.
    if let Err(e) = send_message(&mut socket, &welcome).await {
        conn.handle(&state, ConnectionEvent::Error(e)).await;
    }

    while conn.phase() != Phase::Closed {
        if conn.phase() == Phase::Errored {
            conn.handle(&state, ConnectionEvent::Closed).await;
            break;
        }

        let event = tokio::select! {
            msg = socket.recv() => match msg {
                None | Some(Ok(Message::Close(_))) => ConnectionEvent::Closed,
                Some(Err(e)) => ConnectionEvent::Error(e.to_string()),
                Some(Ok(Message::Text(text))) => ConnectionEvent::Text(text.to_string()),
                Some(Ok(_)) => continue,
            },
            Some(text) = rx.recv() => match socket.send(Message::Text(text)).await {
                Ok(()) => continue,
                Err(e) => ConnectionEvent::Error(e.to_string()),
            },
        };

        conn.handle(&state, event).await;
    }
}

async fn send_message(socket: &mut WebSocket, message: &ChatMessage) -> Result<(), String> {
    let text = envelope::encode(message).map_err(|e| e.to_string())?;
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

//! Reconnecting websocket chat client.
//!
//! The `ChatClient` owns at most one live connection, reconnects after a
//! fixed delay when it drops, and publishes received messages into the
//! session history. It is the bridge between the server's envelope protocol
//! and whatever UI sits on top.
//!
//! STATE MACHINE
//! =============
//! `Idle → Connecting → Open → Closed → Connecting → ...`, with `Errored`
//! reachable from `Connecting` or `Open` and always followed by `Closed`.
//! Every close schedules one reconnect after `reconnect_delay` unless the
//! close was requested through [`ChatClient::disconnect`] or the client has
//! been unmounted. At most one reconnect timer is pending at a time.
//!
//! Each connection attempt carries a generation number. Events from a link
//! whose generation is no longer current are ignored, so a superseded
//! connection can never flip state or schedule a reconnect.

#[cfg(test)]
#[path = "chat_client_test.rs"]
mod chat_client_test;

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use envelope::{ChatMessage, ChatRequest};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::net::transport::{Connector, Outbound, TransportEvent, WsConnector};
use crate::state::history::{ClientSession, SharedHistory};

const ERR_CONNECTION: &str = "websocket connection error";
const ERR_ESTABLISH: &str = "failed to establish websocket connection";
const ERR_NOT_CONNECTED: &str = "websocket is not connected";
const ERR_ENCODE: &str = "failed to encode message";

/// Capacity of the live message fan-out to subscribers.
const INCOMING_CAPACITY: usize = 256;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Lifecycle of the client's single logical connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    /// Graceful close requested, waiting for the transport to finish.
    Closing,
    Errored,
    Closed,
}

/// Reactive view exposed to the UI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub connected: bool,
    pub error: Option<String>,
}

/// Handle to a reconnecting chat connection. Clones share one connection.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

/// A client bound to a UI scope: connected on mount, disconnected on drop.
pub struct Mounted {
    client: ChatClient,
}

// =============================================================================
// INTERNALS
// =============================================================================

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    history: SharedHistory,
    status: watch::Sender<Status>,
    incoming: broadcast::Sender<ChatMessage>,
    shared: Mutex<Shared>,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    generation: u64,
    attempts: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    /// Messages received by this client. Uncapped; see `live_messages`.
    live: Vec<ChatMessage>,
    reconnect: Option<JoinHandle<()>>,
    intentional_close: bool,
    torn_down: bool,
}

// =============================================================================
// CHAT CLIENT
// =============================================================================

impl ChatClient {
    /// Build a client over an arbitrary transport.
    #[must_use]
    pub fn new(config: ClientConfig, session: &ClientSession, connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(Status::default());
        let (incoming, _) = broadcast::channel(INCOMING_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                history: session.history(),
                status,
                incoming,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    /// Build a client that talks websocket to `config.url`.
    #[must_use]
    pub fn websocket(config: ClientConfig, session: &ClientSession) -> Self {
        Self::new(config, session, Arc::new(WsConnector))
    }

    /// Start a connection attempt unless one is already pending or open.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Request a graceful close if open. Suppresses the reconnect that
    /// would otherwise follow, but leaves an already pending timer alone.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        if shared.state != ConnectionState::Open {
            return;
        }
        shared.state = ConnectionState::Closing;
        shared.intentional_close = true;
        if let Some(tx) = &shared.outbound {
            let _ = tx.send(Outbound::Close);
        }
        info!(url = %self.inner.config.url, "chat client: disconnect requested");
    }

    /// Send a chat line. Returns `false` and sets the error state when the
    /// connection is not open; never fails otherwise.
    pub fn send_message(&self, text: &str) -> bool {
        match self.inner.try_send(text) {
            Ok(()) => true,
            Err(ClientError::Codec(e)) => {
                warn!(error = %e, "chat client: failed to encode message");
                self.inner.set_error(ERR_ENCODE);
                false
            }
            Err(e) => {
                debug!(error = %e, "chat client: send skipped");
                self.inner.set_error(ERR_NOT_CONNECTED);
                false
            }
        }
    }

    /// Connect now and disconnect when the returned guard is dropped.
    #[must_use]
    pub fn mount(self) -> Mounted {
        self.connect();
        Mounted { client: self }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.status.borrow().connected
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.status.borrow().error.clone()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.inner.status.subscribe()
    }

    /// Live feed of messages received from now on.
    #[must_use]
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.inner.incoming.subscribe()
    }

    /// The session's bounded history, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.history.snapshot()
    }

    /// Every message this client itself has received, oldest first.
    ///
    /// Unlike [`ChatClient::messages`] this list is not capped: it is the
    /// full record for this client's lifetime and is dropped with it.
    /// Long-running consumers should read [`ChatClient::subscribe_messages`]
    /// instead of polling this.
    #[must_use]
    pub fn live_messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().live.clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Number of connection attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.inner.lock().attempts
    }

    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.lock().reconnect.is_some()
    }

    /// Disconnect and stop all future reconnects for this client.
    fn teardown(&self) {
        self.disconnect();
        let mut shared = self.inner.lock();
        shared.torn_down = true;
        if let Some(timer) = shared.reconnect.take() {
            timer.abort();
        }
        debug!(url = %self.inner.config.url, "chat client: torn down");
    }
}

impl Deref for Mounted {
    type Target = ChatClient;

    fn deref(&self) -> &ChatClient {
        &self.client
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.client.teardown();
    }
}

// =============================================================================
// STATE TRANSITIONS
// =============================================================================

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(self: &Arc<Self>) {
        let generation = {
            let mut shared = self.lock();
            if shared.torn_down || matches!(shared.state, ConnectionState::Connecting | ConnectionState::Open) {
                return;
            }
            // A still-closing link is superseded by bumping the generation.
            shared.generation += 1;
            shared.attempts += 1;
            shared.state = ConnectionState::Connecting;
            shared.intentional_close = false;
            shared.outbound = None;
            shared.generation
        };

        info!(url = %self.config.url, generation, "chat client: connecting");
        tokio::spawn(run_connection(Arc::clone(self), generation));
    }

    fn try_send(&self, text: &str) -> Result<(), ClientError> {
        let shared = self.lock();
        let tx = match (shared.state, &shared.outbound) {
            (ConnectionState::Open, Some(tx)) => tx,
            _ => return Err(ClientError::ChannelClosed),
        };
        let json = envelope::encode_request(&ChatRequest::new(text))?;
        tx.send(Outbound::Text(json)).map_err(|_| ClientError::ChannelClosed)
    }

    fn set_error(&self, message: &str) {
        self.status.send_modify(|s| s.error = Some(message.to_owned()));
    }

    /// Returns `false` if this generation was superseded or torn down.
    fn on_open(&self, generation: u64, tx: mpsc::UnboundedSender<Outbound>) -> bool {
        {
            let mut shared = self.lock();
            if shared.generation != generation || shared.torn_down {
                let _ = tx.send(Outbound::Close);
                return false;
            }
            shared.state = ConnectionState::Open;
            shared.outbound = Some(tx);
        }
        self.status.send_modify(|s| {
            s.connected = true;
            s.error = None;
        });
        info!(url = %self.config.url, generation, "chat client: connected");
        true
    }

    fn on_message(&self, generation: u64, text: &str) {
        let message = match envelope::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "chat client: unparsable message dropped");
                return;
            }
        };
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.live.push(message.clone());
        }
        self.history.push(message.clone());
        let _ = self.incoming.send(message);
    }

    fn on_error(&self, generation: u64, message: &str, detail: &str) {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.state = ConnectionState::Errored;
        }
        warn!(url = %self.config.url, error = detail, "chat client: {message}");
        self.set_error(message);
    }

    fn on_close(self: &Arc<Self>, generation: u64) {
        {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.state = ConnectionState::Closed;
            shared.outbound = None;

            let voluntary = std::mem::take(&mut shared.intentional_close);
            if !voluntary && !shared.torn_down && shared.reconnect.is_none() {
                // Spawned under the lock so the timer cannot clear the slot
                // before the handle is stored.
                let inner = Arc::clone(self);
                let delay = self.config.reconnect_delay;
                shared.reconnect = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.lock().reconnect = None;
                    inner.connect();
                }));
                info!(url = %self.config.url, delay_ms = delay.as_millis(), "chat client: reconnect scheduled");
            }
        }
        self.status.send_modify(|s| s.connected = false);
        info!(url = %self.config.url, generation, "chat client: connection closed");
    }
}

/// Drive one connection attempt from open to close.
async fn run_connection(inner: Arc<Inner>, generation: u64) {
    let mut link = match inner.connector.open(&inner.config.url).await {
        Ok(link) => link,
        Err(e) => {
            inner.on_error(generation, ERR_ESTABLISH, &e.to_string());
            inner.on_close(generation);
            return;
        }
    };

    if !inner.on_open(generation, link.tx) {
        return;
    }

    while let Some(event) = link.rx.recv().await {
        match event {
            TransportEvent::Message(text) => inner.on_message(generation, &text),
            TransportEvent::Error(detail) => inner.on_error(generation, ERR_CONNECTION, &detail),
            TransportEvent::Closed => break,
        }
    }

    inner.on_close(generation);
}

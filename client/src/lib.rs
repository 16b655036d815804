//! Reconnecting chat client.
//!
//! SYSTEM CONTEXT
//! ==============
//! `net` owns the websocket lifecycle (connect, reconnect, send) and the
//! transport seam; `state` holds the session-scoped message history that
//! outlives individual clients. A UI layer only needs [`ChatClient`] and
//! [`ClientSession`].

pub mod config;
pub mod error;
pub mod net;
pub mod state;

pub use config::{ClientConfig, DEFAULT_URL, RECONNECT_DELAY};
pub use error::ClientError;
pub use net::chat_client::{ChatClient, ConnectionState, Mounted, Status};
pub use net::transport::{Connector, Link, Outbound, TransportEvent, WsConnector};
pub use state::history::{ClientSession, HISTORY_CAPACITY, MessageHistory, SharedHistory};

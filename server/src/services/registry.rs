//! Connection registry and broadcast fan-out.
//!
//! DESIGN
//! ======
//! The registry is the authoritative list of open connections. Each entry
//! owns the sending half of its connection's outbound channel; the socket
//! task owns the receiving half and writes whatever arrives to the wire.
//! Entries are kept in connection order, which only matters for listing.
//!
//! CONCURRENCY
//! ===========
//! `register`/`unregister` take the write lock. `broadcast` holds the read
//! lock for the whole iteration, so no entry can be added or removed while a
//! fan-out is in progress. Sends use `try_send` and never await under the lock.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use envelope::ChatMessage;
use rand::Rng;
use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exclusive upper bound of the numeric suffix in generated usernames.
const USERNAME_SUFFIX_RANGE: u32 = 1000;

// =============================================================================
// TYPES
// =============================================================================

/// One open connection and the identity assigned to it.
pub struct ConnectionEntry {
    pub client_id: Uuid,
    pub username: String,
    tx: mpsc::Sender<Utf8Bytes>,
}

impl ConnectionEntry {
    /// Whether the connection's socket task is still draining its channel.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Shared registry handle. Clone is cheap; all clones see the same entries.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<Vec<ConnectionEntry>>>,
}

// =============================================================================
// REGISTRY
// =============================================================================

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under a freshly generated username and return it.
    ///
    /// Usernames are not checked for collisions. Re-registering an existing
    /// `client_id` replaces its entry so a connection never appears twice.
    pub async fn register(&self, client_id: Uuid, tx: mpsc::Sender<Utf8Bytes>) -> String {
        let username = generate_username();
        let mut entries = self.entries.write().await;
        entries.retain(|entry| entry.client_id != client_id);
        entries.push(ConnectionEntry { client_id, username: username.clone(), tx });
        info!(%client_id, %username, connected = entries.len(), "registry: registered");
        username
    }

    /// Remove a connection, returning its username if it was registered.
    ///
    /// Removing an unknown connection is a no-op; both the close and error
    /// paths call this and either may run first.
    pub async fn unregister(&self, client_id: Uuid) -> Option<String> {
        let mut entries = self.entries.write().await;
        let index = entries.iter().position(|entry| entry.client_id == client_id)?;
        let entry = entries.remove(index);
        info!(%client_id, username = %entry.username, connected = entries.len(), "registry: unregistered");
        Some(entry.username)
    }

    /// Deliver `message` to every open connection except `exclude`.
    ///
    /// The message is serialized once. Delivery is best-effort: a closed or
    /// full channel skips that recipient and never affects the others.
    pub async fn broadcast(&self, message: &ChatMessage, exclude: Option<Uuid>) {
        let text = match envelope::encode(message) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                warn!(error = %e, "registry: failed to serialize broadcast");
                return;
            }
        };

        let entries = self.entries.read().await;
        for entry in entries.iter() {
            if exclude == Some(entry.client_id) || !entry.is_open() {
                continue;
            }
            match entry.tx.try_send(text.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %entry.client_id, "registry: outbound queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %entry.client_id, "registry: connection closed mid-broadcast");
                }
            }
        }
    }

    /// Usernames of all registered connections, in connection order.
    pub async fn usernames(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|entry| entry.username.clone())
            .collect()
    }

    pub async fn contains(&self, client_id: Uuid) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .any(|entry| entry.client_id == client_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// `User` followed by a pseudo-random number in `[0, 1000)`.
#[must_use]
pub fn generate_username() -> String {
    let suffix = rand::rng().random_range(0..USERNAME_SUFFIX_RANGE);
    format!("User{suffix}")
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

//! Bounded message history shared across a client session.
//!
//! DESIGN
//! ======
//! `ClientSession` is created once by the host application and handed to
//! every `ChatClient` it builds. All clients from the same session append
//! to one `SharedHistory`, so messages survive a view being torn down and
//! rebuilt. Nothing survives process restart.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use envelope::ChatMessage;

/// Maximum number of messages retained.
pub const HISTORY_CAPACITY: usize = 100;

/// Ordered FIFO buffer that drops the oldest message once full.
#[derive(Clone, Debug)]
pub struct MessageHistory {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl MessageHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { messages: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }
}

/// Cloneable handle to one session's history.
#[derive(Clone, Debug, Default)]
pub struct SharedHistory {
    inner: Arc<Mutex<MessageHistory>>,
}

impl SharedHistory {
    pub fn push(&self, message: ChatMessage) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session scope owning the shared history. Create once per process run.
#[derive(Clone, Debug, Default)]
pub struct ClientSession {
    history: SharedHistory,
}

impl ClientSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }
}

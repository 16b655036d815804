//! Client connection settings.

use std::time::Duration;

/// Server endpoint used when none is configured.
pub const DEFAULT_URL: &str = "ws://localhost:3001";

/// Fixed wait between a close and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { url: DEFAULT_URL.to_owned(), reconnect_delay: RECONNECT_DELAY }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }
}

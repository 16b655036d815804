//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It is created once at startup and dropped when the server stops; the
//! connection registry lives inside it rather than as a global.

use crate::services::registry::Registry;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; the registry is an `Arc` handle.
#[derive(Clone, Default)]
pub struct AppState {
    pub registry: Registry,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self { registry: Registry::new() }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;

//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own connection bookkeeping and fan-out so route handlers
//! can stay focused on protocol translation.

pub mod registry;

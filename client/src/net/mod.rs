//! Networking modules for the websocket chat protocol.
//!
//! SYSTEM CONTEXT
//! ==============
//! `transport` abstracts the socket behind channels, and `chat_client`
//! runs the connect/reconnect state machine on top of it.

pub mod chat_client;
pub mod transport;

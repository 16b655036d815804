//! Shared chat envelope and JSON codec for the realtime WS transport.
//!
//! This crate owns the wire representation used by both `server` and `client`.
//! One text frame carries exactly one envelope.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::warn;

/// Error returned by the encode/decode helpers.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be parsed as (or rendered from) the expected JSON shape.
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Envelope category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// User-authored message relayed by the server.
    Chat,
    /// Server-generated notice (welcome, join, leave).
    System,
}

/// A single message on the chat wire protocol.
///
/// Constructed by the server at broadcast time and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(alias = "type")]
    pub kind: Kind,
    pub data: String,
    /// Author display name. Only present on user-attributed chat messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// ISO-8601 UTC timestamp assigned by the server.
    pub timestamp: String,
}

impl ChatMessage {
    /// Server notice stamped with the current time.
    #[must_use]
    pub fn system(data: impl Into<String>) -> Self {
        Self { kind: Kind::System, data: data.into(), username: None, timestamp: now_iso8601() }
    }

    /// User chat message stamped with the current time.
    #[must_use]
    pub fn chat(username: impl Into<String>, data: impl Into<String>) -> Self {
        Self { kind: Kind::Chat, data: data.into(), username: Some(username.into()), timestamp: now_iso8601() }
    }
}

/// Client-to-server chat request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub kind: Kind,
    pub data: String,
}

/// Inbound request shape. Only `data` is read; `kind`, `username` and
/// `timestamp` are ignored because the server stamps its own.
#[derive(Deserialize)]
struct InboundRequest {
    data: String,
}

impl ChatRequest {
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self { kind: Kind::Chat, data: data.into() }
    }
}

/// Render the current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn now_iso8601() -> String {
    format_iso8601(OffsetDateTime::now_utc())
}

/// Render an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ` in UTC.
#[must_use]
pub fn format_iso8601(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
    let utc = at.to_offset(time::UtcOffset::UTC);
    match utc.format(&format) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "envelope: timestamp formatting failed, using component form");
            format_components(utc)
        }
    }
}

/// Same shape as [`format_iso8601`], assembled from the date parts.
fn format_components(utc: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
        utc.millisecond()
    )
}

/// Encode a message into its JSON wire text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode(message: &ChatMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a JSON wire text into a message.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON or a missing/mistyped field.
pub fn decode(text: &str) -> Result<ChatMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a client request into its JSON wire text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_request(request: &ChatRequest) -> Result<String, CodecError> {
    Ok(serde_json::to_string(request)?)
}

/// Decode a client request. Requires a string `data` field.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for non-JSON input or a missing/non-string `data`.
pub fn decode_request(text: &str) -> Result<ChatRequest, CodecError> {
    let inbound: InboundRequest = serde_json::from_str(text)?;
    Ok(ChatRequest::new(inbound.data))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

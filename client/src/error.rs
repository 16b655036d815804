//! Client error type.
//!
//! None of these escape `ChatClient`'s public operations; they are logged
//! or turned into the reactive `error` text.

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("envelope codec failed: {0}")]
    Codec(#[from] envelope::CodecError),
    #[error("connection channel closed")]
    ChannelClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connect(Box::new(e))
    }
}

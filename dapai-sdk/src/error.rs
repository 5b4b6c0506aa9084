//! Transport error taxonomy.

use std::time::Duration;

/// Errors raised while opening or driving a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server address could not be turned into a transport URL.
    #[error("invalid server address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A connection attempt did not complete within the configured timeout.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The Engine.IO / Socket.IO handshake did not go as expected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server refused the Socket.IO connection (CONNECT_ERROR packet).
    #[error("connection rejected by server: {0}")]
    Rejected(String),

    #[error("websocket error: {0}")]
    Websocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The background long-poll failed.
    #[error("polling request failed: {0}")]
    Poll(String),

    /// A packet could not be decoded.
    #[error("malformed packet: {0}")]
    Packet(String),

    /// The connection task is gone; nothing more can be sent.
    #[error("transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Websocket(Box::new(e))
    }
}

//! Transport Errors

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Unique identifier for one physical socket
///
/// A new ID is assigned every time a socket opens, so log lines from
/// successive reconnects can be told apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new random connection ID
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 8] = rand::thread_rng().gen();
        Self(format!("conn_{}", hex::encode(bytes)))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors returned by direct calls on a streaming connection
///
/// Faults on an established socket are never returned from here; they are
/// converted into `error` / `disconnected` events instead.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The handshake did not complete within the connect timeout
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// No open socket; sends are never queued
    #[error("Not connected")]
    NotConnected,

    /// Lower-level transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The reconnection supervisor hit its attempt ceiling
    #[error("Max reconnection attempts ({attempts}) reached")]
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// An explicit close superseded the connect while it was in flight
    #[error("Connection attempt aborted by close")]
    Aborted,

    /// Outbound payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn_"));
    }

    #[test]
    fn test_stream_error_display() {
        let err = StreamError::ConnectionTimeout(Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"));

        let err = StreamError::ReconnectExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "Max reconnection attempts (5) reached");

        assert_eq!(StreamError::NotConnected.to_string(), "Not connected");
    }
}

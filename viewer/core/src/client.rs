//! Session Streaming Client
//!
//! The public object a consumer holds: an event dispatcher plus one
//! supervised transport connection to a fixed attach URL.
//!
//! # Example
//!
//! ```no_run
//! use viewer_core::{EventKind, SessionStreamClient, StreamEvent, TransportConfig};
//!
//! # async fn run() -> Result<(), viewer_core::StreamError> {
//! let client = SessionStreamClient::new("ws://localhost:8000/ws/view/s1", TransportConfig::default());
//! client.subscribe(EventKind::Analysis, |event| {
//!     if let StreamEvent::Analysis(data) = event {
//!         println!("analysis: {data}");
//!     }
//! });
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::dispatcher::{EventDispatcher, SubscriptionId};
use crate::events::{EventKind, StreamEvent};
use crate::transport::{ConnectionId, StreamError, TransportConfig, TransportConnection};

/// Streaming client for one live session
///
/// Dropping the client performs a deliberate disconnect.
#[derive(Debug)]
pub struct SessionStreamClient {
    connection: Arc<TransportConnection>,
}

impl SessionStreamClient {
    /// Create a client for an attach URL; nothing is opened yet
    pub fn new(url: impl Into<String>, config: TransportConfig) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        Self {
            connection: TransportConnection::new(url, config, dispatcher),
        }
    }

    /// Register a handler for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.connection.dispatcher().subscribe(kind, handler)
    }

    /// Remove a handler; unknown handles are ignored
    pub fn unsubscribe(&self, kind: &EventKind, id: SubscriptionId) -> bool {
        self.connection.dispatcher().unsubscribe(kind, id)
    }

    /// Open the stream
    ///
    /// Concurrent calls coalesce into a single handshake.
    ///
    /// # Errors
    ///
    /// See [`TransportConnection::open`].
    pub async fn connect(&self) -> Result<(), StreamError> {
        self.connection.open().await
    }

    /// Send a JSON payload to the relay
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] when no socket is open.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), StreamError> {
        self.connection.send(payload)
    }

    /// Close deliberately and drop every subscription
    ///
    /// No reconnection follows.
    pub fn disconnect(&self) {
        self.connection.close();
    }

    /// Live socket state
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// The attach URL
    #[must_use]
    pub fn url(&self) -> &str {
        self.connection.url()
    }

    /// Reconnection attempts since the last successful open
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.reconnect_attempts()
    }

    /// ID of the current socket
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.connection_id()
    }
}

impl Drop for SessionStreamClient {
    fn drop(&mut self) {
        self.connection.close();
    }
}

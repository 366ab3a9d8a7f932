//! Stream Event Vocabulary
//!
//! Typed events published by a streaming client to its subscribers.
//!
//! The broadcaster-side relay multiplexes two data streams (video frames and
//! analysis results) plus a handful of control signals over one socket. Each
//! inbound message becomes exactly one [`StreamEvent`]; subscribers register
//! interest by [`EventKind`].
//!
//! Lifecycle events (`Connected`, `Disconnected`) are produced locally by the
//! transport. Everything else originates from the remote envelope.

use std::fmt;

use serde_json::Value;

/// Name of an event a subscriber can register for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Socket opened
    Connected,
    /// Socket closed, locally or remotely (the event does not say which)
    Disconnected,
    /// Encoded video frame
    Frame,
    /// Structured analysis result
    Analysis,
    /// Broadcaster ended the session deliberately
    SessionCompleted,
    /// Error with a human-readable message
    Error,
    /// Envelope type not part of the recognised vocabulary
    Other(String),
}

impl EventKind {
    /// Wire name of this kind (the envelope `type` value)
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Frame => "frame",
            Self::Analysis => "analysis",
            Self::SessionCompleted => "session_completed",
            Self::Error => "error",
            Self::Other(name) => name,
        }
    }

    /// Resolve a wire name to a kind
    ///
    /// Unrecognised names map to [`EventKind::Other`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "frame" => Self::Frame,
            "analysis" => Self::Analysis,
            "session_completed" => Self::SessionCompleted,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event delivered to subscribers
///
/// Payloads are opaque to this crate: frames stay encoded strings and
/// analysis results stay raw JSON. Decoding and validation belong to the
/// consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The socket is open; a fresh logical stream starts here
    Connected,
    /// The socket closed
    Disconnected,
    /// Encoded image payload, passed through verbatim
    Frame(String),
    /// Analysis result, correlated to the latest frame by arrival order
    Analysis(Value),
    /// Broadcaster ended the session; no reconnection follows
    SessionCompleted(Value),
    /// Error report
    Error {
        /// Human-readable description
        message: String,
        /// Where the error came from
        origin: ErrorOrigin,
    },
    /// Envelope with an unrecognised `type`
    Other {
        /// The envelope `type`
        event_type: String,
        /// The envelope payload
        data: Value,
    },
}

/// Source of an [`StreamEvent::Error`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// `error` envelope sent by the relay
    #[default]
    Remote,
    /// Local socket failure; a close and possibly a reconnect follow
    Transport,
    /// Reconnection gave up; nothing else happens automatically
    ReconnectExhausted,
}

impl ErrorOrigin {
    /// Whether the error is informational only
    ///
    /// Transport failures are always followed by `Disconnected`, which is
    /// the lifecycle signal consumers should act on.
    #[must_use]
    pub fn is_advisory(self) -> bool {
        matches!(self, Self::Transport)
    }
}

impl StreamEvent {
    /// Build an error event reported by the relay
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            origin: ErrorOrigin::Remote,
        }
    }

    /// Build an advisory error for a local transport failure
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            origin: ErrorOrigin::Transport,
        }
    }

    /// Build the terminal error published when reconnection gives up
    pub fn reconnect_exhausted(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            origin: ErrorOrigin::ReconnectExhausted,
        }
    }

    /// The kind this event is published under
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::Frame(_) => EventKind::Frame,
            Self::Analysis(_) => EventKind::Analysis,
            Self::SessionCompleted(_) => EventKind::SessionCompleted,
            Self::Error { .. } => EventKind::Error,
            Self::Other { event_type, .. } => EventKind::Other(event_type.clone()),
        }
    }
}

//! Transport Layer for the Session Stream
//!
//! One WebSocket connection per streaming client:
//! - `connection`: socket ownership, envelope decoding, lifecycle events
//! - `reconnect`: linear-backoff retry policy after abnormal closes
//! - `config`: timeouts and retry pacing
//! - `error`: direct-call failures and connection IDs
//!
//! Faults on an established socket never cross the public boundary as
//! errors; they surface as `error` / `disconnected` events. Only `open` and
//! `send` return errors to their caller.

pub mod config;
pub mod connection;
pub mod error;
pub mod reconnect;

// Re-exports for convenience
pub use config::TransportConfig;
pub use connection::{TransportConnection, NORMAL_CLOSURE};
pub use error::{ConnectionId, StreamError};
pub use reconnect::{ReconnectDecision, ReconnectSupervisor};

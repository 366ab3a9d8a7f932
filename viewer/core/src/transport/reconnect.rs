//! Reconnection Supervisor
//!
//! Decides whether, and after how long, to retry after an abnormal close.
//! It does not own the socket and knows nothing about message semantics.
//!
//! # Policy
//!
//! Linear backoff: attempt `n` waits `n * base_delay`. After
//! `max_attempts` consecutive failures the supervisor gives up and the
//! caller must reconnect explicitly.
//!
//! # Staleness
//!
//! A scheduled retry carries the connection generation it was scheduled
//! for. When the timer fires, the connection rejects the retry unless that
//! generation is still current and no socket is open, so a retry never
//! fires after an explicit disconnect or a manual reconnect.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::config::TransportConfig;
use super::connection::TransportConnection;

/// What the supervisor wants to do after an abnormal close
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule another attempt
    Retry {
        /// 1-based attempt number
        attempt: u32,
        /// How long to wait before the attempt
        delay: Duration,
    },
    /// Attempt ceiling reached; stop retrying
    Exhausted {
        /// Attempts made
        attempts: u32,
    },
}

/// Retry policy for one connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectSupervisor {
    base_delay: Duration,
    max_attempts: u32,
}

impl ReconnectSupervisor {
    /// Create a supervisor
    #[must_use]
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Create from transport configuration
    #[must_use]
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.reconnect_delay(), config.reconnect_attempts)
    }

    /// Maximum number of attempts
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given 1-based attempt
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Decide the next step given how many attempts have already been made
    #[must_use]
    pub fn next(&self, attempts_made: u32) -> ReconnectDecision {
        if attempts_made >= self.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: attempts_made,
            };
        }
        let attempt = attempts_made + 1;
        ReconnectDecision::Retry {
            attempt,
            delay: self.delay_for(attempt),
        }
    }

    /// Spawn the timer for one retry
    ///
    /// The task holds only a weak reference, so dropping the connection
    /// turns the timer into a no-op.
    pub(crate) fn schedule(
        &self,
        connection: Weak<TransportConnection>,
        generation: u64,
        attempt: u32,
        delay: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Linear backoff before the reconnect attempt
            tokio::time::sleep(delay).await;
            if let Some(connection) = connection.upgrade() {
                connection.retry(generation, attempt).await;
            }
        })
    }
}

impl Default for ReconnectSupervisor {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

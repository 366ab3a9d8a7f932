//! Transport Configuration
//!
//! Timing parameters for one streaming connection: how long to wait for the
//! handshake and how the reconnection supervisor paces its retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connection timeout in milliseconds
    ///
    /// How long to wait for the WebSocket handshake before aborting.
    pub connect_timeout_ms: u64,

    /// Reconnection attempts (0 = no reconnection)
    ///
    /// How many times to retry after an abnormal close before giving up.
    pub reconnect_attempts: u32,

    /// Base delay between reconnection attempts in milliseconds
    ///
    /// Attempt `n` waits `n * reconnect_delay_ms`.
    pub reconnect_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl TransportConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration suitable for testing (short timings)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            connect_timeout_ms: 500,
            reconnect_attempts: 3,
            reconnect_delay_ms: 20,
        }
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the reconnection ceiling
    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Set the base reconnection delay
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = duration_ms(delay);
        self
    }

    /// Connect timeout as a [`Duration`]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Base reconnection delay as a [`Duration`]
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder_methods() {
        let config = TransportConfig::new()
            .with_connect_timeout(Duration::from_millis(250))
            .with_reconnect_attempts(2)
            .with_reconnect_delay(Duration::from_millis(40));

        assert_eq!(config.connect_timeout_ms, 250);
        assert_eq!(config.reconnect_attempts, 2);
        assert_eq!(config.reconnect_delay_ms, 40);
    }

    #[test]
    fn test_config_serialization() {
        let config = TransportConfig::for_testing();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: TransportConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}

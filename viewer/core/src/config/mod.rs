//! TOML Configuration File Support
//!
//! Configuration for the viewer, from a TOML file at
//! `~/.config/session-viewer/viewer.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [transport]
//! connect_timeout_ms = 10000
//! reconnect_attempts = 5
//! reconnect_delay_ms = 1000
//!
//! [discovery]
//! api_base_url = "http://localhost:8000"
//! status_path = "/api/stream/status"
//! ws_base_url = "ws://localhost:8000"
//! request_timeout_ms = 5000
//! poll_interval_ms = 3000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::config::TransportConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Discovery Configuration
// =============================================================================

/// Where and how often to look up the active session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Base address of the HTTP API
    pub api_base_url: String,

    /// Path of the session status endpoint
    pub status_path: String,

    /// Base address for attach URLs
    ///
    /// Derived from `api_base_url` when unset.
    pub ws_base_url: Option<String>,

    /// Timeout for one lookup in milliseconds
    pub request_timeout_ms: u64,

    /// Interval between lookups while waiting for a session
    pub poll_interval_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            status_path: "/api/stream/status".to_string(),
            ws_base_url: None,
            request_timeout_ms: 5000,
            poll_interval_ms: 3000,
        }
    }
}

impl DiscoveryConfig {
    /// Full URL of the status endpoint
    #[must_use]
    pub fn status_url(&self) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        if self.status_path.starts_with('/') {
            format!("{base}{}", self.status_path)
        } else {
            format!("{base}/{}", self.status_path)
        }
    }

    /// Base address for attach URLs
    ///
    /// `http` becomes `ws` and `https` becomes `wss` when no explicit
    /// address is configured.
    #[must_use]
    pub fn ws_base_url(&self) -> String {
        if let Some(ref explicit) = self.ws_base_url {
            return explicit.trim_end_matches('/').to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }

    /// Lookup timeout as a [`Duration`]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Poll interval as a [`Duration`]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Number of reconnection attempts
    pub reconnect_attempts: Option<u32>,

    /// Base reconnection delay in milliseconds
    pub reconnect_delay_ms: Option<u64>,
}

/// Discovery section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryToml {
    /// Base address of the HTTP API
    pub api_base_url: Option<String>,

    /// Path of the status endpoint
    pub status_path: Option<String>,

    /// Base address for attach URLs
    pub ws_base_url: Option<String>,

    /// Lookup timeout in milliseconds
    pub request_timeout_ms: Option<u64>,

    /// Poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerToml {
    /// Transport configuration section
    pub transport: TransportToml,

    /// Discovery configuration section
    pub discovery: DiscoveryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the viewer
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    /// Transport configuration
    pub transport: TransportConfig,

    /// Discovery configuration
    pub discovery: DiscoveryConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            discovery: DiscoveryConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ViewerConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would make the viewer unusable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero connect timeout
    /// or a base address with the wrong scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let api = &self.discovery.api_base_url;
        if !(api.starts_with("http://") || api.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api_base_url must be an http(s) address, got {api}"
            )));
        }

        let ws = self.discovery.ws_base_url();
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "ws_base_url must be a ws(s) address, got {ws}"
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/session-viewer/viewer.toml` or
/// `~/.config/session-viewer/viewer.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("session-viewer").join("viewer.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ViewerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// With `None`, only defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ViewerConfig, ConfigError> {
    let mut config = ViewerConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ViewerToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ViewerConfig, toml: &ViewerToml) {
    if let Some(timeout) = toml.transport.connect_timeout_ms {
        config.transport.connect_timeout_ms = timeout;
    }
    if let Some(attempts) = toml.transport.reconnect_attempts {
        config.transport.reconnect_attempts = attempts;
    }
    if let Some(delay) = toml.transport.reconnect_delay_ms {
        config.transport.reconnect_delay_ms = delay;
    }

    if let Some(ref url) = toml.discovery.api_base_url {
        config.discovery.api_base_url = url.clone();
    }
    if let Some(ref path) = toml.discovery.status_path {
        config.discovery.status_path = path.clone();
    }
    if toml.discovery.ws_base_url.is_some() {
        config.discovery.ws_base_url = toml.discovery.ws_base_url.clone();
    }
    if let Some(timeout) = toml.discovery.request_timeout_ms {
        config.discovery.request_timeout_ms = timeout;
    }
    if let Some(interval) = toml.discovery.poll_interval_ms {
        config.discovery.poll_interval_ms = interval;
    }
}

/// Apply environment variable overrides to the config
///
/// Unparseable numbers are ignored.
fn apply_env_config<F>(config: &mut ViewerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(ms) = number("VIEWER_CONNECT_TIMEOUT") {
        config.transport.connect_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(attempts) = number("VIEWER_RECONNECT_ATTEMPTS").and_then(|n| u32::try_from(n).ok())
    {
        config.transport.reconnect_attempts = attempts;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = number("VIEWER_RECONNECT_DELAY") {
        config.transport.reconnect_delay_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = lookup("VIEWER_API_URL") {
        config.discovery.api_base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(path) = lookup("VIEWER_STATUS_PATH") {
        config.discovery.status_path = path;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = lookup("VIEWER_WS_URL") {
        config.discovery.ws_base_url = Some(url);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = number("VIEWER_REQUEST_TIMEOUT") {
        config.discovery.request_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = number("VIEWER_POLL_INTERVAL") {
        config.discovery.poll_interval_ms = ms;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API base address override
    pub api_base_url: Option<String>,

    /// Attach base address override
    pub ws_base_url: Option<String>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,

    /// Reconnect attempts override
    pub reconnect_attempts: Option<u32>,

    /// Poll interval override (milliseconds)
    pub poll_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API base address override
    #[must_use]
    pub fn with_api_base_url(mut self, url: String) -> Self {
        self.api_base_url = Some(url);
        self
    }

    /// Set attach base address override
    #[must_use]
    pub fn with_ws_base_url(mut self, url: String) -> Self {
        self.ws_base_url = Some(url);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Set reconnect attempts override
    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = Some(attempts);
        self
    }

    /// Set poll interval override
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    fn is_empty(&self) -> bool {
        self.api_base_url.is_none()
            && self.ws_base_url.is_none()
            && self.connect_timeout_ms.is_none()
            && self.reconnect_attempts.is_none()
            && self.poll_interval_ms.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ViewerConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.api_base_url {
            config.discovery.api_base_url = url.clone();
        }
        if let Some(ref url) = self.ws_base_url {
            config.discovery.ws_base_url = Some(url.clone());
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.transport.connect_timeout_ms = timeout;
        }
        if let Some(attempts) = self.reconnect_attempts {
            config.transport.reconnect_attempts = attempts;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.discovery.poll_interval_ms = interval;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Session Discovery
//!
//! A request/response lookup, outside the persistent connection, answering
//! "is a session active, and where do I attach?".
//!
//! The status endpoint replies with:
//!
//! ```json
//! { "active": true, "session_id": "s1", "viewer_ws_path": "/ws/view/s1", "started_at": "2024-05-01T12:00:00Z" }
//! ```
//!
//! When `active` is false the other fields are absent and no attach is
//! attempted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DiscoveryConfig;

/// Discovery lookup errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Request could not be sent or the response not read
    #[error("Discovery request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Discovery endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Response body was not a session status
    #[error("Invalid discovery response: {0}")]
    Decode(String),
}

/// Response of the status endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Whether a broadcaster is live
    #[serde(default)]
    pub active: bool,
    /// Server-assigned session identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Relative attach path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_ws_path: Option<String>,
    /// ISO-8601 start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl SessionStatus {
    /// An inactive status
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// The session to attach to, if any
    ///
    /// `None` when inactive or when the identity or attach path is missing.
    #[must_use]
    pub fn attach_target(&self) -> Option<ActiveSession> {
        if !self.active {
            return None;
        }
        let session_id = self.session_id.clone()?;
        let attach_path = self.viewer_ws_path.clone()?;
        Some(ActiveSession {
            session_id,
            attach_path,
            started_at: self.started_at.clone(),
        })
    }
}

/// An attachable session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveSession {
    /// Session identity
    pub session_id: String,
    /// Relative attach path
    pub attach_path: String,
    /// Raw start timestamp as reported
    pub started_at: Option<String>,
}

impl ActiveSession {
    /// Attach URL: transport base address followed by the attach path
    #[must_use]
    pub fn attach_url(&self, ws_base_url: &str) -> String {
        let base = ws_base_url.trim_end_matches('/');
        if self.attach_path.starts_with('/') {
            format!("{base}{}", self.attach_path)
        } else {
            format!("{base}/{}", self.attach_path)
        }
    }

    /// Start time, if present and parseable
    ///
    /// Accepts RFC 3339 and offset-less ISO timestamps (read as UTC).
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.started_at.as_deref()?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Source of session status
#[async_trait]
pub trait SessionDiscovery: Send + Sync {
    /// Look up the current session
    async fn lookup(&self) -> Result<SessionStatus, DiscoveryError>;
}

/// Discovery over HTTP
#[derive(Clone, Debug)]
pub struct HttpSessionDiscovery {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpSessionDiscovery {
    /// Create a discovery client for a full status URL
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DiscoveryError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    /// Create from discovery configuration
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        Self::new(config.status_url(), config.request_timeout())
    }

    /// The status URL queried
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SessionDiscovery for HttpSessionDiscovery {
    async fn lookup(&self) -> Result<SessionStatus, DiscoveryError> {
        let response = self.http_client.get(&self.endpoint).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Status { status, body });
        }

        let body = response.text().await?;
        let status: SessionStatus =
            serde_json::from_str(&body).map_err(|e| DiscoveryError::Decode(e.to_string()))?;
        tracing::debug!(
            endpoint = %self.endpoint,
            active = status.active,
            session_id = ?status.session_id,
            "Session status"
        );
        Ok(status)
    }
}

//! Viewer Session Controller
//!
//! Consumer-facing orchestration: discover the active session, attach a
//! streaming client to it and fold its events into an observable
//! [`ViewerState`].
//!
//! # State machine
//!
//! ```text
//!            connect / auto_attach
//!   Idle ───────────────────────────▶ Connecting
//!    ▲  ◀── no active session ───────────┘ │
//!    │                                     │ connected
//!    │  session_completed / disconnect     ▼
//!    └────────────────────────────────  Attached ──── error ───▶ Errored
//! ```
//!
//! Every attach first tears down the previous client, so at most one
//! streaming client exists per controller. Attaching takes `&mut self`,
//! which rules out overlapping attach calls on one controller.
//!
//! A silent attach (startup) never records a user-visible error; an
//! explicit one always reports its outcome.
//!
//! Losing the link while attached only drops `link_up`; the transport
//! reconnects in the background. The phase moves to `Errored` for relay
//! `error` messages and once reconnection gives up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::SessionStreamClient;
use crate::config::ViewerConfig;
use crate::discovery::{
    ActiveSession, DiscoveryError, HttpSessionDiscovery, SessionDiscovery, SessionStatus,
};
use crate::events::{EventKind, StreamEvent};
use crate::transport::{StreamError, TransportConfig};

/// Message recorded when an explicit connect finds nothing to attach to
pub const NO_ACTIVE_SESSION: &str = "No active session";

/// Controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Discovery reported no attachable session
    #[error("No active session")]
    NoActiveSession,

    /// Discovery lookup failed
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Streaming client failed
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Phase of the viewer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewerPhase {
    /// Not attached
    #[default]
    Idle,
    /// Discovery or handshake in progress
    Connecting,
    /// Receiving the session
    Attached,
    /// An error occurred while attached
    Errored,
}

impl std::fmt::Display for ViewerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Attached => write!(f, "attached"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Snapshot of what the viewer currently shows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewerState {
    /// Current phase
    pub phase: ViewerPhase,
    /// Attached session
    pub session_id: Option<String>,
    /// When the attached session started
    pub started_at: Option<DateTime<Utc>>,
    /// Last error, kept for display after the session is cleared
    pub last_error: Option<String>,
    /// Most recent encoded frame
    pub latest_frame: Option<String>,
    /// Most recent analysis result
    pub latest_analysis: Option<Value>,
    /// Frames received since the last attach
    pub frames_received: u64,
    /// Whether the socket is currently up
    pub link_up: bool,
    /// The broadcaster ended the last session (as opposed to a local disconnect)
    pub ended_by_broadcaster: bool,
}

impl ViewerState {
    fn clear_session(&mut self) {
        self.session_id = None;
        self.started_at = None;
        self.latest_frame = None;
        self.latest_analysis = None;
        self.link_up = false;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttachMode {
    Silent,
    Explicit,
}

/// Discovers, attaches to and tracks one live session
pub struct ViewerSessionController<D: SessionDiscovery> {
    discovery: D,
    ws_base_url: String,
    transport: TransportConfig,
    client: Option<SessionStreamClient>,
    state: Arc<watch::Sender<ViewerState>>,
}

impl ViewerSessionController<HttpSessionDiscovery> {
    /// Create a controller using HTTP discovery
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &ViewerConfig) -> Result<Self, ControllerError> {
        let discovery = HttpSessionDiscovery::from_config(&config.discovery)?;
        Ok(Self::new(
            discovery,
            config.discovery.ws_base_url(),
            config.transport.clone(),
        ))
    }
}

impl<D: SessionDiscovery> ViewerSessionController<D> {
    /// Create a controller
    ///
    /// `ws_base_url` is prefixed to the attach path reported by discovery.
    pub fn new(discovery: D, ws_base_url: impl Into<String>, transport: TransportConfig) -> Self {
        let (state, _) = watch::channel(ViewerState::default());
        Self {
            discovery,
            ws_base_url: ws_base_url.into(),
            transport,
            client: None,
            state: Arc::new(state),
        }
    }

    /// Current state snapshot
    #[must_use]
    pub fn state(&self) -> ViewerState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ViewerState> {
        self.state.subscribe()
    }

    /// Whether the attached client has a live socket
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(SessionStreamClient::is_connected)
    }

    /// The attached client, if any
    #[must_use]
    pub fn client(&self) -> Option<&SessionStreamClient> {
        self.client.as_ref()
    }

    /// Look up the session without attaching
    ///
    /// # Errors
    ///
    /// Returns the discovery failure.
    pub async fn check_session(&self) -> Result<SessionStatus, ControllerError> {
        Ok(self.discovery.lookup().await?)
    }

    /// Best-effort attach on startup
    ///
    /// Never records an error; returns whether a session was attached.
    pub async fn auto_attach(&mut self) -> bool {
        match self.attach(AttachMode::Silent).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Auto-attach skipped");
                false
            }
        }
    }

    /// User-initiated attach
    ///
    /// # Errors
    ///
    /// - [`ControllerError::NoActiveSession`] when nothing is live
    /// - [`ControllerError::Discovery`] / [`ControllerError::Stream`] on
    ///   lookup or handshake failure
    ///
    /// The failure is also recorded in [`ViewerState::last_error`].
    pub async fn connect(&mut self) -> Result<(), ControllerError> {
        self.attach(AttachMode::Explicit).await
    }

    /// Deliberate local disconnect
    pub fn disconnect(&mut self) {
        self.teardown();
        self.state.send_modify(|s| {
            s.phase = ViewerPhase::Idle;
            s.clear_session();
            s.ended_by_broadcaster = false;
        });
        info!("Viewer disconnected");
    }

    /// Send a JSON payload over the attached stream
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] when nothing is attached.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), ControllerError> {
        let client = self.client.as_ref().ok_or(StreamError::NotConnected)?;
        Ok(client.send(payload)?)
    }

    async fn attach(&mut self, mode: AttachMode) -> Result<(), ControllerError> {
        self.teardown();
        self.state.send_modify(|s| {
            s.phase = ViewerPhase::Connecting;
            s.clear_session();
            s.ended_by_broadcaster = false;
            s.frames_received = 0;
            if mode == AttachMode::Explicit {
                s.last_error = None;
            }
        });

        let status = match self.discovery.lookup().await {
            Ok(status) => status,
            Err(e) => return Err(self.fail(mode, e.into())),
        };

        let Some(session) = status.attach_target() else {
            info!("No active session to attach to");
            self.state.send_modify(|s| {
                s.phase = ViewerPhase::Idle;
                if mode == AttachMode::Explicit {
                    s.last_error = Some(NO_ACTIVE_SESSION.to_string());
                }
            });
            return Err(ControllerError::NoActiveSession);
        };

        let url = session.attach_url(&self.ws_base_url);
        info!(session_id = %session.session_id, url = %url, "Attaching to session");

        let client = SessionStreamClient::new(url, self.transport.clone());
        install_handlers(&client, &session, &self.state);
        let result = self.client.insert(client).connect().await;

        if let Err(e) = result {
            self.teardown();
            return Err(self.fail(mode, e.into()));
        }
        Ok(())
    }

    fn fail(&self, mode: AttachMode, err: ControllerError) -> ControllerError {
        match mode {
            AttachMode::Explicit => {
                warn!(error = %err, "Connect failed");
                let message = err.to_string();
                self.state.send_modify(|s| {
                    s.phase = ViewerPhase::Errored;
                    s.last_error = Some(message);
                });
            }
            AttachMode::Silent => {
                self.state.send_modify(|s| s.phase = ViewerPhase::Idle);
            }
        }
        err
    }

    fn teardown(&mut self) {
        if let Some(client) = self.client.take() {
            debug!(url = %client.url(), "Tearing down streaming client");
            client.disconnect();
        }
    }
}

impl<D: SessionDiscovery> std::fmt::Debug for ViewerSessionController<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSessionController")
            .field("ws_base_url", &self.ws_base_url)
            .field("client", &self.client)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Fold client events into the shared viewer state
fn install_handlers(
    client: &SessionStreamClient,
    session: &ActiveSession,
    state: &Arc<watch::Sender<ViewerState>>,
) {
    let tx = Arc::clone(state);
    let session_id = session.session_id.clone();
    let started_at = session.started_at();
    client.subscribe(EventKind::Connected, move |_| {
        tx.send_modify(|s| {
            s.phase = ViewerPhase::Attached;
            s.session_id = Some(session_id.clone());
            s.started_at = started_at;
            s.last_error = None;
            s.link_up = true;
        });
    });

    let tx = Arc::clone(state);
    client.subscribe(EventKind::Disconnected, move |_| {
        tx.send_modify(|s| s.link_up = false);
    });

    let tx = Arc::clone(state);
    client.subscribe(EventKind::Frame, move |event| {
        if let StreamEvent::Frame(frame) = event {
            tx.send_modify(|s| {
                s.latest_frame = Some(frame.clone());
                s.frames_received += 1;
            });
        }
    });

    let tx = Arc::clone(state);
    client.subscribe(EventKind::Analysis, move |event| {
        if let StreamEvent::Analysis(data) = event {
            tx.send_modify(|s| s.latest_analysis = Some(data.clone()));
        }
    });

    let tx = Arc::clone(state);
    client.subscribe(EventKind::SessionCompleted, move |_| {
        info!("Broadcaster ended the session");
        tx.send_modify(|s| {
            s.phase = ViewerPhase::Idle;
            s.clear_session();
            s.ended_by_broadcaster = true;
        });
    });

    let tx = Arc::clone(state);
    client.subscribe(EventKind::Error, move |event| {
        let StreamEvent::Error { message, origin } = event else {
            return;
        };
        if origin.is_advisory() {
            // Supervised reconnect stays silent until it gives up.
            debug!(error = %message, "Transport error, link down");
            tx.send_if_modified(|s| std::mem::replace(&mut s.link_up, false));
            return;
        }
        tx.send_if_modified(|s| match s.phase {
            ViewerPhase::Attached | ViewerPhase::Errored => {
                warn!(error = %message, "Stream error");
                s.phase = ViewerPhase::Errored;
                s.session_id = None;
                s.last_error = Some(message.clone());
                true
            }
            ViewerPhase::Idle | ViewerPhase::Connecting => {
                debug!(error = %message, "Ignoring stream error while not attached");
                false
            }
        });
    });
}

//! Viewer Core - Headless Live Session Streaming for Viewers
//!
//! This crate lets a viewer find a live broadcast session, attach to it over
//! a single WebSocket, and receive its video frames and analysis results as
//! typed events. It has no UI dependencies: a dashboard, a CLI or a test
//! harness drives it the same way.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 ViewerSessionController                      │
//! │   discovery ──▶ attach URL ──▶ SessionStreamClient           │
//! │                                 │                            │
//! │            ┌────────────────────┼───────────────────┐        │
//! │            │  EventDispatcher   │ TransportConnection│        │
//! │            │  (subscribe/       │  + ReconnectSuper- │        │
//! │            │   publish)         │    visor           │        │
//! │            └────────────────────┴─────────┬─────────┘        │
//! └───────────────────────────────────────────┼──────────────────┘
//!                                             │ WebSocket
//!                                   broadcaster-side relay
//! ```
//!
//! # Key Types
//!
//! - [`SessionStreamClient`]: subscribe, connect, send, disconnect
//! - [`StreamEvent`] / [`EventKind`]: the message vocabulary
//! - [`ViewerSessionController`]: discovery-then-attach with observable state
//! - [`SessionDiscovery`]: the status lookup seam ([`HttpSessionDiscovery`])
//! - [`ViewerConfig`]: layered TOML / environment / CLI configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use viewer_core::{load_config, ViewerSessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let mut controller = ViewerSessionController::from_config(&config)?;
//!     let mut state = controller.watch();
//!
//!     controller.connect().await?;
//!     while state.changed().await.is_ok() {
//!         println!("{:?}", state.borrow().phase);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`events`]: event kinds and payloads
//! - [`messages`]: inbound envelope decoding
//! - [`dispatcher`]: multi-subscriber publish/subscribe
//! - [`transport`]: socket ownership, reconnection, timeouts
//! - [`client`]: the public streaming client
//! - [`discovery`]: session status lookup
//! - [`controller`]: viewer state machine
//! - [`config`]: configuration loading

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod dispatcher;
pub mod events;
pub mod messages;
pub mod transport;

// Re-exports for convenience
pub use client::SessionStreamClient;
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, DiscoveryConfig, ViewerConfig,
};
pub use controller::{ControllerError, ViewerPhase, ViewerSessionController, ViewerState};
pub use discovery::{
    ActiveSession, DiscoveryError, HttpSessionDiscovery, SessionDiscovery, SessionStatus,
};
pub use dispatcher::{EventDispatcher, EventHandler, SubscriptionId};
pub use events::{ErrorOrigin, EventKind, StreamEvent};
pub use messages::Envelope;
pub use transport::{ConnectionId, StreamError, TransportConfig};

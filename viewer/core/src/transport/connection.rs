//! WebSocket Transport Connection
//!
//! Owns at most one physical socket to a fixed URL and turns it into
//! dispatcher events.
//!
//! # Lifecycle
//!
//! - `open()` is idempotent: it resolves immediately when a socket is open
//!   or a handshake is already in flight.
//! - The handshake is bounded by the connect timeout.
//! - On open: retry counter reset, `connected` published.
//! - Inbound text is decoded into exactly one event (see [`crate::messages`]).
//! - A close frame from the peer is echoed back before teardown.
//! - On close: `disconnected` published. Close code 1000 means the session
//!   was ended on purpose; anything else hands over to the
//!   [`ReconnectSupervisor`].
//! - An inbound `session_completed` is treated as a normal close.
//! - `close()` sends a normal close frame, releases the socket, cancels any
//!   pending retry and clears the subscription table.
//!
//! # Generations
//!
//! Every socket and every explicit close bumps a generation counter. Reader
//! tasks, handshakes and retry timers remember the generation they belong to
//! and become no-ops once it is no longer current.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::config::TransportConfig;
use super::error::{ConnectionId, StreamError};
use super::reconnect::{ReconnectDecision, ReconnectSupervisor};
use crate::dispatcher::EventDispatcher;
use crate::events::StreamEvent;
use crate::messages::{decode_binary, decode_text};

/// WebSocket close code for a deliberate, normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The live socket owned by a connection
struct SocketHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SocketHandle {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Request a normal closure; optionally stop the reader task
    fn shutdown(self, reason: &'static str, abort_reader: bool) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.into(),
        })));
        if abort_reader {
            if let Some(reader) = self.reader {
                reader.abort();
            }
        }
    }
}

/// Mutable connection state, owned exclusively by one connection
#[derive(Default)]
struct ConnectionState {
    socket: Option<SocketHandle>,
    /// True only between starting a handshake and its success or failure
    is_connecting: bool,
    reconnect_attempts: u32,
    generation: u64,
    retry_task: Option<JoinHandle<()>>,
}

/// One physical connection to a fixed URL, with supervised reconnection
pub struct TransportConnection {
    url: String,
    config: TransportConfig,
    supervisor: ReconnectSupervisor,
    dispatcher: Arc<EventDispatcher>,
    state: Mutex<ConnectionState>,
}

impl TransportConnection {
    /// Create a connection; nothing is opened until [`open`](Self::open)
    pub fn new(
        url: impl Into<String>,
        config: TransportConfig,
        dispatcher: Arc<EventDispatcher>,
    ) -> Arc<Self> {
        let supervisor = ReconnectSupervisor::from_config(&config);
        Arc::new(Self {
            url: url.into(),
            config,
            supervisor,
            dispatcher,
            state: Mutex::new(ConnectionState::default()),
        })
    }

    /// The attach URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The dispatcher events are published to
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Whether a socket is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .socket
            .as_ref()
            .is_some_and(SocketHandle::is_open)
    }

    /// Whether a handshake is in flight
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state.lock().is_connecting
    }

    /// Reconnection attempts made since the last successful open
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.lock().reconnect_attempts
    }

    /// ID of the open socket, if any
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state.lock().socket.as_ref().map(|s| s.id.clone())
    }

    /// Open the connection
    ///
    /// Resolves immediately if already open or if another open is in
    /// flight; only one handshake runs at a time.
    ///
    /// # Errors
    ///
    /// - [`StreamError::ConnectionTimeout`] if the handshake outlives the
    ///   connect timeout
    /// - [`StreamError::Transport`] if the handshake fails
    /// - [`StreamError::Aborted`] if [`close`](Self::close) ran meanwhile
    pub async fn open(self: &Arc<Self>) -> Result<(), StreamError> {
        let (generation, stale) = {
            let mut state = self.state.lock();
            if state.socket.as_ref().is_some_and(SocketHandle::is_open) {
                return Ok(());
            }
            if state.is_connecting {
                debug!(url = %self.url, "Open already in flight");
                return Ok(());
            }
            let stale = state.socket.take();
            if stale.is_some() {
                state.generation += 1;
            }
            state.is_connecting = true;
            (state.generation, stale)
        };

        if let Some(stale) = stale {
            debug!(connection = %stale.id, "Replacing dead socket");
            stale.shutdown("replaced", true);
            self.dispatcher.publish(&StreamEvent::Disconnected);
        }

        self.establish(generation).await
    }

    /// Send a JSON payload
    ///
    /// Never queued: fails immediately when no socket is open.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotConnected`] without an open socket,
    /// [`StreamError::Serialization`] if the payload cannot be encoded.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), StreamError> {
        let state = self.state.lock();
        let socket = state
            .socket
            .as_ref()
            .filter(|s| s.is_open())
            .ok_or(StreamError::NotConnected)?;
        let text = serde_json::to_string(payload)?;
        socket
            .outbound
            .send(Message::Text(text))
            .map_err(|_| StreamError::NotConnected)
    }

    /// Close deliberately
    ///
    /// Sends a normal close frame, releases the socket, cancels pending
    /// retries, resets the retry counter and clears all subscriptions.
    /// Safe to call when already closed.
    pub fn close(&self) {
        let (socket, retry) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.is_connecting = false;
            state.reconnect_attempts = 0;
            (state.socket.take(), state.retry_task.take())
        };

        if let Some(retry) = retry {
            retry.abort();
        }
        if let Some(socket) = socket {
            info!(connection = %socket.id, url = %self.url, "Closing stream connection");
            socket.shutdown("client disconnect", true);
        }
        self.dispatcher.clear();
    }

    /// Run one handshake and install the socket
    async fn establish(self: &Arc<Self>, generation: u64) -> Result<(), StreamError> {
        let timeout = self.config.connect_timeout();
        debug!(url = %self.url, timeout_ms = self.config.connect_timeout_ms, "Opening stream connection");

        let ws = match tokio::time::timeout(timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                self.abandon_attempt(generation);
                return Err(e.into());
            }
            Err(_) => {
                self.abandon_attempt(generation);
                warn!(url = %self.url, timeout_ms = self.config.connect_timeout_ms, "Connect timed out");
                return Err(StreamError::ConnectionTimeout(timeout));
            }
        };

        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let id = ConnectionId::new();

        let installed = {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.generation += 1;
                state.is_connecting = false;
                state.reconnect_attempts = 0;
                state.socket = Some(SocketHandle {
                    id: id.clone(),
                    outbound,
                    open: Arc::clone(&open),
                    reader: None,
                });
                Some(state.generation)
            } else {
                None
            }
        };

        let Some(socket_generation) = installed else {
            debug!(url = %self.url, "Closed during handshake; discarding socket");
            tokio::spawn(async move {
                let mut sink = sink;
                let _ = sink.close().await;
            });
            return Err(StreamError::Aborted);
        };

        tokio::spawn(write_loop(sink, outbound_rx, open, id.clone()));
        info!(connection = %id, url = %self.url, "Stream connected");
        self.dispatcher.publish(&StreamEvent::Connected);

        // Inbound messages only start flowing after `connected` was delivered.
        let mut state = self.state.lock();
        if state.generation == socket_generation {
            if let Some(socket) = state.socket.as_mut() {
                socket.reader = Some(tokio::spawn(Arc::clone(self).read_loop(
                    stream,
                    socket_generation,
                    id,
                )));
            }
        }
        Ok(())
    }

    /// Clear the in-flight flag after a failed handshake
    fn abandon_attempt(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.is_connecting = false;
        }
    }

    /// Echo a peer's close frame through the writer task
    ///
    /// The reader stops polling after a close, so the reply has to be
    /// flushed from the sink side.
    fn acknowledge_close(&self, generation: u64, code: Option<CloseCode>) {
        let state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if let Some(socket) = state.socket.as_ref() {
            socket.open.store(false, Ordering::SeqCst);
            let _ = socket.outbound.send(Message::Close(Some(CloseFrame {
                code: code.unwrap_or(CloseCode::Normal),
                reason: "".into(),
            })));
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    async fn read_loop(
        self: Arc<Self>,
        mut stream: SplitStream<WsStream>,
        generation: u64,
        id: ConnectionId,
    ) {
        let close_code = loop {
            let Some(next) = stream.next().await else {
                break None;
            };
            if !self.is_current(generation) {
                return;
            }

            let event = match next {
                Ok(Message::Text(text)) => decode_text(&text),
                Ok(Message::Binary(bytes)) => {
                    if let Some(event) = decode_binary(&bytes) {
                        event
                    } else {
                        debug!(connection = %id, len = bytes.len(), "Dropping undecodable binary payload");
                        continue;
                    }
                }
                Ok(Message::Close(frame)) => {
                    let code = frame.as_ref().map(|f| f.code);
                    self.acknowledge_close(generation, code);
                    break code.map(u16::from);
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(connection = %id, error = %e, "Stream transport error");
                    let message = format!("Transport error: {e}");
                    self.dispatcher
                        .publish(&StreamEvent::transport_error(message));
                    break None;
                }
            };

            debug!(connection = %id, event = %event.kind(), "Dispatching");
            let completed = matches!(event, StreamEvent::SessionCompleted(_));
            self.dispatcher.publish(&event);
            if completed {
                self.end_session(generation, &id);
                return;
            }
        };

        self.handle_close(generation, close_code, &id);
    }

    /// Broadcaster ended the session: close normally, never reconnect
    fn end_session(&self, generation: u64, id: &ConnectionId) {
        let (socket, retry) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            state.is_connecting = false;
            (state.socket.take(), state.retry_task.take())
        };

        if let Some(retry) = retry {
            retry.abort();
        }
        if let Some(socket) = socket {
            // Runs on the reader task itself, which exits on its own.
            socket.shutdown("session completed", false);
        }
        info!(connection = %id, url = %self.url, "Session completed by broadcaster");
        self.dispatcher.publish(&StreamEvent::Disconnected);
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: Option<u16>, id: &ConnectionId) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!(connection = %id, "Ignoring close of superseded socket");
                return;
            }
            state.is_connecting = false;
            state.socket = None;
        }

        let normal = code == Some(NORMAL_CLOSURE);
        if normal {
            info!(connection = %id, "Stream closed normally");
        } else {
            warn!(connection = %id, code = ?code, "Stream closed abnormally");
        }
        self.dispatcher.publish(&StreamEvent::Disconnected);

        if !normal {
            self.handle_abnormal_close(generation);
        }
    }

    /// Ask the supervisor what to do and schedule the retry
    fn handle_abnormal_close(self: &Arc<Self>, generation: u64) {
        let decision = {
            let mut state = self.state.lock();
            if state.generation != generation || state.socket.is_some() {
                return;
            }
            let decision = self.supervisor.next(state.reconnect_attempts);
            if let ReconnectDecision::Retry { attempt, .. } = decision {
                state.reconnect_attempts = attempt;
            }
            decision
        };

        match decision {
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    url = %self.url,
                    attempt,
                    max_attempts = self.supervisor.max_attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
                let handle =
                    self.supervisor
                        .schedule(Arc::downgrade(self), generation, attempt, delay);
                let mut state = self.state.lock();
                if state.generation == generation {
                    state.retry_task = Some(handle);
                } else {
                    handle.abort();
                }
            }
            ReconnectDecision::Exhausted { attempts } => {
                let err = StreamError::ReconnectExhausted { attempts };
                warn!(url = %self.url, attempts, "Giving up on reconnection");
                self.dispatcher
                    .publish(&StreamEvent::reconnect_exhausted(err.to_string()));
            }
        }
    }

    /// Fired by the supervisor's timer
    pub(crate) async fn retry(self: &Arc<Self>, generation: u64, attempt: u32) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.socket.is_some() || state.is_connecting {
                debug!(url = %self.url, attempt, "Skipping stale reconnect");
                return;
            }
            state.retry_task = None;
            state.is_connecting = true;
        }

        info!(url = %self.url, attempt, "Reconnecting");
        match self.establish(generation).await {
            Ok(()) => info!(url = %self.url, attempt, "Reconnected"),
            Err(StreamError::Aborted) => debug!(url = %self.url, attempt, "Reconnect aborted"),
            Err(e) => {
                debug!(url = %self.url, attempt, error = %e, "Reconnect attempt failed");
                self.handle_abnormal_close(generation);
            }
        }
    }
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransportConnection")
            .field("url", &self.url)
            .field("connected", &state.socket.as_ref().is_some_and(SocketHandle::is_open))
            .field("is_connecting", &state.is_connecting)
            .field("reconnect_attempts", &state.reconnect_attempts)
            .finish_non_exhaustive()
    }
}

/// Drain the outbound channel into the socket
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
    id: ConnectionId,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(connection = %id, error = %e, "Write failed");
            break;
        }
        if closing {
            break;
        }
    }
    open.store(false, Ordering::SeqCst);
}

//! Shared fixtures for integration tests: an in-process WebSocket relay and
//! an event recorder.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use viewer_core::{Envelope, EventKind, SessionStreamClient, StreamEvent};

/// How long a test waits for an expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Accepted server-side socket
pub type ServerSocket = WebSocketStream<TcpStream>;

/// In-process relay on an ephemeral loopback port
pub struct TestRelay {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
    sockets: mpsc::UnboundedReceiver<ServerSocket>,
    task: Option<JoinHandle<()>>,
}

impl TestRelay {
    /// Bind and start accepting
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let (tx, sockets) = mpsc::unbounded_channel();

        let task = {
            let accepted = Arc::clone(&accepted);
            let paths = Arc::clone(&paths);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let paths = Arc::clone(&paths);
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        paths.lock().push(req.uri().path().to_string());
                        Ok(resp)
                    };
                    if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                        let _ = tx.send(ws);
                    }
                }
            })
        };

        Self {
            addr,
            accepted,
            paths,
            sockets,
            task: Some(task),
        }
    }

    /// URL for an attach path on this relay
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    /// Base address of this relay
    pub fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// TCP connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Request paths seen during handshakes
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    /// Wait for the next completed handshake
    pub async fn next_socket(&mut self) -> ServerSocket {
        tokio::time::timeout(EVENT_TIMEOUT, self.sockets.recv())
            .await
            .expect("timed out waiting for a viewer to attach")
            .expect("relay stopped")
    }

    /// Stop listening; later connects are refused
    pub async fn stop_listening(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Text message carrying an envelope, as the relay sends it
pub fn envelope(event_type: &str, data: Option<Value>) -> Message {
    let text = serde_json::to_string(&Envelope::new(event_type, data)).unwrap();
    Message::Text(text)
}

/// Record every vocabulary event the client publishes
pub fn record(client: &SessionStreamClient) -> mpsc::UnboundedReceiver<StreamEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Frame,
        EventKind::Analysis,
        EventKind::SessionCompleted,
        EventKind::Error,
    ] {
        let tx = tx.clone();
        client.subscribe(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

/// Next recorded event, failing the test on timeout
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert nothing is published for a while
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<StreamEvent>, window: Duration) {
    match tokio::time::timeout(window, events.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(event)) => panic!("unexpected event: {event:?}"),
    }
}

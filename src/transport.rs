//! Session transport
//!
//! Owns at most one socket at a time, bound to a session id. Each connect
//! spawns a driver task tagged with a generation number; events from older
//! generations are discarded by [`Transport::on_event`], so nothing from a
//! torn-down socket can reach the session state.

mod traits;
mod ws;

pub use traits::{Connection, Connector};
pub use ws::WsConnector;

use crate::protocol::OutboundFrame;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Not connected to the planner")]
    NotConnected,
    #[error("Could not connect: {0}")]
    Connect(String),
    #[error("Connection error: {0}")]
    Io(String),
    #[error("Connection closed by the server")]
    ClosedByPeer,
    #[error("Could not encode message: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Frame(String),
    Closed(TransportError),
}

/// Something that happened on a socket, tagged with the session and
/// generation it was opened for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub session_id: String,
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Upper bound on the closing handshake with the server
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a cancelled driver before aborting it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the socket URL for a session
pub fn endpoint_url(base: &str, session_id: &str) -> String {
    format!("{}/{session_id}", base.trim_end_matches('/'))
}

struct Link {
    session_id: String,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct Transport {
    endpoint: String,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    generation: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    link: Option<Link>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a disconnected transport and the receiver its events arrive on
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Self {
            endpoint: endpoint.into(),
            connector,
            state: ConnectionState::Disconnected,
            generation: 0,
            events_tx,
            link: None,
        };
        (transport, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open and still driven. A driver that has already exited counts as
    /// disconnected even before its `Closed` event is applied.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
            && self.link.as_ref().is_some_and(|l| !l.outbound.is_closed())
    }

    /// Session the current socket belongs to
    pub fn session_id(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.session_id.as_str())
    }

    /// Open a socket for `session_id`.
    ///
    /// Idempotent while a socket for the same session is connecting or open.
    /// A socket for any other session is torn down first.
    pub fn connect(&mut self, session_id: &str) {
        if self.session_id() == Some(session_id)
            && matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            tracing::debug!(session_id, "Already connected, ignoring connect");
            return;
        }

        // Dropping the old link cancels its driver
        self.link = None;
        self.generation += 1;
        self.state = ConnectionState::Connecting;

        let url = endpoint_url(&self.endpoint, session_id);
        tracing::info!(%url, generation = self.generation, "Connecting");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let driver = Driver {
            connector: self.connector.clone(),
            url,
            session_id: session_id.to_string(),
            generation: self.generation,
            events_tx: self.events_tx.clone(),
        };
        let task = tokio::spawn(driver.run(outbound_rx, cancel.clone()));

        self.link = Some(Link {
            session_id: session_id.to_string(),
            outbound,
            cancel,
            task: Some(task),
        });
    }

    /// Apply a socket event to the connection state.
    ///
    /// Returns false when the event belongs to a superseded socket and must
    /// be dropped.
    pub fn on_event(&mut self, event: &TransportEvent) -> bool {
        let current = event.generation == self.generation
            && self.session_id() == Some(event.session_id.as_str());
        if !current {
            tracing::debug!(
                generation = event.generation,
                current = self.generation,
                "Dropping event from stale socket"
            );
            return false;
        }

        match &event.kind {
            TransportEventKind::Opened => {
                self.state = ConnectionState::Connected;
                tracing::info!(session_id = %event.session_id, "Connected");
            }
            TransportEventKind::Closed(error) => {
                self.state = ConnectionState::Disconnected;
                self.link = None;
                tracing::warn!(session_id = %event.session_id, %error, "Connection closed");
            }
            TransportEventKind::Frame(_) => {}
        }
        true
    }

    /// Send one user message. Never queued: fails unless the socket is open.
    pub fn send(&self, message: &str, trip_plan_id: Option<&str>) -> Result<(), TransportError> {
        let (Some(link), true) = (&self.link, self.is_connected()) else {
            return Err(TransportError::NotConnected);
        };
        let text = OutboundFrame::new(message, trip_plan_id.map(str::to_string))
            .to_json()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        link.outbound
            .send(text)
            .map_err(|_| TransportError::NotConnected)
    }

    /// Close the socket and wait for its driver to finish.
    ///
    /// Bounded: a driver stuck on an unresponsive peer is aborted. Once this
    /// returns no further events from the closed socket are accepted.
    pub async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            self.state = ConnectionState::Closing;
            link.cancel.cancel();
            if let Some(mut task) = link.task.take() {
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Transport driver panicked"),
                    Err(_) => {
                        tracing::warn!(
                            session_id = %link.session_id,
                            "Transport driver did not stop, aborting"
                        );
                        task.abort();
                    }
                }
            }
            tracing::info!(session_id = %link.session_id, "Disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }
}

/// Per-socket task: opens the connection, pumps both directions, and
/// reports what happened. Emits nothing after cancellation.
struct Driver {
    connector: Arc<dyn Connector>,
    url: String,
    session_id: String,
    generation: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Driver {
    fn emit(&self, kind: TransportEventKind) {
        // Receiver gone means the session was dropped
        let _ = self.events_tx.send(TransportEvent {
            session_id: self.session_id.clone(),
            generation: self.generation,
            kind,
        });
    }

    async fn run(
        self,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) {
        let mut conn = tokio::select! {
            () = cancel.cancelled() => return,
            result = self.connector.open(&self.url) => match result {
                Ok(conn) => conn,
                Err(e) => {
                    self.emit(TransportEventKind::Closed(e));
                    return;
                }
            },
        };
        self.emit(TransportEventKind::Opened);

        let error = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    close(conn.as_mut()).await;
                    return;
                }
                Some(text) = outbound_rx.recv() => {
                    // A peer that stops reading must not hold up cancellation
                    let sent = tokio::select! {
                        () = cancel.cancelled() => {
                            close(conn.as_mut()).await;
                            return;
                        }
                        sent = conn.send_text(text) => sent,
                    };
                    if let Err(e) = sent {
                        break e;
                    }
                }
                incoming = conn.recv_text() => match incoming {
                    Some(Ok(text)) => self.emit(TransportEventKind::Frame(text)),
                    Some(Err(e)) => break e,
                    None => break TransportError::ClosedByPeer,
                },
            }
        };

        close(conn.as_mut()).await;
        if !cancel.is_cancelled() {
            self.emit(TransportEventKind::Closed(error));
        }
    }
}

async fn close(conn: &mut dyn Connection) {
    if tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
        tracing::debug!("Closing handshake timed out");
    }
}

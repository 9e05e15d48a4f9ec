//! Mock implementations for testing
//!
//! [`ScriptedConnector`] hands every connection the session opens to the test
//! as a [`ServerEnd`], which plays the planner: it pushes frames, reads what
//! the client sent and can drop the connection.

use super::*;
use crate::auth::AuthSession;
use crate::db::{MemoryStore, SESSION_ID_KEY, TOKEN_KEY};
use crate::store::Role;
use crate::transport::Connection;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const WS_BASE: &str = "ws://planner.test/api/v1/chat/ws";

// ============================================================================
// Scripted Connector
// ============================================================================

enum ServerMsg {
    Text(String),
    Fail(TransportError),
}

/// Connector whose connections are driven by the test
pub struct ScriptedConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refusals: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            refusals: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Fail the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let server = ServerEnd {
            url: url.to_string(),
            to_client,
            from_client,
            client_closed: closed.clone(),
        };
        self.accepted
            .send(server)
            .map_err(|_| TransportError::Connect("test ended".to_string()))?;

        Ok(Box::new(ScriptedConnection {
            inbound,
            outbound,
            closed,
        }))
    }
}

struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<ServerMsg>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Io("server gone".to_string()))
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        match self.inbound.recv().await? {
            ServerMsg::Text(text) => Some(Ok(text)),
            ServerMsg::Fail(e) => Some(Err(e)),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// The planner's side of one connection. Dropping it closes the connection.
pub struct ServerEnd {
    pub url: String,
    to_client: mpsc::UnboundedSender<ServerMsg>,
    from_client: mpsc::UnboundedReceiver<String>,
    client_closed: Arc<AtomicBool>,
}

impl ServerEnd {
    pub fn push(&self, frame: &Value) {
        self.push_raw(&frame.to_string());
    }

    /// Ignored when the client has already gone away
    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.send(ServerMsg::Text(text.to_string()));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.to_client.send(ServerMsg::Fail(error));
    }

    /// Next frame the client sent, parsed
    pub async fn next_outbound(&mut self) -> Option<Value> {
        let text = tokio::time::timeout(Duration::from_secs(1), self.from_client.recv())
            .await
            .ok()
            .flatten()?;
        Some(serde_json::from_str(&text).unwrap())
    }

    pub fn try_outbound(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    pub fn client_closed(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Stalled Connector
// ============================================================================

/// Connector whose connections accept the socket and then never make
/// progress: sends, reads and the closing handshake all hang
pub struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    async fn open(&self, _url: &str) -> Result<Box<dyn Connection>, TransportError> {
        Ok(Box::new(StalledConnection))
    }
}

struct StalledConnection;

#[async_trait]
impl Connection for StalledConnection {
    async fn send_text(&mut self, _text: String) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        std::future::pending().await
    }

    async fn close(&mut self) {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Mock Auth
// ============================================================================

pub struct MockAuth;

#[async_trait]
impl AuthApi for MockAuth {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        if credentials.password == "wrong" {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(AuthSession {
            user: User {
                user_id: 1,
                username: "asha".to_string(),
            },
            token: "jwt-login".to_string(),
        })
    }

    async fn register(&self, registration: &Registration) -> Result<AuthSession, AuthError> {
        if registration.username == "taken" {
            return Err(AuthError::Rejected(
                "Username or email already registered".to_string(),
            ));
        }
        Ok(AuthSession {
            user: User {
                user_id: 2,
                username: registration.username.clone(),
            },
            token: "jwt-register".to_string(),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

fn test_config(response_timeout: Option<Duration>) -> ClientConfig {
    ClientConfig {
        ws_url: WS_BASE.to_string(),
        api_url: "http://planner.test".to_string(),
        state_path: PathBuf::from("unused.db"),
        response_timeout,
    }
}

/// Session over a peer that stops responding once a message is in flight
async fn stalled_session() -> TripSession {
    let mut session = TripSession::new(
        &test_config(None),
        Arc::new(MemoryStore::new()),
        Arc::new(StalledConnector),
        Arc::new(MockAuth),
    );
    session.init();
    tokio::time::timeout(Duration::from_secs(1), async {
        while session.connection_state() != ConnectionState::Connected {
            session.next_event().await;
        }
    })
    .await
    .expect("stalled peer never accepted the socket");

    session.handle_send("Mumbai to Delhi").unwrap();
    // Let the driver pick the frame up and block on it
    tokio::time::sleep(Duration::from_millis(20)).await;
    session
}

pub struct Harness {
    pub session: TripSession,
    pub connector: Arc<ScriptedConnector>,
    pub kv: Arc<MemoryStore>,
    servers: mpsc::UnboundedReceiver<ServerEnd>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Some(Duration::from_secs(30)))
    }

    pub fn with_timeout(response_timeout: Option<Duration>) -> Self {
        Self::with_store(response_timeout, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(response_timeout: Option<Duration>, kv: Arc<MemoryStore>) -> Self {
        let (connector, servers) = ScriptedConnector::new();
        let session = TripSession::new(
            &test_config(response_timeout),
            kv.clone(),
            connector.clone(),
            Arc::new(MockAuth),
        );
        Self {
            session,
            connector,
            kv,
            servers,
        }
    }

    /// Wait for the session to open its next connection
    pub async fn accept(&mut self) -> ServerEnd {
        tokio::time::timeout(Duration::from_secs(1), self.servers.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }

    /// Init, accept and process the ack
    pub async fn connected(&mut self) -> ServerEnd {
        self.session.init();
        let server = self.accept().await;
        self.pump_until(|s| s.connection == ConnectionState::Connected)
            .await;
        server
    }

    /// Dispatch events until the store satisfies `done`
    pub async fn pump_until(&mut self, done: impl Fn(&TripState) -> bool) {
        let session = &mut self.session;
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done(&session.store().snapshot()) {
                session.next_event().await;
            }
        })
        .await
        .expect("store never reached the expected state");
    }

    /// Dispatch whatever arrives within `duration`
    pub async fn pump_for(&mut self, duration: Duration) {
        let session = &mut self.session;
        let _ = tokio::time::timeout(duration, async {
            loop {
                session.next_event().await;
            }
        })
        .await;
    }

    pub fn state(&self) -> TripState {
        self.session.store().snapshot()
    }
}

fn chunk(content: &str) -> Value {
    json!({"type": "chunk", "content": content})
}

fn done(full_response: Option<&str>) -> Value {
    json!({"type": "done", "full_response": full_response, "response_type": "chat"})
}

fn flight(number: &str, rank: u32) -> Value {
    json!({
        "flight_number": number,
        "airline": "IndiGo",
        "source": "BOM",
        "destination": "DEL",
        "price": 5400.0,
        "rank": rank,
        "recommended": rank == 1
    })
}

fn contents(state: &TripState) -> Vec<(Role, &str)> {
    state
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect()
}

fn idle_with(count: usize) -> impl Fn(&TripState) -> bool {
    move |s: &TripState| !s.is_typing && s.messages.len() == count
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_streamed_reply_uses_full_response() {
    let mut h = Harness::new();
    let mut server = h.connected().await;
    assert!(server.url.starts_with(WS_BASE));
    assert!(server.url.ends_with(h.session.session_id()));

    h.session.handle_send("Mumbai to Delhi").unwrap();
    assert!(h.state().is_typing);
    assert_eq!(
        server.next_outbound().await.unwrap(),
        json!({"message": "Mumbai to Delhi", "trip_plan_id": null})
    );

    server.push(&chunk("Look"));
    server.push(&chunk("ing..."));
    server.push(&done(Some("Looking...")));
    h.pump_until(idle_with(2)).await;

    assert_eq!(
        contents(&h.state()),
        vec![(Role::User, "Mumbai to Delhi"), (Role::Assistant, "Looking...")]
    );
}

#[tokio::test]
async fn test_chunks_concatenate_without_full_response() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Goa in December").unwrap();
    for part in ["Here ", "are ", "three ", "options."] {
        server.push(&chunk(part));
    }
    server.push(&done(None));
    h.pump_until(idle_with(2)).await;

    assert_eq!(
        h.state().messages[1].content,
        "Here are three options."
    );
}

#[tokio::test]
async fn test_server_error_fails_cycle() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Goa flights").unwrap();
    server.push(&json!({"type": "error", "content": "timeout"}));
    h.pump_until(idle_with(2)).await;

    let state = h.state();
    let assistant: Vec<_> = state.assistant_messages().collect();
    assert_eq!(assistant.len(), 1);
    assert!(assistant[0].content.contains("timeout"));
    assert!(!h.session.is_typing());

    // The session stays usable
    h.session.handle_send("try again").unwrap();
}

#[tokio::test]
async fn test_flight_results_apply_mid_stream() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    server.push(&chunk("Searching"));
    server.push(&json!({
        "type": "flight_results",
        "data": [flight("6E-201", 1), flight("AI-865", 2)]
    }));
    h.pump_until(|s| s.artifacts.ranked_flights.len() == 2).await;

    let state = h.state();
    assert!(state.is_typing);
    assert!(state.panel_visible);
    assert_eq!(
        state.artifacts.ranked_flights[0].flight_number.as_deref(),
        Some("6E-201")
    );
    assert_eq!(state.messages.len(), 1);

    // A second batch replaces the first
    server.push(&json!({"type": "flight_results", "data": [flight("UK-955", 1)]}));
    h.pump_until(|s| s.artifacts.ranked_flights.len() == 1).await;
}

#[tokio::test]
async fn test_new_trip_drops_late_frames_from_old_session() {
    let mut h = Harness::new();
    let old_server = h.connected().await;
    let old_id = h.session.session_id().to_string();

    h.session.handle_send("Mumbai to Delhi").unwrap();
    old_server.push(&chunk("Look"));
    h.pump_until(|s| s.is_typing).await;

    // Let the old socket deliver a `done` that is still queued when the trip is rotated
    old_server.push(&done(Some("Looking...")));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let new_id = h.session.new_trip().await;
    assert_ne!(new_id, old_id);
    assert!(old_server.client_closed());

    let state = h.state();
    assert_eq!(state.session_id, new_id);
    assert!(state.messages.is_empty());
    assert!(!state.is_typing);

    let new_server = h.accept().await;
    assert!(new_server.url.ends_with(&new_id));
    h.pump_until(|s| s.connection == ConnectionState::Connected)
        .await;

    old_server.push(&done(Some("Late")));
    h.pump_for(Duration::from_millis(100)).await;

    assert!(h.state().messages.is_empty());
    assert!(!h.state().is_typing);
}

#[tokio::test]
async fn test_new_trip_resets_all_state() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Plan Goa").unwrap();
    server.push(&json!({"type": "flight_results", "data": [flight("6E-201", 1)]}));
    server.push(&json!({"type": "risk_warnings", "data": [
        {"flight_number": "6E-201", "warning_type": "weather", "severity": "red", "message": "Monsoon"}
    ]}));
    server.push(&json!({"type": "trip_plan", "data": {
        "destination": "Goa",
        "recommended_flight": flight("6E-201", 1),
        "recommended_hotels": [{"name": "Taj"}],
        "itinerary": {"days": [{"day": 1, "theme": "Beaches", "activities": [], "meals": []}]},
        "food_recommendations": [{"name": "Fisherman's Wharf"}]
    }}));
    server.push(&json!({"type": "done", "full_response": "Done", "trip_plan_id": 42}));
    h.pump_until(idle_with(2)).await;

    let state = h.state();
    assert_eq!(state.artifacts.trip_plan_id.as_deref(), Some("42"));
    assert_eq!(state.artifacts.recommended_hotels.len(), 1);
    assert!(state.artifacts.recommended_flight.is_some());
    assert_eq!(state.artifacts.critical_warnings().count(), 1);
    let before = state.session_id;

    let after = h.session.new_trip().await;

    let state = h.state();
    assert_ne!(after, before);
    assert!(state.messages.is_empty());
    assert!(state.artifacts.is_empty());
    assert!(state.artifacts.trip_plan.is_none());
    assert!(!state.panel_visible);
    assert_eq!(h.kv.get(SESSION_ID_KEY).unwrap(), Some(after));
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_clear_messages_keeps_session() {
    let mut h = Harness::new();
    let mut server = h.connected().await;
    let id = h.session.session_id().to_string();

    h.session.handle_send("Mumbai to Delhi").unwrap();
    server.next_outbound().await.unwrap();
    server.push(&json!({"type": "done", "full_response": "Planned", "trip_plan_id": 3}));
    h.pump_until(idle_with(2)).await;

    h.session.clear_messages();

    let state = h.state();
    assert!(state.messages.is_empty());
    assert_eq!(state.artifacts.trip_plan_id, None);
    assert_eq!(h.session.session_id(), id);
    assert!(!server.client_closed());

    h.session.handle_send("Goa instead").unwrap();
    assert_eq!(
        server.next_outbound().await.unwrap(),
        json!({"message": "Goa instead", "trip_plan_id": null})
    );
}

#[tokio::test]
async fn test_trip_plan_id_sent_with_next_message() {
    let mut h = Harness::new();
    let mut server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    server.next_outbound().await.unwrap();
    server.push(&json!({"type": "done", "full_response": "Planned", "trip_plan_id": 7}));
    h.pump_until(idle_with(2)).await;

    h.session.handle_send("Cheaper hotels?").unwrap();
    assert_eq!(
        server.next_outbound().await.unwrap(),
        json!({"message": "Cheaper hotels?", "trip_plan_id": "7"})
    );
}

#[tokio::test]
async fn test_send_rejected_while_streaming() {
    let mut h = Harness::new();
    let mut server = h.connected().await;

    h.session.handle_send("first").unwrap();
    assert_eq!(
        h.session.handle_send("second"),
        Err(CommandError::Transition(TransitionError::CycleInFlight))
    );

    server.next_outbound().await.unwrap();
    h.pump_for(Duration::from_millis(20)).await;
    assert_eq!(server.try_outbound(), None);
    assert_eq!(h.state().messages.len(), 1);
}

#[tokio::test]
async fn test_blank_message_rejected() {
    let mut h = Harness::new();
    let _server = h.connected().await;

    assert_eq!(
        h.session.handle_send("   "),
        Err(CommandError::Transition(TransitionError::EmptyMessage))
    );
    assert!(h.state().messages.is_empty());
    assert!(!h.state().is_typing);
}

#[tokio::test]
async fn test_send_before_connect_is_not_queued() {
    let mut h = Harness::new();

    assert_eq!(
        h.session.handle_send("hello"),
        Err(CommandError::Transport(TransportError::NotConnected))
    );

    let mut server = h.connected().await;
    h.pump_for(Duration::from_millis(20)).await;
    assert_eq!(server.try_outbound(), None);
    assert!(h.state().messages.is_empty());
}

#[tokio::test]
async fn test_initial_message_sent_on_connect() {
    let mut h = Harness::new();
    h.session.queue_initial_message("Weekend in Jaipur");
    let mut server = h.connected().await;

    assert_eq!(
        server.next_outbound().await.unwrap()["message"],
        "Weekend in Jaipur"
    );
    let state = h.state();
    assert!(state.is_typing);
    assert_eq!(contents(&state), vec![(Role::User, "Weekend in Jaipur")]);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_response_timeout_fails_cycle_once() {
    let mut h = Harness::with_timeout(Some(Duration::from_millis(50)));
    let server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    server.push(&chunk("Look"));
    h.pump_until(idle_with(2)).await;
    assert!(h.state().messages[1].content.contains("timed out"));

    // The reply finally arrives: no second assistant message, plan id still recorded
    server.push(&json!({"type": "done", "full_response": "Looking...", "trip_plan_id": "9"}));
    h.pump_until(|s| s.artifacts.trip_plan_id.is_some()).await;
    assert_eq!(h.state().messages.len(), 2);
}

#[tokio::test]
async fn test_no_timeout_when_disabled() {
    let mut h = Harness::with_timeout(None);
    let server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    h.pump_for(Duration::from_millis(100)).await;
    assert!(h.state().is_typing);

    server.push(&done(Some("Finally")));
    h.pump_until(idle_with(2)).await;
}

#[tokio::test]
async fn test_connection_loss_mid_stream() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    server.push(&chunk("Look"));
    h.pump_until(|s| s.is_typing).await;
    drop(server);

    h.pump_until(|s| s.connection == ConnectionState::Disconnected)
        .await;
    let state = h.state();
    assert!(!state.is_typing);
    assert_eq!(state.messages.len(), 2);
    assert!(state.messages[1].content.starts_with("Something went wrong"));
    assert!(state.transport_error.is_some());

    assert_eq!(
        h.session.handle_send("hello?"),
        Err(CommandError::Transport(TransportError::NotConnected))
    );

    // Reconnection is up to the caller
    h.session.connect();
    let _server = h.accept().await;
    h.pump_until(|s| s.connection == ConnectionState::Connected)
        .await;
    assert!(h.state().transport_error.is_none());
}

#[tokio::test]
async fn test_send_after_unprocessed_close_is_rejected() {
    let mut h = Harness::new();
    let server = h.connected().await;

    // The socket is gone but its close has not been dispatched yet
    drop(server);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(
        h.session.handle_send("Mumbai to Delhi"),
        Err(CommandError::Transport(TransportError::NotConnected))
    );
    assert!(h.state().messages.is_empty());
    assert!(!h.state().is_typing);

    h.pump_until(|s| s.connection == ConnectionState::Disconnected)
        .await;
    assert!(h.state().messages.is_empty());
}

#[tokio::test]
async fn test_new_trip_does_not_hang_on_stalled_peer() {
    let mut session = stalled_session().await;
    let old_id = session.session_id().to_string();

    let new_id = tokio::time::timeout(Duration::from_secs(3), session.new_trip())
        .await
        .expect("new_trip blocked on the stalled socket");

    assert_ne!(new_id, old_id);
    let state = session.store().snapshot();
    assert!(state.messages.is_empty());
    assert!(!state.is_typing);
}

#[tokio::test]
async fn test_dispose_does_not_hang_on_stalled_peer() {
    let mut session = stalled_session().await;

    tokio::time::timeout(Duration::from_secs(3), session.dispose())
        .await
        .expect("dispose blocked on the stalled socket");

    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(!session.is_typing());
}

#[tokio::test]
async fn test_socket_error_reported() {
    let mut h = Harness::new();
    let server = h.connected().await;

    server.fail(TransportError::Io("reset by peer".to_string()));
    h.pump_until(|s| s.connection == ConnectionState::Disconnected)
        .await;
    assert!(h.state().transport_error.unwrap().contains("reset by peer"));
    // Nothing was in flight, so nothing is appended
    assert!(h.state().messages.is_empty());
}

#[tokio::test]
async fn test_connect_failure_returns_to_disconnected() {
    let mut h = Harness::new();
    h.connector.refuse_next(1);

    h.session.init();
    assert_eq!(h.session.connection_state(), ConnectionState::Connecting);
    h.pump_until(|s| s.transport_error.is_some()).await;
    assert_eq!(h.state().connection, ConnectionState::Disconnected);

    h.session.connect();
    let _server = h.accept().await;
    h.pump_until(|s| s.connection == ConnectionState::Connected)
        .await;
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    server.push_raw("not json");
    server.push(&json!({"type": "mystery", "content": "?"}));
    server.push(&json!({"content": "no tag"}));
    server.push(&json!({"type": "chunk"}));
    server.push(&chunk("Looking"));
    server.push(&done(None));
    h.pump_until(idle_with(2)).await;

    assert_eq!(h.state().messages[1].content, "Looking");
    assert_eq!(h.state().connection, ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let mut h = Harness::new();
    let _server = h.connected().await;

    h.session.connect();
    h.session.init();
    h.pump_for(Duration::from_millis(20)).await;
    assert!(h.servers.try_recv().is_err());
    assert_eq!(h.session.connection_state(), ConnectionState::Connected);
}

// ============================================================================
// Lifecycle and auth
// ============================================================================

#[tokio::test]
async fn test_dispose_closes_connection() {
    let mut h = Harness::new();
    let server = h.connected().await;

    h.session.handle_send("Mumbai to Delhi").unwrap();
    h.session.dispose().await;

    assert!(server.client_closed());
    assert!(!h.state().is_typing);
    assert_eq!(h.state().connection, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_session_id_survives_restart() {
    let kv = Arc::new(MemoryStore::new());
    let first = Harness::with_store(None, kv.clone());
    let id = first.session.session_id().to_string();
    drop(first);

    let second = Harness::with_store(None, kv);
    assert_eq!(second.session.session_id(), id);
}

#[tokio::test]
async fn test_login_persists_token() {
    let mut h = Harness::new();

    let user = h
        .session
        .login(&Credentials::new("asha@example.com", "secret"))
        .await
        .unwrap();
    assert_eq!(user.username, "asha");
    assert_eq!(h.state().token.as_deref(), Some("jwt-login"));
    assert_eq!(h.kv.get(TOKEN_KEY).unwrap().as_deref(), Some("jwt-login"));

    // Token is restored on the next start
    let restarted = Harness::with_store(None, h.kv.clone());
    assert_eq!(restarted.state().token.as_deref(), Some("jwt-login"));

    h.session.logout();
    assert!(h.state().user.is_none());
    assert_eq!(h.kv.get(TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_auth_failures_surface() {
    let mut h = Harness::new();

    assert_eq!(
        h.session
            .login(&Credentials::new("asha@example.com", "wrong"))
            .await,
        Err(CommandError::Auth(AuthError::InvalidCredentials))
    );
    let taken = Registration {
        username: "taken".to_string(),
        email: "t@example.com".to_string(),
        password: "pw".to_string(),
    };
    assert!(matches!(
        h.session.register(&taken).await,
        Err(CommandError::Auth(AuthError::Rejected(_)))
    ));
    assert!(h.state().user.is_none());
}

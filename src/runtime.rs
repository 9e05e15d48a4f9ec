//! Trip session runtime
//!
//! [`TripSession`] is the command layer and the event dispatcher for one
//! client. User commands and socket events both go through the pure
//! [`transition`] function; the resulting effects are applied to the store
//! and the transport here. All dispatch is synchronous: the only await points
//! are waiting for the next socket event or deadline, and tearing a socket
//! down.

#[cfg(test)]
mod testing;

use crate::auth::{AuthApi, AuthError, Credentials, Registration, User};
use crate::config::ClientConfig;
use crate::db::KeyValueStore;
use crate::protocol::decode_frame;
use crate::session::SessionIdentity;
use crate::state_machine::{transition, CycleContext, CycleState, Effect, Event, TransitionError};
use crate::store::{TripState, TripStore};
use crate::transport::{
    ConnectionState, Connector, Transport, TransportError, TransportEvent, TransportEventKind,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Why a user command was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Response deadline for the open cycle
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    cycle: u64,
}

/// One client session: identity, socket, cycle state and the store it drives
pub struct TripSession {
    identity: SessionIdentity,
    transport: Transport,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    auth: Arc<dyn AuthApi>,
    store: TripStore,
    context: CycleContext,
    state: CycleState,
    last_cycle: u64,
    response_timeout: Option<Duration>,
    deadline: Option<Deadline>,
    /// Sent once on the next connection ack
    pending_initial: Option<String>,
}

impl TripSession {
    /// Build a session from persisted state. Nothing connects until [`init`](Self::init).
    pub fn new(
        config: &ClientConfig,
        kv: Arc<dyn KeyValueStore>,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthApi>,
    ) -> Self {
        let identity = SessionIdentity::create(kv);
        let session_id = identity.current().to_string();
        let (transport, transport_rx) = Transport::new(config.ws_url.clone(), connector);

        let store = TripStore::new(session_id.clone());
        store.restore_token(identity.load_token());

        Self {
            identity,
            transport,
            transport_rx,
            auth,
            store,
            context: CycleContext::new(session_id),
            state: CycleState::Idle,
            last_cycle: 0,
            response_timeout: config.response_timeout,
            deadline: None,
            pending_initial: None,
        }
    }

    // ==================== Lifecycle ====================

    /// Open the socket for the current session
    pub fn init(&mut self) {
        self.connect();
    }

    /// Reconnect after a drop. Never done automatically.
    pub fn connect(&mut self) {
        self.transport.connect(self.identity.current());
        self.store.set_connection_state(self.transport.state());
    }

    /// Abandon any open cycle and close the socket
    pub async fn dispose(&mut self) {
        self.dispatch_logged(Event::Abandon);
        self.transport.disconnect().await;
        self.store.set_connection_state(self.transport.state());
        tracing::info!(session_id = %self.context.session_id, "Session disposed");
    }

    // ==================== Commands ====================

    /// Send a user message. Fails without side effects when the socket is
    /// not open, a reply is still streaming, or the text is blank.
    pub fn handle_send(&mut self, text: &str) -> Result<(), CommandError> {
        if !self.transport.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        let cycle = self.last_cycle + 1;
        self.dispatch(Event::UserSend {
            text: text.to_string(),
            cycle,
        })?;
        self.last_cycle = cycle;
        Ok(())
    }

    /// Start over with a fresh session.
    ///
    /// Every reset is visible in the store before this returns, and no event
    /// from the old socket is dispatched afterwards. Returns the new session id.
    pub async fn new_trip(&mut self) -> String {
        self.dispatch_logged(Event::Abandon);
        self.deadline = None;

        let session_id = self.identity.rotate().to_string();
        self.context = CycleContext::new(session_id.clone());
        self.store.new_trip(session_id.clone());

        self.transport.disconnect().await;
        self.transport.connect(&session_id);
        self.store.set_connection_state(self.transport.state());

        tracing::info!(%session_id, "Started new trip");
        session_id
    }

    /// Drop the conversation and planning results but stay on the same
    /// session and socket
    pub fn clear_messages(&mut self) {
        self.dispatch_logged(Event::Abandon);
        self.store.clear_messages();
    }

    /// Send `text` as soon as the next connection is acknowledged
    pub fn queue_initial_message(&mut self, text: impl Into<String>) {
        self.pending_initial = Some(text.into());
    }

    pub fn set_panel_visible(&self, visible: bool) {
        self.store.set_panel_visible(visible);
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<User, CommandError> {
        let session = self.auth.login(credentials).await?;
        tracing::info!(user_id = session.user.user_id, "Logged in");
        self.identity.save_token(&session.token);
        self.store.set_user(session.user.clone(), session.token);
        Ok(session.user)
    }

    pub async fn register(&mut self, registration: &Registration) -> Result<User, CommandError> {
        let session = self.auth.register(registration).await?;
        tracing::info!(user_id = session.user.user_id, "Registered");
        self.identity.save_token(&session.token);
        self.store.set_user(session.user.clone(), session.token);
        Ok(session.user)
    }

    pub fn logout(&mut self) {
        self.identity.clear_token();
        self.store.logout();
    }

    // ==================== Accessors ====================

    pub fn store(&self) -> &TripStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<TripState> {
        self.store.subscribe()
    }

    pub fn session_id(&self) -> &str {
        self.identity.current()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_typing(&self) -> bool {
        self.state.is_streaming()
    }

    // ==================== Event loop ====================

    /// Wait for one socket event or the response deadline and dispatch it.
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub async fn next_event(&mut self) {
        let deadline = self.deadline;
        tokio::select! {
            Some(event) = self.transport_rx.recv() => self.on_transport_event(event),
            () = sleep_until(deadline) => self.on_deadline(),
        }
    }

    fn on_deadline(&mut self) {
        if let Some(Deadline { cycle, .. }) = self.deadline.take() {
            tracing::warn!(session_id = %self.context.session_id, cycle, "Response timed out");
            self.dispatch_logged(Event::ResponseTimeout {
                session_id: self.context.session_id.clone(),
                cycle,
            });
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        if !self.transport.on_event(&event) {
            return;
        }
        self.store.set_connection_state(self.transport.state());

        let TransportEvent {
            session_id, kind, ..
        } = event;
        match kind {
            TransportEventKind::Opened => {
                if let Some(text) = self.pending_initial.take() {
                    if let Err(e) = self.handle_send(&text) {
                        tracing::warn!(error = %e, "Could not send initial message");
                    }
                }
            }
            TransportEventKind::Frame(text) => match decode_frame(&text) {
                Ok(frame) => {
                    tracing::debug!(
                        tag = frame.tag(),
                        terminal = frame.is_terminal(),
                        %session_id,
                        "Frame received"
                    );
                    self.dispatch_logged(Event::Frame { session_id, frame });
                }
                Err(e) => tracing::warn!(error = %e, "Dropping malformed frame"),
            },
            TransportEventKind::Closed(error) => {
                self.store.set_transport_error(error.to_string());
                self.dispatch_logged(Event::ConnectionLost {
                    session_id,
                    reason: Some(error.to_string()),
                });
            }
        }
    }

    /// Run an event through the state machine and apply its effects,
    /// including any events the effects generate
    fn dispatch(&mut self, event: Event) -> Result<(), TransitionError> {
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = transition(&self.state, &self.context, current_event)?;
            if result.ignored {
                tracing::debug!(session_id = %self.context.session_id, "Event ignored");
            }
            self.state = result.new_state;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect) {
                    events_to_process.push(generated_event);
                }
            }
        }
        Ok(())
    }

    fn dispatch_logged(&mut self, event: Event) {
        if let Err(e) = self.dispatch(event) {
            tracing::warn!(error = %e, "Event rejected");
        }
    }

    fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::AppendMessage { role, content } => {
                self.store.add_message(role, content);
            }
            Effect::SetTyping(typing) => self.store.set_is_typing(typing),
            Effect::ReplaceFlights(flights) => self.store.set_flight_results(flights),
            Effect::ReplaceRiskWarnings(warnings) => self.store.set_risk_warnings(warnings),
            Effect::ReplaceTripPlan(plan) => self.store.set_trip_plan(Some(plan)),
            Effect::SetTripPlanId(id) => self.store.set_trip_plan_id(id),
            Effect::ShowPanel => self.store.set_panel_visible(true),

            Effect::SendFrame { text } => {
                let trip_plan_id = self.store.trip_plan_id();
                if let Err(e) = self.transport.send(&text, trip_plan_id.as_deref()) {
                    tracing::warn!(error = %e, "Send failed");
                    return Some(Event::ConnectionLost {
                        session_id: self.context.session_id.clone(),
                        reason: Some(e.to_string()),
                    });
                }
                tracing::debug!(cycle = ?self.state.cycle(), ?trip_plan_id, "Message sent");
            }

            Effect::ArmTimeout { cycle } => {
                self.deadline = self.response_timeout.map(|timeout| Deadline {
                    at: Instant::now() + timeout,
                    cycle,
                });
            }
            Effect::DisarmTimeout => self.deadline = None,
        }
        None
    }
}

async fn sleep_until(deadline: Option<Deadline>) {
    match deadline {
        Some(Deadline { at, .. }) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

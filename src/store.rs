//! Canonical client state
//!
//! [`TripStore`] is the single source of truth the UI renders from. Every
//! mutation is one atomic update of the [`TripState`] snapshot, published to
//! subscribers through a `watch` channel. Only the session runtime (command
//! handling and frame dispatch) mutates it.

use crate::auth::User;
use crate::protocol::{Flight, FoodRecommendation, Hotel, Itinerary, RiskWarning, TripPlan};
use crate::transport::ConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation entry, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Structured planning outputs. Each planning frame replaces its fields wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripArtifacts {
    pub trip_plan_id: Option<String>,
    pub trip_plan: Option<TripPlan>,
    pub ranked_flights: Vec<Flight>,
    pub recommended_flight: Option<Flight>,
    pub risk_warnings: Vec<RiskWarning>,
    pub recommended_hotels: Vec<Hotel>,
    pub itinerary: Option<Itinerary>,
    pub food_recommendations: Vec<FoodRecommendation>,
}

impl TripArtifacts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Red-severity warnings shown next to the conversation
    pub fn critical_warnings(&self) -> impl Iterator<Item = &RiskWarning> {
        self.risk_warnings
            .iter()
            .filter(|w| w.severity.is_critical())
    }
}

/// Full view model snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripState {
    pub session_id: String,
    pub connection: ConnectionState,
    /// Last transport failure, cleared when a connection opens
    pub transport_error: Option<String>,
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub artifacts: TripArtifacts,
    pub panel_visible: bool,
    pub user: Option<User>,
    #[serde(skip)]
    pub token: Option<String>,
}

impl TripState {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn assistant_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::Assistant)
    }

    fn reset_conversation(&mut self) {
        self.messages.clear();
        self.is_typing = false;
        self.artifacts = TripArtifacts::default();
        self.panel_visible = false;
    }
}

/// Observable owner of the [`TripState`]
#[derive(Debug)]
pub struct TripStore {
    tx: watch::Sender<TripState>,
}

impl TripStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(TripState {
            session_id: session_id.into(),
            ..TripState::default()
        });
        Self { tx }
    }

    /// Receive every subsequent snapshot
    pub fn subscribe(&self) -> watch::Receiver<TripState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TripState {
        self.tx.borrow().clone()
    }

    pub fn trip_plan_id(&self) -> Option<String> {
        self.tx.borrow().artifacts.trip_plan_id.clone()
    }

    // ==================== Conversation ====================

    /// Append a message with a generated id and timestamp
    pub(crate) fn add_message(&self, role: Role, content: impl Into<String>) -> Message {
        let message = Message::new(role, content.into());
        let appended = message.clone();
        self.tx.send_modify(|s| s.messages.push(appended));
        message
    }

    pub(crate) fn set_is_typing(&self, typing: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.is_typing != typing;
            s.is_typing = typing;
            changed
        });
    }

    // ==================== Planning artifacts ====================

    pub(crate) fn set_flight_results(&self, flights: Vec<Flight>) {
        self.tx.send_modify(|s| s.artifacts.ranked_flights = flights);
    }

    pub(crate) fn set_risk_warnings(&self, warnings: Vec<RiskWarning>) {
        self.tx.send_modify(|s| s.artifacts.risk_warnings = warnings);
    }

    /// Replace the plan and everything derived from it.
    ///
    /// Absent fields in the new plan clear the previous values.
    pub(crate) fn set_trip_plan(&self, plan: Option<TripPlan>) {
        self.tx.send_modify(|s| {
            let artifacts = &mut s.artifacts;
            match &plan {
                Some(p) => {
                    artifacts.recommended_hotels = p.recommended_hotels.clone();
                    artifacts.itinerary = p.itinerary.clone();
                    artifacts.food_recommendations = p.food_recommendations.clone();
                    artifacts.recommended_flight = p.recommended_flight.clone();
                }
                None => {
                    artifacts.recommended_hotels = Vec::new();
                    artifacts.itinerary = None;
                    artifacts.food_recommendations = Vec::new();
                    artifacts.recommended_flight = None;
                }
            }
            artifacts.trip_plan = plan;
        });
    }

    pub(crate) fn set_trip_plan_id(&self, id: impl Into<String>) {
        let id = id.into();
        self.tx.send_modify(|s| s.artifacts.trip_plan_id = Some(id));
    }

    pub(crate) fn set_panel_visible(&self, visible: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.panel_visible != visible;
            s.panel_visible = visible;
            changed
        });
    }

    // ==================== Connection ====================

    pub(crate) fn set_connection_state(&self, connection: ConnectionState) {
        self.tx.send_if_modified(|s| {
            let changed = s.connection != connection;
            s.connection = connection;
            if connection == ConnectionState::Connected {
                s.transport_error = None;
            }
            changed
        });
    }

    pub(crate) fn set_transport_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.tx.send_modify(|s| s.transport_error = Some(error));
    }

    // ==================== Auth ====================

    pub(crate) fn set_user(&self, user: User, token: impl Into<String>) {
        let token = token.into();
        self.tx.send_modify(|s| {
            s.user = Some(user);
            s.token = Some(token);
        });
    }

    pub(crate) fn logout(&self) {
        self.tx.send_modify(|s| {
            s.user = None;
            s.token = None;
        });
    }

    pub(crate) fn restore_token(&self, token: Option<String>) {
        self.tx.send_modify(|s| s.token = token);
    }

    // ==================== Reset ====================

    /// Reset conversational and planning state, keeping the session identity
    pub(crate) fn clear_messages(&self) {
        self.tx.send_modify(TripState::reset_conversation);
    }

    /// Reset for a freshly rotated session in one update
    pub(crate) fn new_trip(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        self.tx.send_modify(|s| {
            s.reset_conversation();
            s.session_id = session_id;
        });
    }
}

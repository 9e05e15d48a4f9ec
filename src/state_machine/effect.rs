//! Effects produced by state transitions

use crate::protocol::{Flight, RiskWarning, TripPlan};
use crate::store::Role;

/// Effects to be executed after a transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a message to the conversation
    AppendMessage { role: Role, content: String },

    /// Mirror the cycle state into the store's typing flag
    SetTyping(bool),

    ReplaceFlights(Vec<Flight>),
    ReplaceRiskWarnings(Vec<RiskWarning>),

    /// Replace the plan and everything derived from it
    ReplaceTripPlan(TripPlan),

    SetTripPlanId(String),

    /// Reveal the planning panel
    ShowPanel,

    /// Send the user's text with the current trip plan id
    SendFrame { text: String },

    /// Start the response deadline for a cycle
    ArmTimeout { cycle: u64 },

    DisarmTimeout,
}

impl Effect {
    pub fn user_message(content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant_message(content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

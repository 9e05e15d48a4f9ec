//! Pure state transition function

use super::stream::{fallback_message, StreamBuffer};
use super::{CycleContext, CycleState, Effect, Event};
use crate::protocol::ServerFrame;
use thiserror::Error;

/// Reason recorded when the response deadline passes
const TIMEOUT_REASON: &str = "No response from the planner (timed out)";
const CONNECTION_LOST_REASON: &str = "Connection to the planner was lost";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: CycleState,
    pub effects: Vec<Effect>,
    /// The event did not apply to the current session or cycle and was dropped
    pub ignored: bool,
}

impl TransitionResult {
    pub fn new(state: CycleState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            ignored: false,
        }
    }

    pub fn ignored(state: &CycleState) -> Self {
        Self {
            new_state: state.clone(),
            effects: vec![],
            ignored: true,
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A response is still streaming; wait for it to finish before sending")]
    CycleInFlight,
    #[error("Message is empty")]
    EmptyMessage,
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    state: &CycleState,
    context: &CycleContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Commands
        // ============================================================

        // At most one outstanding stream per session
        (CycleState::Streaming { .. }, Event::UserSend { .. }) => {
            Err(TransitionError::CycleInFlight)
        }

        (CycleState::Idle, Event::UserSend { text, .. }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyMessage)
        }

        (CycleState::Idle, Event::UserSend { text, cycle }) => Ok(TransitionResult::new(
            CycleState::Streaming {
                cycle,
                buffer: StreamBuffer::new(),
            },
        )
        .with_effect(Effect::user_message(text.clone()))
        .with_effect(Effect::SetTyping(true))
        .with_effect(Effect::SendFrame { text })
        .with_effect(Effect::ArmTimeout { cycle })),

        (CycleState::Streaming { .. }, Event::Abandon) => Ok(TransitionResult::new(
            CycleState::Idle,
        )
        .with_effects([Effect::SetTyping(false), Effect::DisarmTimeout])),

        // ============================================================
        // Inbound frames
        // ============================================================

        // Frames from a superseded session are dropped whatever they carry
        (_, Event::Frame { session_id, .. }) if !context.is_current(&session_id) => {
            Ok(TransitionResult::ignored(state))
        }

        (_, Event::Frame { frame, .. }) => Ok(apply_frame(state, frame)),

        // ============================================================
        // Connection loss and timeouts
        // ============================================================
        (CycleState::Streaming { .. }, Event::ConnectionLost { session_id, reason })
            if context.is_current(&session_id) =>
        {
            Ok(fail_cycle(Some(
                reason.as_deref().unwrap_or(CONNECTION_LOST_REASON),
            )))
        }

        (
            CycleState::Streaming { cycle, .. },
            Event::ResponseTimeout {
                session_id,
                cycle: expired,
            },
        ) if context.is_current(&session_id) && *cycle == expired => {
            Ok(fail_cycle(Some(TIMEOUT_REASON)))
        }

        // Nothing open, or the loss/deadline belongs to an older session or cycle
        (CycleState::Idle, Event::Abandon)
        | (_, Event::ConnectionLost { .. } | Event::ResponseTimeout { .. }) => {
            Ok(TransitionResult::ignored(state))
        }
    }
}

fn apply_frame(state: &CycleState, frame: ServerFrame) -> TransitionResult {
    match (state, frame) {
        (CycleState::Streaming { cycle, buffer }, ServerFrame::Chunk { content }) => {
            let mut buffer = buffer.clone();
            buffer.append(&content);
            TransitionResult::new(CycleState::Streaming {
                cycle: *cycle,
                buffer,
            })
        }

        // Planning artifacts apply immediately, independent of the cycle
        (_, ServerFrame::FlightResults { data }) => TransitionResult::new(state.clone())
            .with_effects([Effect::ReplaceFlights(data), Effect::ShowPanel]),

        (_, ServerFrame::RiskWarnings { data }) => {
            TransitionResult::new(state.clone()).with_effect(Effect::ReplaceRiskWarnings(data))
        }

        (_, ServerFrame::TripPlan { data }) => TransitionResult::new(state.clone())
            .with_effects([Effect::ReplaceTripPlan(data), Effect::ShowPanel]),

        (
            CycleState::Streaming { buffer, .. },
            ServerFrame::Done {
                full_response,
                trip_plan_id,
                ..
            },
        ) => {
            let content = buffer.clone().finalize(full_response.as_deref());
            TransitionResult::new(CycleState::Idle)
                .with_effect(Effect::assistant_message(content))
                .with_effect(Effect::SetTyping(false))
                .with_effect(Effect::DisarmTimeout)
                .with_effects(trip_plan_id.map(Effect::SetTripPlanId))
        }

        // Late `done` after the cycle was already closed locally: keep the plan id only
        (
            CycleState::Idle,
            ServerFrame::Done {
                trip_plan_id: Some(id),
                ..
            },
        ) => TransitionResult::new(CycleState::Idle).with_effect(Effect::SetTripPlanId(id)),

        // No cycle to accumulate into or close
        (
            CycleState::Idle,
            ServerFrame::Chunk { .. } | ServerFrame::Done { .. } | ServerFrame::Error { .. },
        ) => TransitionResult::ignored(state),

        (CycleState::Streaming { .. }, ServerFrame::Error { content }) => {
            fail_cycle(content.as_deref())
        }
    }
}

/// Close the open cycle with a single fallback assistant message
fn fail_cycle(reason: Option<&str>) -> TransitionResult {
    TransitionResult::new(CycleState::Idle)
        .with_effect(Effect::assistant_message(fallback_message(reason)))
        .with_effect(Effect::SetTyping(false))
        .with_effect(Effect::DisarmTimeout)
}

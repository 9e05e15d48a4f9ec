//! Request-cycle state types

use super::stream::StreamBuffer;

/// Where the session is in its request/response cycle.
///
/// The [`StreamBuffer`] only exists inside `Streaming`, so there can never be
/// more than one per session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CycleState {
    /// No request outstanding
    #[default]
    Idle,

    /// A user message was sent and its `done`/`error` has not arrived yet
    Streaming { cycle: u64, buffer: StreamBuffer },
}

impl CycleState {
    /// Drives the store's `is_typing` flag
    pub fn is_streaming(&self) -> bool {
        matches!(self, CycleState::Streaming { .. })
    }

    pub fn cycle(&self) -> Option<u64> {
        match self {
            CycleState::Streaming { cycle, .. } => Some(*cycle),
            CycleState::Idle => None,
        }
    }
}

/// Context for transitions (the active session)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleContext {
    pub session_id: String,
}

impl CycleContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    pub fn is_current(&self, session_id: &str) -> bool {
        self.session_id == session_id
    }
}

//! Request-cycle state machine
//!
//! Implements the Elm Architecture pattern: a pure [`transition`] turns the
//! current [`CycleState`] and an inbound [`Event`] into a new state plus the
//! [`Effect`]s the session runtime must carry out against the store and the
//! transport.

mod effect;
pub mod event;
pub mod state;
pub mod stream;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{CycleContext, CycleState};
pub use stream::{fallback_message, StreamBuffer};
pub use transition::{transition, TransitionError, TransitionResult};

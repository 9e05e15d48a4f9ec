//! Events that drive the request cycle

use crate::protocol::ServerFrame;

#[derive(Debug, Clone)]
pub enum Event {
    // Command events
    UserSend {
        text: String,
        /// Identifier the runtime assigns to the new cycle
        cycle: u64,
    },
    /// Local cancellation (new trip, teardown). Nothing is sent to the server.
    Abandon,

    // Transport events
    Frame {
        /// Session the frame's connection was opened for
        session_id: String,
        frame: ServerFrame,
    },
    ConnectionLost {
        session_id: String,
        reason: Option<String>,
    },

    // Timer events
    ResponseTimeout {
        session_id: String,
        cycle: u64,
    },
}

//! Socket abstractions for the session transport
//!
//! These traits let the runtime be tested against a scripted server.

use super::TransportError;
use async_trait::async_trait;

/// Opens connections to the chat endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open bidirectional text channel
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame. `None` once the peer has closed.
    async fn recv_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Best-effort close; errors are not interesting at this point
    async fn close(&mut self);
}

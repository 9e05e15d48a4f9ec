//! Travel Guardian session client
//!
//! The real-time half of the trip-planning client: one chat socket per
//! session, a tagged frame decoder, the streaming accumulator and the
//! observable store the UI renders from.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod auth;
pub mod config;
pub mod db;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod store;
pub mod transport;

pub use auth::{AuthApi, AuthError, AuthSession, Credentials, HttpAuthApi, Registration, User};
pub use config::ClientConfig;
pub use db::{Database, KeyValueStore, MemoryStore};
pub use runtime::{CommandError, TripSession};
pub use store::{Message, Role, TripArtifacts, TripState, TripStore};
pub use transport::{ConnectionState, TransportError, WsConnector};

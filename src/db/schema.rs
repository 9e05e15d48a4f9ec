//! Local state schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS client_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Slot holding the active session id, restored on startup
pub const SESSION_ID_KEY: &str = "session_id";

/// Slot holding the bearer token from the last login
pub const TOKEN_KEY: &str = "token";

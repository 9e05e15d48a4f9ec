//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/api/v1/chat/ws";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 120;

/// Where the client connects and how long it waits for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Chat socket base; the session id is appended as a path segment
    pub ws_url: String,
    /// REST base for the auth routes
    pub api_url: String,
    pub state_path: PathBuf,
    /// `None` disables the response deadline
    pub response_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            state_path: default_state_path(None),
            response_timeout: Some(Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS)),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ws_url = lookup("GUARDIAN_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        let api_url = lookup("GUARDIAN_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let state_path = lookup("GUARDIAN_STATE_PATH")
            .map_or_else(|| default_state_path(lookup("HOME")), PathBuf::from);

        let timeout_secs = match lookup("GUARDIAN_RESPONSE_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid GUARDIAN_RESPONSE_TIMEOUT_SECS, using default");
                DEFAULT_RESPONSE_TIMEOUT_SECS
            }),
            None => DEFAULT_RESPONSE_TIMEOUT_SECS,
        };
        let response_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        Self {
            ws_url,
            api_url,
            state_path,
            response_timeout,
        }
    }
}

fn default_state_path(home: Option<String>) -> PathBuf {
    let home = home
        .or_else(|| std::env::var("HOME").ok())
        .unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".travel-guardian").join("state.db")
}

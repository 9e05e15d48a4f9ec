//! Session identity
//!
//! The session id addresses the chat socket and is the unit of rotation for
//! a new trip. It lives in the persisted `session_id` slot so a restart
//! resumes the same conversation.

use crate::db::{KeyValueStore, SESSION_ID_KEY, TOKEN_KEY};
use std::sync::Arc;

fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Owner of the active session identifier and the persisted auth token
pub struct SessionIdentity {
    store: Arc<dyn KeyValueStore>,
    current: String,
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl SessionIdentity {
    /// Restore the persisted id, or mint and persist a fresh one
    pub fn create(store: Arc<dyn KeyValueStore>) -> Self {
        let persisted = match store.get(SESSION_ID_KEY) {
            Ok(id) => id.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted session id");
                None
            }
        };

        let current = if let Some(id) = persisted {
            tracing::info!(session_id = %id, "Resuming session");
            id
        } else {
            let id = fresh_id();
            tracing::info!(session_id = %id, "Created session");
            persist(store.as_ref(), SESSION_ID_KEY, &id);
            id
        };

        Self { store, current }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Replace the active id with a fresh one and persist it.
    ///
    /// The new id is never equal to the one it replaces.
    pub fn rotate(&mut self) -> &str {
        let mut next = fresh_id();
        while next == self.current {
            next = fresh_id();
        }
        tracing::info!(previous = %self.current, session_id = %next, "Rotated session");
        persist(self.store.as_ref(), SESSION_ID_KEY, &next);
        self.current = next;
        &self.current
    }

    // ==================== Token slot ====================

    pub fn load_token(&self) -> Option<String> {
        match self.store.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted token");
                None
            }
        }
    }

    pub fn save_token(&self, token: &str) {
        persist(self.store.as_ref(), TOKEN_KEY, token);
    }

    pub fn clear_token(&self) {
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            tracing::warn!(error = %e, "Could not clear persisted token");
        }
    }
}

/// Persistence failures are logged; the in-memory value stays authoritative
fn persist(store: &dyn KeyValueStore, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        tracing::warn!(key, error = %e, "Could not persist client state");
    }
}

//! Session state attached to requests, and the store that persists it.
//!
//! The controller runtime only ever sees a [`Session`] value hanging off the
//! request. Loading and saving it between requests belongs to the transport,
//! which talks to a [`SessionStore`]. An in-memory store with cookie-based
//! session IDs is provided for the bundled HTTP adapter.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::transport::Params;

/// Session key holding the per-session CSRF seed.
pub const CSRF_SEED_KEY: &str = "csrf_token";

/// Name of the cookie carrying the session ID.
pub const SESSION_COOKIE: &str = "session_id";

/// Mutable key/value data for one browser session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    id: String,
    data: Params,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Params::new(),
        }
    }

    pub fn with_data(id: impl Into<String>, data: Params) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Params {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// The stored CSRF seed, if this session has been issued one.
    ///
    /// Numeric seeds are read back in their string form. Empty strings count
    /// as "no seed" so a blanked session starts over.
    pub fn csrf_seed(&self) -> Option<String> {
        match self.data.get(CSRF_SEED_KEY)? {
            JsonValue::String(seed) if !seed.is_empty() => Some(seed.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn set_csrf_seed(&mut self, seed: impl Into<String>) {
        self.data
            .insert(CSRF_SEED_KEY.to_string(), JsonValue::String(seed.into()));
    }
}

/// Persistence for sessions across requests.
///
/// Concurrent requests from the same session race on read-then-write; stores
/// that care must serialize `load`/`save` per ID themselves.
pub trait SessionStore: Send + Sync {
    /// Load a live session, or `None` if the ID is unknown or expired.
    fn load(&self, id: &str) -> Option<Session>;

    /// Create and persist a fresh, empty session.
    fn create(&self) -> Session;

    /// Persist the session's current data.
    fn save(&self, session: &Session);

    /// Forget a session entirely.
    fn destroy(&self, id: &str);

    /// Drop expired sessions, returning how many were removed.
    fn cleanup(&self) -> usize {
        0
    }
}

struct StoredSession {
    data: Params,
    last_accessed: Instant,
}

impl StoredSession {
    fn new(data: Params) -> Self {
        Self {
            data,
            last_accessed: Instant::now(),
        }
    }

    fn is_expired(&self, max_age: Duration) -> bool {
        self.last_accessed.elapsed() > max_age
    }
}

/// Thread-safe in-memory session store.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
    max_age: Duration,
}

impl InMemorySessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    /// Number of sessions currently held, expired or not.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, id: &str) -> Option<Session> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let expired = sessions.get(id)?.is_expired(self.max_age);
        if expired {
            sessions.remove(id);
            return None;
        }

        let stored = sessions.get_mut(id)?;
        stored.last_accessed = Instant::now();
        Some(Session::with_data(id, stored.data.clone()))
    }

    fn create(&self) -> Session {
        let id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), StoredSession::new(Params::new()));
        Session::new(id)
    }

    fn save(&self, session: &Session) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                session.id().to_string(),
                StoredSession::new(session.data().clone()),
            );
    }

    fn destroy(&self, id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn cleanup(&self) -> usize {
        let max_age = self.max_age;
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(max_age));
        before - sessions.len()
    }
}

/// Extract the session ID from a `Cookie` header.
pub fn extract_session_id_from_cookie(cookie_header: Option<&str>) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    cookie_header.and_then(|cookies| {
        cookies
            .split(';')
            .map(str::trim)
            .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// Build the `Set-Cookie` value for a session.
pub fn create_session_cookie(session_id: &str, max_age: Duration) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        max_age.as_secs()
    )
}

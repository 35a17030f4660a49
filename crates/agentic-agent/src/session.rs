//! In-memory sessions with event-sourced state.
//!
//! State is never written directly: callers append an [`Event`] whose
//! `state_delta` is merged into the session. Keys starting with `__` belong
//! to the SDK (captured request headers, tokens) and are hidden from the
//! agent-visible view returned by [`Session::agent_state`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::AgentError;

/// Snapshot of inbound HTTP headers, names lower-cased.
pub const HTTP_HEADERS_SESSION_KEY: &str = "__http_headers__";

/// Legacy `X-External-Token` value.
pub const EXTERNAL_TOKEN_SESSION_KEY: &str = "__external_token__";

const RESERVED_PREFIX: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state_delta: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub actions: EventActions,
}

impl Event {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            timestamp: Utc::now(),
            text: None,
            actions: EventActions::default(),
        }
    }

    /// A state-only event authored by the runtime itself.
    pub fn state_update(state_delta: Map<String, Value>) -> Self {
        let mut event = Self::new("system");
        event.actions.state_delta = state_delta;
        event
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: Map::new(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        }
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    /// State the agent is allowed to see.
    pub fn agent_state(&self) -> Map<String, Value> {
        self.state
            .iter()
            .filter(|(key, _)| !key.starts_with(RESERVED_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Captured inbound headers, keyed by lower-cased name.
    pub fn http_headers(&self) -> HashMap<String, String> {
        self.state
            .get(HTTP_HEADERS_SESSION_KEY)
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|v| (name.to_ascii_lowercase(), v.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a request has stored its header snapshot in this session.
    pub fn has_header_snapshot(&self) -> bool {
        self.state
            .get(HTTP_HEADERS_SESSION_KEY)
            .is_some_and(Value::is_object)
    }

    pub fn external_token(&self) -> Option<&str> {
        self.state
            .get(EXTERNAL_TOKEN_SESSION_KEY)
            .and_then(Value::as_str)
    }

    fn apply(&mut self, event: Event) {
        for (key, value) in &event.actions.state_delta {
            self.state.insert(key.clone(), value.clone());
        }
        self.last_update_time = event.timestamp;
        self.events.push(event);
    }
}

type SessionKey = (String, String, String);

/// Sessions keyed by `(app, user, session id)`, kept for the process lifetime.
#[derive(Clone, Default)]
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Session {
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session = Session::new(app_name, user_id, id.clone());

        self.sessions
            .write()
            .await
            .insert(key(app_name, user_id, &id), session.clone());
        session
    }

    pub async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(&key(app_name, user_id, session_id))
            .cloned()
    }

    pub async fn get_or_create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Session {
        if let Some(session) = self.get_session(app_name, user_id, session_id).await {
            return session;
        }
        self.create_session(app_name, user_id, Some(session_id)).await
    }

    /// Append an event and merge its state delta, both in the stored
    /// session and in the caller's copy.
    pub async fn append_event(
        &self,
        session: &mut Session,
        event: Event,
    ) -> Result<(), AgentError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key(&session.app_name, &session.user_id, &session.id))
            .ok_or_else(|| AgentError::SessionNotFound(session.id.clone()))?;

        stored.apply(event.clone());
        session.apply(event);
        Ok(())
    }

    pub async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        self.sessions
            .write()
            .await
            .remove(&key(app_name, user_id, session_id))
            .is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (
        app_name.to_string(),
        user_id.to_string(),
        session_id.to_string(),
    )
}

//! Session storage traits and types for conversational case sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier handed out by [`SessionStore::create`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier from a random 128-bit UUID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One recorded exchange: the user's message and the assistant's reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

impl Exchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// A conversational session tied to a case.
///
/// `interactions` always equals `conversation_history.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    /// Caller-supplied payload, shared and never mutated by the store.
    pub case_data: Arc<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub interactions: usize,
    pub conversation_history: Vec<Exchange>,
}

/// Lightweight view of a session used by [`SessionStore::list`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub interactions: usize,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            interactions: session.interactions,
        }
    }
}

/// Filter criteria for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Errors surfaced by session store operations. All of them are recoverable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("case data must not be null")]
    InvalidCaseData,
    #[error("session store is full ({max} sessions)")]
    CapacityExceeded { max: usize },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Storage for conversational sessions and their exchange history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session for `case_data` and return its identifier.
    async fn create(&self, case_data: serde_json::Value) -> SessionResult<SessionId>;

    /// Snapshot of a live session, or `None` if the id is unknown or expired.
    async fn get(&self, id: &SessionId) -> Option<Session>;

    /// Append one exchange. Returns the new interaction count.
    async fn update(
        &self,
        id: &SessionId,
        user_message: &str,
        assistant_response: &str,
    ) -> SessionResult<usize>;

    /// Delete a session. Returns whether anything was removed.
    async fn remove(&self, id: &SessionId) -> bool;

    /// List live sessions matching the filter, most recently active first.
    async fn list(&self, filter: &SessionFilter) -> Vec<SessionSummary>;

    /// Number of live sessions.
    async fn len(&self) -> usize;

    /// Drop every expired session. Returns how many were removed.
    async fn sweep_expired(&self) -> usize;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct_uuids() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn session_serializes_with_camel_case_contract() {
        let now = Utc::now();
        let session = Session {
            session_id: SessionId::from("s-1"),
            case_data: Arc::new(serde_json::json!({"topic": "fever case"})),
            created_at: now,
            last_activity: now,
            interactions: 1,
            conversation_history: vec![Exchange::new("How are you?", "I feel feverish.")],
        };

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["caseData"]["topic"], "fever case");
        assert_eq!(json["interactions"], 1);
        assert_eq!(json["conversationHistory"][0]["user"], "How are you?");
        assert_eq!(
            json["conversationHistory"][0]["assistant"],
            "I feel feverish."
        );
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn not_found_error_names_the_session() {
        let err = SessionError::NotFound(SessionId::from("missing"));
        assert_eq!(err.to_string(), "session not found: missing");
    }
}

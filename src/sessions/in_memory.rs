//! In-memory session store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{
    Exchange, Session, SessionError, SessionFilter, SessionId, SessionResult, SessionStore,
    SessionSummary,
};
use crate::config::{SessionOverflow, SessionsConfig};

/// An in-memory session store backed by a mutex-protected hash map.
///
/// Every operation holds the map lock for its full duration, so an update's
/// read-modify-append is indivisible with respect to other callers.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    ttl: Option<Duration>,
    max_sessions: Option<usize>,
    overflow: SessionOverflow,
}

impl InMemorySessionStore {
    /// Unbounded store without expiry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: None,
            max_sessions: None,
            overflow: SessionOverflow::default(),
        }
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        let ttl = (config.ttl_secs > 0)
            .then(|| Duration::from_std(std::time::Duration::from_secs(config.ttl_secs)).ok())
            .flatten();
        let max_sessions = (config.max_sessions > 0).then_some(config.max_sessions);
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions,
            overflow: config.overflow,
        }
    }

    /// Expire sessions idle for longer than `ttl`. A zero `ttl` disables expiry.
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = (!ttl.is_zero())
            .then(|| Duration::from_std(ttl).ok())
            .flatten();
        self
    }

    /// Bound the store to `max` live sessions, applying `overflow` when full.
    pub fn with_capacity_limit(mut self, max: usize, overflow: SessionOverflow) -> Self {
        self.max_sessions = (max > 0).then_some(max);
        self.overflow = overflow;
        self
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => session
                .last_activity
                .checked_add_signed(ttl)
                .is_some_and(|deadline| deadline <= now),
            None => false,
        }
    }

    fn purge_expired(
        &self,
        sessions: &mut HashMap<SessionId, Session>,
        now: DateTime<Utc>,
    ) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        before - sessions.len()
    }

    /// Make room for one more session, or fail under the `reject` policy.
    fn ensure_capacity(
        &self,
        sessions: &mut HashMap<SessionId, Session>,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        let Some(max) = self.max_sessions else {
            return Ok(());
        };
        if sessions.len() < max {
            return Ok(());
        }

        let purged = self.purge_expired(sessions, now);
        if purged > 0 {
            tracing::debug!(purged, "Purged expired sessions under capacity pressure");
        }

        while sessions.len() >= max {
            match self.overflow {
                SessionOverflow::Reject => return Err(SessionError::CapacityExceeded { max }),
                SessionOverflow::EvictIdle => {
                    let oldest = sessions
                        .values()
                        .min_by_key(|s| s.last_activity)
                        .map(|s| s.session_id.clone());
                    match oldest {
                        Some(id) => {
                            sessions.remove(&id);
                            tracing::info!(
                                session_id = %id,
                                max,
                                "Evicted least recently active session"
                            );
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, case_data: serde_json::Value) -> SessionResult<SessionId> {
        if case_data.is_null() {
            return Err(SessionError::InvalidCaseData);
        }

        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        self.ensure_capacity(&mut sessions, now)?;

        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        sessions.insert(
            id.clone(),
            Session {
                session_id: id.clone(),
                case_data: Arc::new(case_data),
                created_at: now,
                last_activity: now,
                interactions: 0,
                conversation_history: Vec::new(),
            },
        );
        tracing::debug!(session_id = %id, live = sessions.len(), "Session created");
        Ok(id)
    }

    async fn get(&self, id: &SessionId) -> Option<Session> {
        let sessions = self.sessions.lock();
        sessions
            .get(id)
            .filter(|s| !self.is_expired(s, Utc::now()))
            .cloned()
    }

    async fn update(
        &self,
        id: &SessionId,
        user_message: &str,
        assistant_response: &str,
    ) -> SessionResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(id) {
            Some(session) if !self.is_expired(session, now) => {
                session
                    .conversation_history
                    .push(Exchange::new(user_message, assistant_response));
                session.interactions += 1;
                session.last_activity = now;
                Ok(session.interactions)
            }
            _ => {
                tracing::debug!(session_id = %id, "Update for unknown or expired session");
                Err(SessionError::NotFound(id.clone()))
            }
        }
    }

    async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "Session removed");
        }
        removed
    }

    async fn list(&self, filter: &SessionFilter) -> Vec<SessionSummary> {
        let now = Utc::now();
        let sessions = self.sessions.lock();
        let mut results: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| !self.is_expired(s, now))
            .filter(|s| {
                if let Some(ref since) = filter.since {
                    if s.last_activity < *since {
                        return false;
                    }
                }
                true
            })
            .map(SessionSummary::from)
            .collect();

        results.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }

        results
    }

    async fn len(&self) -> usize {
        let now = Utc::now();
        let sessions = self.sessions.lock();
        sessions.values().filter(|s| !self.is_expired(s, now)).count()
    }

    async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        self.purge_expired(&mut sessions, Utc::now())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

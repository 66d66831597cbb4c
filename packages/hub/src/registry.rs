//! Registry of active sessions.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use fanout_core::SessionId;

use crate::router::TopicRouter;
use crate::session::{EnqueueError, Session};
use crate::stats::StatsCollector;

pub(crate) type SessionMap = HashMap<SessionId, Arc<Session>>;

/// Outcome of delivering one message to a set of sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Sessions whose queue accepted the message.
    pub delivered: usize,
    /// Sessions torn down because their queue was full or gone.
    pub evicted: Vec<SessionId>,
}

/// Owns the set of live sessions.
///
/// Lock order: whenever both the registry and the topic map are held, the
/// registry lock is taken first.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<SessionMap>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SessionMap> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionMap> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session and queue its welcome message.
    ///
    /// The welcome is queued before the session becomes visible, so it is
    /// always the first envelope the session receives. Returns `false` for a
    /// duplicate id or a session that was torn down before registration.
    pub fn register(
        &self,
        session: Arc<Session>,
        welcome: Option<Bytes>,
        stats: &StatsCollector,
    ) -> bool {
        let id = session.id();
        let mut sessions = self.write();

        if sessions.contains_key(&id) {
            tracing::warn!("Session {} already registered", id);
            return false;
        }
        if !session.activate() {
            tracing::debug!("Session {} {} before registration", id, session.state().as_str());
            return false;
        }
        if let Some(welcome) = welcome
            && let Err(e) = session.try_enqueue(welcome)
        {
            tracing::warn!("Session {}: Failed to queue welcome: {:?}", id, e);
        }

        let user_id = session.user_id().map(str::to_string);
        sessions.insert(id, session);
        stats.record_connection();
        tracing::info!(
            "Session {} registered for {:?}. Total sessions: {}",
            id,
            user_id,
            sessions.len()
        );
        true
    }

    /// Remove a session from the registry and from every topic.
    ///
    /// Both removals happen under the same registry write lock. The session's
    /// queue is then discarded. Unknown ids are ignored.
    pub fn unregister(&self, id: SessionId, router: &TopicRouter) -> Option<Arc<Session>> {
        let session = {
            let mut sessions = self.write();
            let session = sessions.remove(&id)?;
            router.strip(id);
            tracing::info!("Session {} unregistered. Total sessions: {}", id, sessions.len());
            session
        };
        session.begin_draining();
        Some(session)
    }

    /// Offer a message to every session without waiting.
    ///
    /// Sessions that cannot take it are unregistered after the pass.
    pub fn broadcast_all(&self, message: &Bytes, router: &TopicRouter) -> FanOut {
        let sessions: Vec<Arc<Session>> = self.read().values().cloned().collect();
        let mut outcome = FanOut::default();

        for session in sessions {
            match session.try_enqueue(message.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    if e == EnqueueError::Full {
                        tracing::warn!("Session {}: Outbound queue full, dropping session", session.id());
                    }
                    outcome.evicted.push(session.id());
                }
            }
        }

        outcome
            .evicted
            .retain(|id| self.unregister(*id, router).is_some());
        outcome
    }

    /// Get a session by ID.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.read().contains_key(&id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// List all active session IDs.
    pub fn ids(&self) -> Vec<SessionId> {
        self.read().keys().copied().collect()
    }
}

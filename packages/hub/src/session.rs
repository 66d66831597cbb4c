//! Per-session state shared between the hub and the session's loops.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fanout_core::{SessionId, Topic};
use tokio::sync::{mpsc, watch};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, registration not yet processed.
    Connecting,
    /// Registered and receiving envelopes.
    Active,
    /// Removed from the hub; the connection is being shut down.
    Draining,
    /// Connection closed.
    Closed,
}

impl SessionState {
    /// Check if the session is on its way out.
    pub fn is_terminating(&self) -> bool {
        matches!(self, SessionState::Draining | SessionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        }
    }
}

/// Why an enqueue attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbound queue is at capacity.
    Full,
    /// The outbound queue has been discarded.
    Closed,
}

/// A connected consumer of envelopes.
///
/// The hub owns sessions through its registry; topic subscriber sets only
/// hold weak references. The connection itself is owned by the session's
/// drain and read loops, never by this struct.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    user_id: Option<String>,
    /// Bounded outbound queue; `None` once discarded.
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    /// Subscribed topics in subscription order, without duplicates.
    topics: Mutex<Vec<Topic>>,
    last_activity: Mutex<DateTime<Utc>>,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// Create a session together with the consuming end of its outbound queue.
    pub fn new(
        id: SessionId,
        user_id: Option<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (state, _) = watch::channel(SessionState::Connecting);
        let session = Self {
            id,
            user_id: user_id.filter(|u| !u.is_empty()),
            outbound: Mutex::new(Some(tx)),
            topics: Mutex::new(Vec::new()),
            last_activity: Mutex::new(Utc::now()),
            state,
        };
        (Arc::new(session), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Push an encoded envelope without waiting.
    pub(crate) fn try_enqueue(&self, message: Bytes) -> Result<(), EnqueueError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = outbound.as_ref().ok_or(EnqueueError::Closed)?;
        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Subscribed topics in subscription order.
    pub fn topics(&self) -> Vec<Topic> {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a topic; returns `false` if it was already present.
    pub(crate) fn add_topic(&self, topic: Topic) -> bool {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if topics.contains(&topic) {
            return false;
        }
        topics.push(topic);
        true
    }

    /// Drop the first occurrence of a topic; returns `false` if absent.
    pub(crate) fn remove_topic(&self, topic: Topic) -> bool {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        match topics.iter().position(|t| *t == topic) {
            Some(idx) => {
                topics.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Update the last-activity timestamp.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// `Connecting -> Active`. Returns `false` if the session already left `Connecting`.
    pub(crate) fn activate(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        })
    }

    /// Enter `Draining` and discard whatever is still queued.
    pub(crate) fn begin_draining(&self) {
        self.state.send_if_modified(|state| {
            if state.is_terminating() {
                false
            } else {
                *state = SessionState::Draining;
                true
            }
        });
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Mark the connection as closed.
    pub(crate) fn mark_closed(&self) {
        self.state.send_replace(SessionState::Closed);
    }
}

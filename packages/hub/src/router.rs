//! Topic subscriptions and topic-scoped fan-out.
//!
//! Topic operations run on the caller's task and synchronize through the
//! topic map's own lock; they do not pass through the scheduler, so a topic
//! publish is not ordered relative to global broadcasts or registrations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use bytes::Bytes;
use fanout_core::{SessionId, Topic};

use crate::error::{HubError, Result};
use crate::registry::{ConnectionRegistry, FanOut};
use crate::session::{EnqueueError, Session};

pub(crate) type SubscriberMap = HashMap<Topic, HashMap<SessionId, Weak<Session>>>;

/// Maps each topic to the sessions subscribed to it.
///
/// Membership only; session lifetime belongs to the registry.
#[derive(Debug, Default)]
pub struct TopicRouter {
    topics: RwLock<SubscriberMap>,
}

impl TopicRouter {
    /// Create a router with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SubscriberMap> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SubscriberMap> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe an active session to a topic.
    ///
    /// Returns `Ok(false)` if it was already subscribed. The registry read
    /// lock is held throughout so the session cannot be unregistered halfway.
    pub fn subscribe(
        &self,
        registry: &ConnectionRegistry,
        id: SessionId,
        topic: Topic,
    ) -> Result<bool> {
        let sessions = registry.read();
        let session = sessions.get(&id).ok_or(HubError::SessionNotFound(id))?;

        let mut topics = self.write();
        let added = topics
            .entry(topic)
            .or_default()
            .insert(id, Arc::downgrade(session))
            .is_none();
        session.add_topic(topic);

        tracing::debug!("Session {} subscribed to {}", id, topic);
        Ok(added)
    }

    /// Remove a session from a topic. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SessionId, topic: Topic) -> bool {
        let mut topics = self.write();
        let Some(subscribers) = topics.get_mut(&topic) else {
            return false;
        };
        let Some(session) = subscribers.remove(&id) else {
            return false;
        };
        if subscribers.is_empty() {
            topics.remove(&topic);
        }
        if let Some(session) = session.upgrade() {
            session.remove_topic(topic);
        }

        tracing::debug!("Session {} unsubscribed from {}", id, topic);
        true
    }

    /// Drop a session from every topic.
    pub(crate) fn strip(&self, id: SessionId) {
        self.write().retain(|_, subscribers| {
            subscribers.remove(&id);
            !subscribers.is_empty()
        });
    }

    /// Offer an encoded message to every subscriber of a topic without waiting.
    ///
    /// Subscribers whose queue is full are unregistered.
    pub fn broadcast(&self, topic: Topic, message: &Bytes, registry: &ConnectionRegistry) -> FanOut {
        let subscribers: Vec<Arc<Session>> = match self.read().get(&topic) {
            Some(subscribers) => subscribers.values().filter_map(Weak::upgrade).collect(),
            None => return FanOut::default(),
        };

        let mut outcome = FanOut::default();
        for session in subscribers {
            match session.try_enqueue(message.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    if e == EnqueueError::Full {
                        tracing::warn!("Session {}: not keeping up with {}, dropping session", session.id(), topic);
                    }
                    outcome.evicted.push(session.id());
                }
            }
        }

        outcome
            .evicted
            .retain(|id| registry.unregister(*id, self).is_some());
        outcome
    }

    /// Number of sessions subscribed to a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.read().get(&topic).map_or(0, HashMap::len)
    }

    pub fn is_subscribed(&self, id: SessionId, topic: Topic) -> bool {
        self.read()
            .get(&topic)
            .is_some_and(|subscribers| subscribers.contains_key(&id))
    }

    /// Topics with at least one subscriber.
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .read()
            .iter()
            .filter(|(_, subscribers)| !subscribers.is_empty())
            .map(|(topic, _)| *topic)
            .collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsCollector;

    fn registered(registry: &ConnectionRegistry, capacity: usize) -> (Arc<Session>, tokio::sync::mpsc::Receiver<Bytes>) {
        let (session, rx) = Session::new(SessionId::new(), None, capacity);
        registry.register(session.clone(), None, &StatsCollector::new());
        (session, rx)
    }

    #[test]
    fn test_subscribe_twice_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let router = TopicRouter::new();
        let (session, _rx) = registered(&registry, 4);

        assert!(router.subscribe(&registry, session.id(), Topic::Jobs).unwrap());
        assert!(!router.subscribe(&registry, session.id(), Topic::Jobs).unwrap());
        assert_eq!(router.subscriber_count(Topic::Jobs), 1);
        assert_eq!(session.topics(), vec![Topic::Jobs]);
    }

    #[test]
    fn test_subscribe_requires_registration() {
        let registry = ConnectionRegistry::new();
        let router = TopicRouter::new();
        let id = SessionId::new();

        let err = router.subscribe(&registry, id, Topic::Jobs).unwrap_err();
        assert!(matches!(err, HubError::SessionNotFound(missing) if missing == id));
        assert_eq!(router.subscriber_count(Topic::Jobs), 0);
    }

    #[test]
    fn test_unsubscribe_prunes_empty_topics() {
        let registry = ConnectionRegistry::new();
        let router = TopicRouter::new();
        let (session, _rx) = registered(&registry, 4);

        router.subscribe(&registry, session.id(), Topic::Jobs).unwrap();
        router.subscribe(&registry, session.id(), Topic::Masters).unwrap();
        assert_eq!(router.active_topics(), vec![Topic::Jobs, Topic::Masters]);

        assert!(router.unsubscribe(session.id(), Topic::Jobs));
        assert!(!router.unsubscribe(session.id(), Topic::Jobs));
        assert_eq!(router.active_topics(), vec![Topic::Masters]);
        assert_eq!(session.topics(), vec![Topic::Masters]);
    }

    #[test]
    fn test_broadcast_reaches_only_subscribers() {
        let registry = ConnectionRegistry::new();
        let router = TopicRouter::new();
        let (subscriber, mut subscriber_rx) = registered(&registry, 4);
        let (_other, mut other_rx) = registered(&registry, 4);

        router.subscribe(&registry, subscriber.id(), Topic::Health).unwrap();
        let outcome = router.broadcast(Topic::Health, &Bytes::from_static(b"health"), &registry);

        assert_eq!(outcome.delivered, 1);
        assert!(outcome.evicted.is_empty());
        assert_eq!(subscriber_rx.try_recv().unwrap(), Bytes::from_static(b"health"));
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_evicts_overflowing_subscriber() {
        let registry = ConnectionRegistry::new();
        let router = TopicRouter::new();
        let (session, _rx) = registered(&registry, 1);
        router.subscribe(&registry, session.id(), Topic::Jobs).unwrap();

        let first = router.broadcast(Topic::Jobs, &Bytes::from_static(b"1"), &registry);
        assert_eq!(first.delivered, 1);

        let second = router.broadcast(Topic::Jobs, &Bytes::from_static(b"2"), &registry);
        assert_eq!(second.evicted, vec![session.id()]);
        assert!(!registry.contains(session.id()));
        assert!(!router.is_subscribed(session.id(), Topic::Jobs));

        let third = router.broadcast(Topic::Jobs, &Bytes::from_static(b"3"), &registry);
        assert_eq!(third, FanOut::default());
    }
}

//! The hub facade handed to transports and publishers.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use fanout_core::{
    message_types, Envelope, HealthStatus, HubStats, JobInfo, MasterInfo, SessionId, Topic,
    WorkerInfo,
};
use ractor::{Actor, ActorRef, ActorStatus, RpcReplyPort};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::HubConfig;
use crate::connection::Connection;
use crate::error::{HubError, Result};
use crate::messages::SchedulerMessage;
use crate::registry::{ConnectionRegistry, FanOut};
use crate::router::TopicRouter;
use crate::scheduler::BroadcastScheduler;
use crate::session::Session;
use crate::stats::StatsCollector;
use crate::worker::{self, Keepalive};

/// Features announced to every new session.
const FEATURES: [&str; 7] = [
    "realtime_updates",
    "metrics",
    "jobs",
    "workers",
    "masters",
    "health",
    "performance",
];

/// State shared by the hub handles and the scheduler.
#[derive(Debug)]
pub struct HubShared {
    pub(crate) config: HubConfig,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) router: TopicRouter,
    pub(crate) stats: StatsCollector,
    lifecycle_gate: Arc<Semaphore>,
    broadcast_gate: Arc<Semaphore>,
}

impl HubShared {
    fn new(config: HubConfig) -> Self {
        Self {
            lifecycle_gate: Arc::new(Semaphore::new(config.lifecycle_capacity)),
            broadcast_gate: Arc::new(Semaphore::new(config.broadcast_capacity)),
            config,
            registry: ConnectionRegistry::new(),
            router: TopicRouter::new(),
            stats: StatsCollector::new(),
        }
    }

    fn welcome(&self, session: &Session) -> Option<Bytes> {
        let envelope = Envelope::new(
            message_types::WELCOME,
            json!({
                "service": self.config.service_name,
                "message": format!("Connected to {}", self.config.service_name),
                "version": self.config.version,
                "session_id": session.id(),
                "features": FEATURES,
            }),
        );
        match envelope.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::error!("Session {}: Failed to encode welcome: {}", session.id(), e);
                self.stats.record_error();
                None
            }
        }
    }

    pub(crate) fn register(&self, session: Arc<Session>) -> bool {
        let welcome = self.welcome(&session);
        self.registry.register(session, welcome, &self.stats)
    }

    pub(crate) fn unregister(&self, id: SessionId) -> bool {
        self.registry.unregister(id, &self.router).is_some()
    }

    pub(crate) fn broadcast_all(&self, message: &Bytes) -> FanOut {
        self.registry.broadcast_all(message, &self.router)
    }
}

/// Handle to a running hub.
///
/// Cheap to clone; every clone talks to the same scheduler and registry.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<HubShared>,
    scheduler: ActorRef<SchedulerMessage>,
}

/// Non-owning handle used by session loops to reach their hub.
#[derive(Clone)]
pub struct WeakHub {
    shared: Weak<HubShared>,
    scheduler: ActorRef<SchedulerMessage>,
}

impl WeakHub {
    /// Get a strong handle if the hub is still alive.
    pub fn upgrade(&self) -> Option<Hub> {
        Some(Hub {
            shared: self.shared.upgrade()?,
            scheduler: self.scheduler.clone(),
        })
    }
}

impl Hub {
    /// Validate the configuration and spawn the broadcast scheduler.
    ///
    /// The returned join handle completes once the scheduler has stopped.
    pub async fn start(config: HubConfig) -> Result<(Self, JoinHandle<()>)> {
        config.validate()?;
        let shared = Arc::new(HubShared::new(config));

        let (scheduler, handle) = Actor::spawn(None, BroadcastScheduler, shared.clone())
            .await
            .map_err(|e| HubError::Spawn(e.to_string()))?;

        tracing::info!(
            "Hub started (outbound capacity {}, broadcast capacity {})",
            shared.config.outbound_capacity,
            shared.config.broadcast_capacity
        );
        Ok((Self { shared, scheduler }, handle))
    }

    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Whether the scheduler is still accepting work.
    pub fn is_running(&self) -> bool {
        matches!(self.scheduler.get_status(), ActorStatus::Running)
    }

    pub fn downgrade(&self) -> WeakHub {
        WeakHub {
            shared: Arc::downgrade(&self.shared),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Submit a lifecycle request and wait for the scheduler's answer.
    ///
    /// Waiting for room and waiting for the reply share one `submit_timeout`
    /// deadline; running past it yields `RegistryBusy`.
    async fn submit<T>(
        &self,
        build: impl FnOnce(OwnedSemaphorePermit, RpcReplyPort<T>) -> SchedulerMessage,
    ) -> Result<T>
    where
        T: Send + 'static,
    {
        let timeout = self.shared.config.submit_timeout;
        let deadline = Instant::now() + timeout;
        let permit = time::timeout_at(deadline, self.shared.lifecycle_gate.clone().acquire_owned())
            .await
            .map_err(|_| HubError::RegistryBusy(timeout))?
            .map_err(|_| HubError::SchedulerUnavailable)?;

        let (tx, rx) = ractor::concurrency::oneshot();
        self.scheduler
            .send_message(build(permit, tx.into()))
            .map_err(|_| HubError::SchedulerUnavailable)?;
        time::timeout_at(deadline, rx)
            .await
            .map_err(|_| HubError::RegistryBusy(timeout))?
            .map_err(|_| HubError::SchedulerUnavailable)
    }

    /// Attach a connection as a new session.
    ///
    /// The session's loops are running before registration is submitted, so
    /// a connection that dies early is torn down either way. The session
    /// starts receiving envelopes, beginning with the welcome, once the
    /// scheduler has processed the registration.
    pub async fn connect<C: Connection>(&self, connection: C, user_id: Option<String>) -> Result<SessionId> {
        let (session, outbound) =
            Session::new(SessionId::new(), user_id, self.shared.config.outbound_capacity);
        let id = session.id();

        worker::spawn(
            self.downgrade(),
            session.clone(),
            outbound,
            connection,
            Keepalive::from(&self.shared.config),
        );

        let registering = session.clone();
        let result = self
            .submit(|permit, reply| SchedulerMessage::Register {
                session: registering,
                permit,
                reply,
            })
            .await;

        match result {
            Ok(true) => Ok(id),
            Ok(false) => {
                session.begin_draining();
                Err(HubError::SessionClosed(id))
            }
            Err(e) => {
                tracing::warn!("Session {}: Registration failed: {}", id, e);
                // The scheduler may still get to the request; a draining
                // session is refused, and one that slipped in is removed.
                session.begin_draining();
                self.force_unregister(id);
                Err(e)
            }
        }
    }

    /// Remove a session through the scheduler. Unknown ids are ignored.
    pub async fn unregister(&self, id: SessionId) -> Result<()> {
        self.submit(|permit, reply| SchedulerMessage::Unregister {
            session_id: id,
            permit,
            reply,
        })
        .await?;
        Ok(())
    }

    /// Remove a session immediately on the caller's task.
    ///
    /// Used for slow-consumer eviction and when the scheduler cannot take
    /// the request. Returns `false` if the session was already gone.
    pub fn force_unregister(&self, id: SessionId) -> bool {
        self.shared.unregister(id)
    }

    pub fn subscribe(&self, id: SessionId, topic: Topic) -> Result<bool> {
        self.shared
            .router
            .subscribe(&self.shared.registry, id, topic)
    }

    pub fn unsubscribe(&self, id: SessionId, topic: Topic) -> bool {
        self.shared.router.unsubscribe(id, topic)
    }

    /// Look up an active session.
    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.shared.registry.get(id)
    }

    /// Topics a session is subscribed to, in subscription order.
    pub fn session_topics(&self, id: SessionId) -> Option<Vec<Topic>> {
        self.shared.registry.get(id).map(|session| session.topics())
    }

    pub fn is_subscribed(&self, id: SessionId, topic: Topic) -> bool {
        self.shared.router.is_subscribed(id, topic)
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.shared.router.subscriber_count(topic)
    }

    /// Topics with at least one subscriber, sorted.
    pub fn active_topics(&self) -> Vec<Topic> {
        self.shared.router.active_topics()
    }

    /// Whether a session is currently registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.shared.registry.contains(id)
    }

    pub fn session_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Snapshot of the hub counters.
    pub fn stats(&self) -> HubStats {
        let sessions = self.shared.registry.read();
        let topics = self.shared.router.read();
        let topics_count = topics.values().filter(|s| !s.is_empty()).count();
        self.shared.stats.snapshot(sessions.len(), topics_count)
    }

    /// Queue an envelope for a single session.
    pub fn send_to_session<T: Serialize>(&self, id: SessionId, envelope: &Envelope<T>) -> Result<()> {
        let session = self
            .shared
            .registry
            .get(id)
            .ok_or(HubError::SessionNotFound(id))?;
        let message = envelope.encode().inspect_err(|e| {
            tracing::error!("Session {}: Failed to encode {}: {}", id, envelope.kind, e);
            self.shared.stats.record_error();
        })?;

        if let Err(e) = session.try_enqueue(message) {
            tracing::warn!("Session {}: Failed to queue reply ({:?}), dropping session", id, e);
            self.force_unregister(id);
        }
        Ok(())
    }

    /// Send an envelope to every active session.
    ///
    /// Returns `false` if the envelope could not be encoded or the broadcast
    /// backlog was full; dropped broadcasts are not counted.
    pub fn broadcast_envelope<T: Serialize>(&self, envelope: &Envelope<T>) -> bool {
        match envelope.encode() {
            Ok(message) => self.submit_broadcast(message),
            Err(e) => {
                tracing::error!("Failed to encode broadcast {}: {}", envelope.kind, e);
                self.shared.stats.record_error();
                false
            }
        }
    }

    pub fn broadcast<T: Serialize>(&self, kind: &str, data: T) -> bool {
        self.broadcast_envelope(&Envelope::new(kind, data))
    }

    /// Broadcast with `source` and `version` metadata attached.
    pub fn broadcast_realtime_update<T: Serialize>(&self, kind: &str, data: T) -> bool {
        let envelope = Envelope::new(kind, data)
            .with_metadata("source", self.shared.config.service_name.clone())
            .with_metadata("version", self.shared.config.version.clone());
        self.broadcast_envelope(&envelope)
    }

    fn submit_broadcast(&self, message: Bytes) -> bool {
        let Ok(permit) = self.shared.broadcast_gate.clone().try_acquire_owned() else {
            tracing::warn!("Broadcast backlog full, dropping message");
            return false;
        };
        if self
            .scheduler
            .send_message(SchedulerMessage::Broadcast { message, permit })
            .is_err()
        {
            tracing::warn!("Broadcast scheduler unavailable, dropping message");
            return false;
        }
        self.shared.stats.record_message();
        true
    }

    /// Send an envelope to the subscribers of one topic, on the caller's task.
    ///
    /// An envelope that cannot be encoded is counted as an error and
    /// delivered to no one.
    pub fn broadcast_to_topic<T: Serialize>(&self, topic: Topic, envelope: &Envelope<T>) -> FanOut {
        let message = match envelope.encode() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to encode {} for {}: {}", envelope.kind, topic, e);
                self.shared.stats.record_error();
                return FanOut::default();
            }
        };

        let outcome = self
            .shared
            .router
            .broadcast(topic, &message, &self.shared.registry);
        tracing::debug!(
            "Update on {} delivered to {} sessions, {} dropped",
            topic,
            outcome.delivered,
            outcome.evicted.len()
        );
        outcome
    }

    fn publish<T: Serialize>(&self, topic: Topic, data: T) {
        self.broadcast_to_topic(topic, &Envelope::new(topic.update_type(), data));
    }

    pub fn publish_metrics(&self, metrics: &Map<String, Value>) {
        self.publish(Topic::Metrics, metrics);
    }

    pub fn publish_jobs(&self, jobs: &[JobInfo]) {
        self.publish(Topic::Jobs, jobs);
    }

    pub fn publish_workers(&self, workers: &[WorkerInfo]) {
        self.publish(Topic::Workers, workers);
    }

    pub fn publish_masters(&self, masters: &[MasterInfo]) {
        self.publish(Topic::Masters, masters);
    }

    pub fn publish_health(&self, health: &HealthStatus) {
        self.publish(Topic::Health, health);
    }

    pub fn publish_performance(&self, performance: &Map<String, Value>) {
        self.publish(Topic::Performance, performance);
    }

    /// Unregister every session and stop the scheduler.
    ///
    /// Returns the number of sessions that were closed.
    pub async fn shutdown(&self) -> Result<usize> {
        let closed = self
            .submit(|permit, reply| SchedulerMessage::Shutdown { permit, reply })
            .await?;
        tracing::info!("Hub shut down, closed {} sessions", closed);
        Ok(closed)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::error::Error;
    use std::future::Future;
    use std::time::Duration;

    use ractor::ActorProcessingErr;

    use super::*;
    use crate::connection::{memory_pair, Frame, FrameReader, FrameWriter};
    use crate::error::ConnectionError;

    fn busy_config() -> HubConfig {
        HubConfig::default()
            .with_lifecycle_capacity(2)
            .with_submit_timeout(Duration::from_secs(1))
    }

    /// Hold every lifecycle permit so no request is admitted.
    async fn saturate(hub: &Hub) -> std::result::Result<OwnedSemaphorePermit, Box<dyn Error>> {
        let capacity = u32::try_from(hub.shared.config.lifecycle_capacity)?;
        Ok(hub.shared.lifecycle_gate.clone().acquire_many_owned(capacity).await?)
    }

    /// Accepts requests and never answers them.
    struct SilentScheduler;

    impl Actor for SilentScheduler {
        type Msg = SchedulerMessage;
        type State = Vec<SchedulerMessage>;
        type Arguments = ();

        async fn pre_start(
            &self,
            _myself: ActorRef<Self::Msg>,
            _args: Self::Arguments,
        ) -> std::result::Result<Self::State, ActorProcessingErr> {
            Ok(Vec::new())
        }

        async fn handle(
            &self,
            _myself: ActorRef<Self::Msg>,
            message: Self::Msg,
            state: &mut Self::State,
        ) -> std::result::Result<(), ActorProcessingErr> {
            state.push(message);
            Ok(())
        }
    }

    struct StalledConnection;

    struct StalledWriter;

    struct StalledReader;

    impl Connection for StalledConnection {
        type Writer = StalledWriter;
        type Reader = StalledReader;

        fn split(self) -> (Self::Writer, Self::Reader) {
            (StalledWriter, StalledReader)
        }
    }

    impl FrameWriter for StalledWriter {
        fn send(&mut self, _frame: Frame) -> impl Future<Output = std::result::Result<(), ConnectionError>> + Send {
            std::future::pending()
        }

        fn close(&mut self) -> impl Future<Output = std::result::Result<(), ConnectionError>> + Send {
            std::future::ready(Ok(()))
        }
    }

    impl FrameReader for StalledReader {
        fn recv(&mut self) -> impl Future<Output = Option<std::result::Result<Frame, ConnectionError>>> + Send {
            std::future::pending()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_gate_reports_busy() -> std::result::Result<(), Box<dyn Error>> {
        let (hub, _scheduler) = Hub::start(busy_config()).await?;
        let (conn, _peer) = memory_pair();
        let id = hub.connect(conn, None).await?;
        let _held = saturate(&hub).await?;

        let started = Instant::now();
        let (conn, mut refused_peer) = memory_pair();
        match hub.connect(conn, None).await {
            Err(HubError::RegistryBusy(waited)) => assert_eq!(waited, Duration::from_secs(1)),
            other => panic!("expected RegistryBusy, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_secs(1));
        // The refused session's connection is closed rather than left dangling.
        assert_eq!(refused_peer.next_message().await, None);

        assert!(matches!(hub.unregister(id).await, Err(HubError::RegistryBusy(_))));
        assert!(hub.contains(id));
        assert_eq!(hub.session_count(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_registration_times_out() -> std::result::Result<(), Box<dyn Error>> {
        let shared = Arc::new(HubShared::new(busy_config()));
        let (scheduler, _handle) = Actor::spawn(None, SilentScheduler, ()).await?;
        let hub = Hub { shared, scheduler };

        let (conn, mut peer) = memory_pair();
        let started = Instant::now();
        assert!(matches!(
            hub.connect(conn, None).await,
            Err(HubError::RegistryBusy(_))
        ));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(hub.session_count(), 0);
        assert_eq!(peer.next_message().await, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_removes_directly_when_scheduler_is_busy() -> std::result::Result<(), Box<dyn Error>> {
        let config = busy_config().with_write_wait(Duration::from_secs(2));
        let (hub, _scheduler) = Hub::start(config).await?;
        let id = hub.connect(StalledConnection, None).await?;
        hub.subscribe(id, Topic::Jobs)?;
        let _held = saturate(&hub).await?;
        assert!(hub.contains(id));

        // The welcome write times out, the scheduler cannot take the
        // unregister, and the session is removed on the worker's task.
        time::sleep(Duration::from_secs(5)).await;
        assert!(!hub.contains(id));
        assert_eq!(hub.subscriber_count(Topic::Jobs), 0);
        assert_eq!(hub.stats().active_connections, 0);
        Ok(())
    }
}

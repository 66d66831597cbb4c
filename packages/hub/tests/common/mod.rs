#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use hub::{
    memory_pair, Connection, ConnectionError, Frame, FrameReader, FrameWriter, Hub, HubConfig,
    HubError, JobInfo, MemoryPeer, SessionId,
};

/// Config with small queues; keepalive timings stay at their defaults.
pub fn test_config() -> HubConfig {
    HubConfig::default()
        .with_outbound_capacity(8)
        .with_service_name("test-dashboard")
}

pub async fn start_hub(config: HubConfig) -> Result<Hub, HubError> {
    let (hub, _scheduler) = Hub::start(config).await?;
    Ok(hub)
}

/// Connect an in-memory peer and consume its welcome message.
pub async fn connect_peer(hub: &Hub, user: &str) -> Result<(SessionId, MemoryPeer), Box<dyn Error>> {
    let (conn, mut peer) = memory_pair();
    let id = hub.connect(conn, Some(user.to_string())).await?;
    let welcome = peer.next_message().await.ok_or("connection closed before welcome")?;
    assert_eq!(welcome["type"], "welcome");
    Ok((id, peer))
}

/// Poll a condition until it holds, giving background loops time to run.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn sample_jobs() -> Vec<JobInfo> {
    vec![
        JobInfo {
            id: "job-1".to_string(),
            status: "running".to_string(),
            phase: "map".to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 1500,
            map_tasks: 8,
            reduce_tasks: 2,
            progress: 0.25,
        },
        JobInfo {
            id: "job-2".to_string(),
            status: "completed".to_string(),
            phase: "done".to_string(),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            duration_ms: 42_000,
            map_tasks: 4,
            reduce_tasks: 1,
            progress: 1.0,
        },
    ]
}

/// A connection whose writes never complete and whose reads never arrive.
pub struct StalledConnection;

pub struct StalledWriter;

pub struct StalledReader;

impl Connection for StalledConnection {
    type Writer = StalledWriter;
    type Reader = StalledReader;

    fn split(self) -> (Self::Writer, Self::Reader) {
        (StalledWriter, StalledReader)
    }
}

impl FrameWriter for StalledWriter {
    fn send(&mut self, _frame: Frame) -> impl Future<Output = Result<(), ConnectionError>> + Send {
        std::future::pending()
    }

    fn close(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send {
        std::future::ready(Ok(()))
    }
}

impl FrameReader for StalledReader {
    fn recv(&mut self) -> impl Future<Output = Option<Result<Frame, ConnectionError>>> + Send {
        std::future::pending()
    }
}

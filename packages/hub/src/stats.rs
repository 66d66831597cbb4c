//! Hub counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use fanout_core::HubStats;
use tokio::time::Instant;

/// Lifetime counters plus the instant the hub was started.
///
/// Snapshots are assembled by the hub while it holds the registry and topic
/// read locks; lifetime registrations are only counted under the registry
/// write lock, so a snapshot never reports more active than total sessions.
#[derive(Debug)]
pub struct StatsCollector {
    started: Instant,
    started_at: DateTime<Utc>,
    total_connections: AtomicU64,
    message_count: AtomicU64,
    error_count: AtomicU64,
}

impl StatsCollector {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            total_connections: AtomicU64::new(0),
            message_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Build a snapshot from the counters and the given gauges.
    pub(crate) fn snapshot(&self, active_connections: usize, topics_count: usize) -> HubStats {
        HubStats {
            active_connections: active_connections as u64,
            total_connections: self.total_connections.load(Ordering::Relaxed),
            message_count: self.message_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            topics_count: topics_count as u64,
            uptime_secs: self.started.elapsed().as_secs(),
            started_at: self.started_at,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = StatsCollector::new();
        stats.record_connection();
        stats.record_connection();
        stats.record_message();
        stats.record_error();

        let snapshot = stats.snapshot(1, 3);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.message_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.topics_count, 3);
        assert_eq!(snapshot.closed_connections(), 1);
        assert_eq!(snapshot.started_at, stats.started_at);
    }
}

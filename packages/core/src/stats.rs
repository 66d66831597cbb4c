//! Hub statistics snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the hub's counters.
///
/// All fields come from a single consistent read of the hub state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Sessions currently registered.
    pub active_connections: u64,
    /// Sessions ever registered.
    pub total_connections: u64,
    /// Global broadcasts accepted for delivery.
    pub message_count: u64,
    /// Encoding and broadcast failures.
    pub error_count: u64,
    /// Topics with at least one subscriber.
    pub topics_count: u64,
    /// Seconds since the hub was started.
    pub uptime_secs: u64,
    /// When the hub was started.
    pub started_at: DateTime<Utc>,
}

impl HubStats {
    /// Sessions that have disconnected since start.
    pub fn closed_connections(&self) -> u64 {
        self.total_connections.saturating_sub(self.active_connections)
    }
}

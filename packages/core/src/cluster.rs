//! Payloads published by the cluster's job/worker/master subsystem.
//!
//! The hub treats these as opaque: they are serialized into the `data`
//! field of the matching `*_update` envelope and never inspected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one MapReduce job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub status: String,
    /// Current phase, e.g. `map`, `reduce`, `done`.
    pub phase: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub map_tasks: u32,
    pub reduce_tasks: u32,
    /// Completion ratio in `0.0..=1.0`.
    pub progress: f64,
}

/// Snapshot of one worker as seen by the masters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub status: String,
    pub last_seen: DateTime<Utc>,
    pub tasks_done: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

/// Snapshot of one master node and its consensus role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterInfo {
    pub id: String,
    pub role: String,
    pub state: String,
    pub leader: bool,
    pub last_seen: DateTime<Utc>,
}

/// Health level of the system or of a single check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of a single health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
    pub last_checked: DateTime<Utc>,
}

/// Aggregated health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckResult>,
    pub version: String,
    pub uptime_secs: u64,
}

impl HealthStatus {
    /// Build a report that is unhealthy as soon as any check is not healthy.
    pub fn from_checks(
        version: impl Into<String>,
        uptime_secs: u64,
        checks: BTreeMap<String, CheckResult>,
    ) -> Self {
        let status = if checks.values().any(|c| c.status != HealthState::Healthy) {
            HealthState::Unhealthy
        } else {
            HealthState::Healthy
        };
        Self {
            status,
            timestamp: Utc::now(),
            checks,
            version: version.into(),
            uptime_secs,
        }
    }
}

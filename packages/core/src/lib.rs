//! Core domain types for the cluster event hub.
//!
//! This crate contains shared types used across all packages:
//! - Envelope, the wire unit delivered to every session
//! - Topic, the fixed set of routing keys
//! - Cluster payloads published by the job/worker/master subsystem
//! - HubStats, the stats snapshot exposed to operators

mod cluster;
mod envelope;
mod session;
mod stats;
mod topic;

pub use cluster::{CheckResult, HealthState, HealthStatus, JobInfo, MasterInfo, WorkerInfo};
pub use envelope::{Envelope, InboundEnvelope, message_types};
pub use session::SessionId;
pub use stats::HubStats;
pub use topic::{Topic, TopicError};

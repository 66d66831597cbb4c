//! Real-time fan-out hub for cluster dashboard sessions.
//!
//! This crate keeps track of connected sessions and pushes envelopes to them:
//! - Global broadcasts reach every active session, in submission order
//! - Topic publishes reach only the sessions subscribed to that topic
//! - Slow consumers are dropped instead of blocking anyone
//!
//! # Architecture
//!
//! - `BroadcastScheduler` - Ractor actor that applies registrations,
//!   removals and global broadcasts one at a time
//! - `ConnectionRegistry` - The set of active sessions
//! - `TopicRouter` - Topic membership and topic-scoped fan-out
//! - Session loops - One task writing to each connection, one reading from it
//!
//! # Usage
//!
//! ```ignore
//! use hub::{Hub, HubConfig, memory_pair};
//!
//! let (hub, _scheduler) = Hub::start(HubConfig::default()).await?;
//!
//! let (conn, mut peer) = memory_pair();
//! let id = hub.connect(conn, Some("alice".into())).await?;
//! hub.subscribe(id, Topic::Jobs)?;
//!
//! hub.publish_jobs(&jobs);
//! ```

mod config;
mod connection;
mod error;
mod hub;
mod messages;
mod registry;
mod router;
mod scheduler;
mod session;
mod stats;
mod worker;

pub use config::{ConfigError, HubConfig, DEFAULT_VERSION};
pub use connection::{
    memory_pair, Connection, Frame, FrameReader, FrameWriter, MemoryConnection, MemoryPeer,
    MemoryReader, MemoryWriter,
};
pub use error::{ConnectionError, HubError, Result};
pub use hub::{Hub, WeakHub};
pub use registry::FanOut;
pub use session::{Session, SessionState};

// Re-export core types for convenience
pub use fanout_core::{
    message_types, CheckResult, Envelope, HealthState, HealthStatus, HubStats, InboundEnvelope,
    JobInfo, MasterInfo, SessionId, Topic, WorkerInfo,
};

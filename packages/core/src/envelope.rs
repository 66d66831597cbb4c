//! Wire envelope wrapping every message delivered to a session.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known values of the envelope `type` field.
pub mod message_types {
    /// One-time greeting sent to a session right after registration.
    pub const WELCOME: &str = "welcome";
    pub const METRICS_UPDATE: &str = "metrics_update";
    pub const JOBS_UPDATE: &str = "jobs_update";
    pub const WORKERS_UPDATE: &str = "workers_update";
    pub const MASTERS_UPDATE: &str = "masters_update";
    pub const HEALTH_UPDATE: &str = "health_update";
    pub const PERFORMANCE_UPDATE: &str = "performance_update";

    /// Reply to an inbound `ping`.
    pub const PONG: &str = "pong";
    /// Reply to an inbound `get_stats`.
    pub const HUB_STATS: &str = "hub_stats";

    // Inbound commands
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const PING: &str = "ping";
    pub const GET_STATS: &str = "get_stats";
}

/// A message on the wire: type tag, generation time, payload and optional
/// sender id and metadata.
///
/// `user_id` and `metadata` are omitted from the encoded form when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    /// Message kind, e.g. `jobs_update`.
    #[serde(rename = "type")]
    pub kind: String,
    /// When the message was generated.
    pub timestamp: DateTime<Utc>,
    /// Payload; shape depends on `kind`.
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl<T> Envelope<T> {
    /// Create an envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, data: T) -> Self {
        Self {
            kind: kind.into(),
            timestamp: Utc::now(),
            data,
            user_id: None,
            metadata: Map::new(),
        }
    }

    /// Set the sender id. An empty id is treated as absent.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        self.user_id = (!user_id.is_empty()).then_some(user_id);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encode the envelope into its JSON wire form.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// A message received from a session.
///
/// Clients are not required to stamp their messages, so everything except
/// the type tag is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Value,
}

impl InboundEnvelope {
    /// Decode an inbound message from its JSON wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The payload as a string, for commands whose argument is a topic name.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_str()
    }
}

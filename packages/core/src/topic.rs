//! Topic namespace used as routing keys for scoped broadcasts.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::message_types;

/// A named routing key drawn from a fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Metrics,
    Jobs,
    Workers,
    Masters,
    Health,
    Performance,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 6] = [
        Topic::Metrics,
        Topic::Jobs,
        Topic::Workers,
        Topic::Masters,
        Topic::Health,
        Topic::Performance,
    ];

    /// Get the topic name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Metrics => "metrics",
            Topic::Jobs => "jobs",
            Topic::Workers => "workers",
            Topic::Masters => "masters",
            Topic::Health => "health",
            Topic::Performance => "performance",
        }
    }

    /// The envelope type carried by updates published on this topic.
    pub fn update_type(&self) -> &'static str {
        match self {
            Topic::Metrics => message_types::METRICS_UPDATE,
            Topic::Jobs => message_types::JOBS_UPDATE,
            Topic::Workers => message_types::WORKERS_UPDATE,
            Topic::Masters => message_types::MASTERS_UPDATE,
            Topic::Health => message_types::HEALTH_UPDATE,
            Topic::Performance => message_types::PERFORMANCE_UPDATE,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name outside the topic namespace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct TopicError(pub String);

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TopicError(s.to_string()))
    }
}

//! Hub configuration.

use std::str::FromStr;
use std::time::Duration;

/// Protocol version announced to clients unless configured otherwise.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Configuration for hub behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Capacity of each session's outbound queue.
    pub outbound_capacity: usize,
    /// Global broadcasts that may wait for the scheduler before new ones are dropped.
    pub broadcast_capacity: usize,
    /// Register/unregister requests that may wait for the scheduler.
    pub lifecycle_capacity: usize,
    /// Longest a register/unregister caller waits before `RegistryBusy`.
    pub submit_timeout: Duration,
    /// Interval between heartbeat pings.
    pub ping_period: Duration,
    /// Window for a liveness response after the last one.
    pub pong_wait: Duration,
    /// Deadline for a single write to a connection.
    pub write_wait: Duration,
    /// Service name announced in the welcome message.
    pub service_name: String,
    /// Version announced in the welcome message and broadcast metadata.
    pub version: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            broadcast_capacity: 256,
            lifecycle_capacity: 64,
            submit_timeout: Duration::from_secs(5),
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            service_name: "cluster-dashboard".to_string(),
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl HubConfig {
    /// Load the configuration from `HUB_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("HUB_OUTBOUND_CAPACITY")? {
            config.outbound_capacity = v;
        }
        if let Some(v) = env_parse("HUB_BROADCAST_CAPACITY")? {
            config.broadcast_capacity = v;
        }
        if let Some(v) = env_parse("HUB_LIFECYCLE_CAPACITY")? {
            config.lifecycle_capacity = v;
        }
        if let Some(ms) = env_parse("HUB_SUBMIT_TIMEOUT_MS")? {
            config.submit_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse("HUB_PING_PERIOD_SECS")? {
            config.ping_period = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("HUB_PONG_WAIT_SECS")? {
            config.pong_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("HUB_WRITE_WAIT_SECS")? {
            config.write_wait = Duration::from_secs(secs);
        }
        if let Ok(name) = std::env::var("HUB_SERVICE_NAME") {
            config.service_name = name;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("outbound_capacity", self.outbound_capacity),
            ("broadcast_capacity", self.broadcast_capacity),
            ("lifecycle_capacity", self.lifecycle_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.ping_period >= self.pong_wait {
            return Err(ConfigError::Invalid(format!(
                "ping_period ({:?}) must be shorter than pong_wait ({:?})",
                self.ping_period, self.pong_wait
            )));
        }
        Ok(())
    }

    /// Set the outbound queue capacity.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Set the global broadcast backlog.
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the register/unregister backlog.
    pub fn with_lifecycle_capacity(mut self, capacity: usize) -> Self {
        self.lifecycle_capacity = capacity;
        self
    }

    /// Set how long lifecycle submissions may wait.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Set the keepalive timings.
    pub fn with_keepalive(mut self, ping_period: Duration, pong_wait: Duration) -> Self {
        self.ping_period = ping_period;
        self.pong_wait = pong_wait;
        self
    }

    /// Set the per-write deadline.
    pub fn with_write_wait(mut self, write_wait: Duration) -> Self {
        self.write_wait = write_wait;
        self
    }

    /// Set the service name announced to sessions.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Parse {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse {key}: {message}")]
    Parse { key: String, message: String },

    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.ping_period, Duration::from_secs(54));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = HubConfig::default().with_outbound_capacity(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_ping_slower_than_pong_wait() {
        let config = HubConfig::default()
            .with_keepalive(Duration::from_secs(60), Duration::from_secs(30));
        assert!(config.validate().is_err());
    }
}

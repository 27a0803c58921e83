//! Configuration structures.
//!
//! Hub coordinates come from a base64 connection descriptor handed to the
//! extension at deploy time; timing knobs default to the protocol constants.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hub endpoint and credentials.
    pub hub: HubConfig,

    /// Loop timings and limits.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Log filter and output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn new(hub: HubConfig) -> Self {
        Self {
            hub,
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Build a configuration from a base64 connection descriptor.
    pub fn from_token(token: &str) -> Result<Self> {
        Ok(Self::new(HubConfig::from_token(token)?))
    }
}

/// Topic plus bearer token for one direction of the channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCredentials {
    pub topic: String,
    #[serde(default)]
    pub token: String,
}

/// Hub endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub URL used for both publishing (POST) and subscribing (GET).
    pub url: String,

    /// Outbound topic and token.
    pub publisher: TopicCredentials,

    /// Inbound topic and token.
    pub subscriber: TopicCredentials,
}

impl HubConfig {
    /// Decode a connection descriptor: standard base64 of a JSON object
    /// `{url, publisher: {topic, token}, subscriber: {topic, token}}`.
    pub fn from_token(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::validation("connection token must be a non-empty string"));
        }
        let decoded = STANDARD.decode(token)?;
        let config: HubConfig = serde_json::from_slice(&decoded)?;
        if config.url.is_empty() {
            return Err(Error::validation("connection descriptor is missing the hub url"));
        }
        Ok(config)
    }
}

/// Loop timings and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Period of the state diff loop. Must be non-zero.
    #[serde(with = "nonzero_duration")]
    pub state_interval: Duration,

    /// Outbound events are dropped once the last ping is older than this.
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,

    /// Wait between subscription attempts after a connection failure.
    #[serde(with = "humantime_serde")]
    pub reconnect_backoff: Duration,

    /// Wait before reopening a subscription whose stream ended cleanly.
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Maximum size of one buffered stream line, and of one accumulated frame.
    pub max_frame_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_interval: Duration::from_millis(200),
            ping_timeout: Duration::from_millis(6000),
            reconnect_backoff: Duration::from_secs(5),
            reconnect_delay: Duration::from_millis(500),
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl RuntimeConfig {
    /// Reject settings the loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.state_interval.is_zero() {
            return Err(Error::validation("state_interval must be greater than zero"));
        }
        if self.max_frame_bytes == 0 {
            return Err(Error::validation("max_frame_bytes must be greater than zero"));
        }
        Ok(())
    }
}

/// humantime durations that refuse `0s`.
mod nonzero_duration {
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        humantime_serde::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value: Duration = humantime_serde::deserialize(deserializer)?;
        if value.is_zero() {
            return Err(D::Error::custom("duration must be greater than zero"));
        }
        Ok(value)
    }
}

/// Output format of the process-wide log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging settings, overridable from `TALKOPS_LOG_LEVEL` / `TALKOPS_LOG_FORMAT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level applied to this crate's targets when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    /// Defaults with the `TALKOPS_LOG_*` environment applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(level) = lookup("TALKOPS_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.level = level;
        }
        if let Some(format) = lookup("TALKOPS_LOG_FORMAT") {
            self.format = if format.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Compact
            };
        }
        self
    }

    /// Filter directive: `level` for this crate, warnings for dependencies.
    pub fn directive(&self) -> String {
        format!("warn,talkops={}", self.level)
    }
}

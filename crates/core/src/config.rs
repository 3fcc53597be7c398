//! Engine-wide configuration (§6 configuration options table).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryConfig;

/// Tunables shared by the Dispatcher, Attempt Worker, and Scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_retry_config: RetryConfig,
    pub signature_header: String,
    pub timestamp_header: String,
    pub delivery_id_header: String,
    #[serde(with = "humantime_secs")]
    pub timeout: Duration,
    pub max_payload_size: usize,
    pub worker_concurrency: usize,
    /// Bound on combined queued-plus-in-flight deliveries before
    /// `Dispatcher::dispatch` starts rejecting with `Overloaded`.
    pub max_queue_depth: usize,
    pub redirects_allowed: bool,
    /// Tolerance, in seconds, for inbound and outbound timestamp checks.
    pub signature_tolerance_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_retry_config: RetryConfig::default(),
            signature_header: "x-webhook-signature".to_string(),
            timestamp_header: "x-webhook-timestamp".to_string(),
            delivery_id_header: "x-webhook-delivery-id".to_string(),
            timeout: Duration::from_secs(30),
            max_payload_size: 1024 * 1024,
            worker_concurrency: 8,
            max_queue_depth: 10_000,
            redirects_allowed: false,
            signature_tolerance_secs: crate::signer::DEFAULT_TOLERANCE_SECS,
        }
    }
}

#[cfg(feature = "toml-config")]
impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(feature = "toml-config")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read configuration file: {0}")]
    Io(String),
    #[error("could not parse configuration: {0}")]
    Parse(String),
}

#[cfg(feature = "toml-config")]
impl From<ConfigError> for crate::error::EngineError {
    fn from(err: ConfigError) -> Self {
        crate::error::EngineError::ConfigError(err.to_string())
    }
}

mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

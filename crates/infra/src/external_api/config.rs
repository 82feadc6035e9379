//! External API endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier_core::duration::option_millis;
use courier_core::{ConfigError, ConfigResult, RetryPolicy, Settings};

/// Protocol used when none is configured.
pub const DEFAULT_PROTOCOL: &str = "http";

/// One configured external HTTP endpoint.
///
/// ```json
/// { "host": "orders.mycompany.com:1234", "protocol": "https", "timeout": 2000,
///   "retry": { "strategy": "fibonacci", "times": 5, "startInterval": 10 } }
/// ```
///
/// | Field | Default |
/// |-------|---------|
/// | `host` | required |
/// | `protocol` | `"http"` |
/// | `timeout` (ms, per attempt) | unbounded |
/// | `retry.strategy` | exponential |
/// | `retry.times` | 0 (single attempt) |
/// | `retry.startInterval` (ms) | 100 |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub host: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(
        default,
        with = "option_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl ApiConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            protocol: default_protocol(),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Decode and validate an endpoint from a configuration subtree.
    pub fn from_settings(settings: &Settings) -> ConfigResult<Self> {
        let config: ApiConfig = settings.extract().map_err(|e| match e {
            ConfigError::Invalid { reason, .. } => ConfigError::invalid("externalAPI", reason),
            other => other,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ConfigError::validation("external API host is required"));
        }
        if host.contains("://") {
            return Err(ConfigError::validation(format!(
                "external API host `{host}` must not include a scheme; use `protocol`"
            )));
        }
        match self.protocol.as_str() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::validation(format!(
                "unsupported external API protocol `{other}`"
            ))),
        }
    }

    /// `protocol://host`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host.trim().trim_end_matches('/'))
    }
}

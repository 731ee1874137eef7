//! # Client Configuration
//!
//! Purpose: Describe where the data endpoint lives, how to authenticate, and
//! how calls are pooled and timed out.
//!
//! ## Sources
//! - `ClientConfig::new` plus `with_*` adjusters for programmatic setup.
//! - `ClientConfig::from_json` for config files (durations in milliseconds).
//! - `ClientConfig::from_env` reading `SCACHE_*` variables.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use scache_common::{CacheError, CacheResult};

pub const DEFAULT_CHANNEL_COUNT: usize = 4;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TTL_MS: u64 = 60_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 5_000;

/// Port used when the endpoint does not carry one.
pub const DEFAULT_TLS_PORT: u16 = 443;

pub const ENV_API_KEY: &str = "SCACHE_API_KEY";
pub const ENV_ENDPOINT: &str = "SCACHE_ENDPOINT";
pub const ENV_CHANNEL_COUNT: &str = "SCACHE_CHANNEL_COUNT";
pub const ENV_TIMEOUT_MS: &str = "SCACHE_TIMEOUT_MS";
pub const ENV_TLS: &str = "SCACHE_TLS";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for the client and its channel pool.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Data endpoint, `host` or `host:port`.
    pub endpoint: String,
    /// Credential sent in the `authorization` header.
    pub auth_token: String,
    /// Number of pooled transport channels (at least 1).
    #[serde(default = "ClientConfig::default_channel_count")]
    pub channel_count: usize,
    /// Default per-call timeout.
    #[serde(default = "ClientConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    /// TTL applied by writes that do not pass one.
    #[serde(default = "ClientConfig::default_ttl_ms")]
    pub default_ttl_ms: u64,
    #[serde(default = "ClientConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// HTTP/2 keep-alive ping interval; 0 disables pings.
    #[serde(default = "ClientConfig::default_keep_alive_ms")]
    pub keep_alive_interval_ms: u64,
    #[serde(default = "ClientConfig::default_tls")]
    pub tls: bool,
}

// Keep the credential out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .field("channel_count", &self.channel_count)
            .field("timeout_ms", &self.timeout_ms)
            .field("default_ttl_ms", &self.default_ttl_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("keep_alive_interval_ms", &self.keep_alive_interval_ms)
            .field("tls", &self.tls)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration with default pooling and timeouts.
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        ClientConfig {
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
            channel_count: Self::default_channel_count(),
            timeout_ms: Self::default_timeout_ms(),
            default_ttl_ms: Self::default_ttl_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            keep_alive_interval_ms: Self::default_keep_alive_ms(),
            tls: Self::default_tls(),
        }
    }

    pub fn with_channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = duration_ms(ttl);
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Parses a JSON document; omitted fields take their defaults.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reads `SCACHE_API_KEY` and `SCACHE_ENDPOINT` (required) plus the
    /// optional `SCACHE_CHANNEL_COUNT`, `SCACHE_TIMEOUT_MS`, and `SCACHE_TLS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let auth_token = lookup(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;
        let endpoint = lookup(ENV_ENDPOINT).ok_or(ConfigError::Missing(ENV_ENDPOINT))?;
        let mut config = ClientConfig::new(endpoint, auth_token);

        if let Some(value) = lookup(ENV_CHANNEL_COUNT) {
            config.channel_count = parse_var(ENV_CHANNEL_COUNT, value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_var(ENV_TIMEOUT_MS, value)?;
        }
        if let Some(value) = lookup(ENV_TLS) {
            config.tls = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: ENV_TLS,
                        value,
                    })
                }
            };
        }
        Ok(config)
    }

    /// Checks the invariants the client relies on.
    pub fn validate(&self) -> CacheResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(CacheError::invalid_argument("endpoint must not be empty"));
        }
        if self.endpoint.contains("://") {
            return Err(CacheError::invalid_argument(
                "endpoint must be host or host:port without a scheme",
            ));
        }
        if self.auth_token.trim().is_empty() {
            return Err(CacheError::invalid_argument("auth token must not be empty"));
        }
        if self.channel_count == 0 {
            return Err(CacheError::invalid_argument("channel count must be at least 1"));
        }
        if self.default_ttl_ms == 0 {
            return Err(CacheError::invalid_argument("default ttl must be positive"));
        }
        self.port()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Option<Duration> {
        match self.keep_alive_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Host portion of the endpoint.
    pub fn host(&self) -> &str {
        match self.endpoint.rsplit_once(':') {
            Some((host, _)) => host,
            None => &self.endpoint,
        }
    }

    /// Explicit port from the endpoint, or 443.
    pub fn port(&self) -> CacheResult<u16> {
        match self.endpoint.rsplit_once(':') {
            Some((_, port)) => port.parse().map_err(|_| {
                CacheError::invalid_argument(format!("invalid port in endpoint {:?}", self.endpoint))
            }),
            None => Ok(DEFAULT_TLS_PORT),
        }
    }

    /// URI handed to the transport, e.g. `https://cache.example.com:443`.
    pub fn uri(&self) -> CacheResult<String> {
        let scheme = if self.tls { "https" } else { "http" };
        Ok(format!("{}://{}:{}", scheme, self.host(), self.port()?))
    }

    fn default_channel_count() -> usize {
        DEFAULT_CHANNEL_COUNT
    }

    fn default_timeout_ms() -> u64 {
        DEFAULT_TIMEOUT_MS
    }

    fn default_ttl_ms() -> u64 {
        DEFAULT_TTL_MS
    }

    fn default_connect_timeout_ms() -> u64 {
        DEFAULT_CONNECT_TIMEOUT_MS
    }

    fn default_keep_alive_ms() -> u64 {
        DEFAULT_KEEP_ALIVE_MS
    }

    fn default_tls() -> bool {
        true
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVar { name, value })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

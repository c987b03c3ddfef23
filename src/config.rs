//! Client configuration read from the environment.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

pub const ENV_API: &str = "LENTICULAR_API";
pub const ENV_WS: &str = "LENTICULAR_WS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "LENTICULAR_REQUEST_TIMEOUT_MS";
pub const ENV_RECONNECT_DELAY_MS: &str = "LENTICULAR_RECONNECT_DELAY_MS";
pub const ENV_RECONNECT_MAX_DELAY_MS: &str = "LENTICULAR_RECONNECT_MAX_DELAY_MS";

/// Freshness windows of cached server data
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub job_ttl: Duration,
    pub methods_ttl: Duration,
    pub downloads_ttl: Duration,
    pub datasets_ttl: Duration,
    /// Linksets, lenses and clusterings
    pub status_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            job_ttl: Duration::from_secs(24 * 60 * 60),
            methods_ttl: Duration::from_secs(15 * 60),
            downloads_ttl: Duration::from_secs(15 * 60),
            datasets_ttl: Duration::from_secs(5 * 60),
            status_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn with_job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn with_methods_ttl(mut self, ttl: Duration) -> Self {
        self.methods_ttl = ttl;
        self
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }
}

/// Where the server lives and how patiently to talk to it
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL, without trailing slash
    pub api_url: String,
    /// Socket base URL, without trailing slash
    pub ws_url: String,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api_url = "http://localhost:8000".to_string();
        Self {
            ws_url: ws_url_for(&api_url),
            api_url,
            request_timeout: Duration::from_millis(30_000),
            reconnect_delay: Duration::from_millis(1_000),
            reconnect_max_delay: Duration::from_millis(30_000),
            cache: CacheConfig::default(),
        }
    }
}

/// Derive the socket URL from the HTTP one by swapping the scheme
pub fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_url.to_string()
    }
}

fn millis(name: &'static str, value: Option<String>, default: Duration) -> ConfigResult<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            ws_url: ws_url_for(&api_url),
            api_url,
            ..Default::default()
        }
    }

    /// Read the `LENTICULAR_*` variables; unset ones keep their defaults
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut config = match lookup(ENV_API) {
            Some(api) => Self::new(api),
            None => defaults.clone(),
        };

        if let Some(ws) = lookup(ENV_WS) {
            config.ws_url = ws.trim_end_matches('/').to_string();
        }
        config.request_timeout = millis(ENV_REQUEST_TIMEOUT_MS, lookup(ENV_REQUEST_TIMEOUT_MS), defaults.request_timeout)?;
        config.reconnect_delay = millis(ENV_RECONNECT_DELAY_MS, lookup(ENV_RECONNECT_DELAY_MS), defaults.reconnect_delay)?;
        config.reconnect_max_delay =
            millis(ENV_RECONNECT_MAX_DELAY_MS, lookup(ENV_RECONNECT_MAX_DELAY_MS), defaults.reconnect_max_delay)?;

        config.validate()?;
        Ok(config)
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!("API URL must be http(s): {}", self.api_url)));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!("Socket URL must be ws(s): {}", self.ws_url)));
        }
        if self.reconnect_delay.is_zero() || self.reconnect_delay > self.reconnect_max_delay {
            return Err(ConfigError::Invalid(
                "Reconnect delay must be positive and not exceed the maximum".to_string(),
            ));
        }
        Ok(())
    }
}

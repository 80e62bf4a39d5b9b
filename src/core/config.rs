//! Configuration management for the gateway.
//!
//! Configuration is read once from the environment into an immutable
//! [`AppConfig`] and handed to constructors. Nothing reads the environment
//! after startup.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::transformer::Dialect;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream model server connection settings
    pub upstream: UpstreamConfig,

    /// Retry and circuit breaker tuning
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Shared bearer token required from gateway clients.
    /// `None` leaves the gateway open.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Limits for the in-memory document store
    #[serde(default)]
    pub documents: DocumentConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream model server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL without trailing slash
    pub base_url: String,

    /// API key sent as `Authorization: Bearer`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Wire dialect spoken by the upstream
    #[serde(default)]
    pub dialect: Dialect,

    /// Per-attempt timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Whether to verify TLS certificates
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

/// Retry executor and circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Additional attempts after the first one
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before retry k is `retry_base_delay * 2^k`
    #[serde(default = "default_retry_base_delay", with = "duration_secs")]
    pub retry_base_delay: Duration,

    /// Optional ceiling applied to the computed delay
    #[serde(default)]
    pub retry_max_delay: Option<Duration>,

    /// Consecutive failures that trip the breaker
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// How long the breaker stays open before probing
    #[serde(default = "default_breaker_cooldown", with = "duration_secs")]
    pub breaker_cooldown: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: None,
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown: default_breaker_cooldown(),
        }
    }
}

/// Document store limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            max_context_chars: default_max_context_chars(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_verify_tls() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_max_upload_mb() -> usize {
    20
}

fn default_max_context_chars() -> usize {
    10_000
}

fn default_max_chunks() -> usize {
    4
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(default_host),
            port: parse_var(&get, "PORT")?.unwrap_or_else(default_port),
        };

        let upstream = UpstreamConfig {
            base_url: get("UPSTREAM_BASE_URL")
                .unwrap_or_else(default_base_url)
                .trim_end_matches('/')
                .to_string(),
            api_key: get("UPSTREAM_API_KEY"),
            dialect: parse_var(&get, "UPSTREAM_DIALECT")?.unwrap_or_default(),
            timeout: secs_var(&get, "UPSTREAM_TIMEOUT_SECS")?.unwrap_or_else(default_timeout),
            verify_tls: get("UPSTREAM_VERIFY_TLS")
                .map(|v| str_to_bool(&v))
                .unwrap_or_else(default_verify_tls),
        };

        let resilience = ResilienceConfig {
            retry_attempts: parse_var(&get, "RETRY_ATTEMPTS")?
                .unwrap_or_else(default_retry_attempts),
            retry_base_delay: secs_var(&get, "RETRY_BASE_DELAY_SECS")?
                .unwrap_or_else(default_retry_base_delay),
            retry_max_delay: secs_var(&get, "RETRY_MAX_DELAY_SECS")?,
            breaker_threshold: parse_var(&get, "BREAKER_THRESHOLD")?
                .unwrap_or_else(default_breaker_threshold),
            breaker_cooldown: secs_var(&get, "BREAKER_COOLDOWN_SECS")?
                .unwrap_or_else(default_breaker_cooldown),
        };

        if resilience.breaker_threshold == 0 {
            return Err(anyhow!("BREAKER_THRESHOLD must be at least 1"));
        }

        let documents = DocumentConfig {
            max_upload_mb: parse_var(&get, "MAX_UPLOAD_MB")?.unwrap_or_else(default_max_upload_mb),
            max_context_chars: parse_var(&get, "MAX_DOC_CONTEXT_CHARS")?
                .unwrap_or_else(default_max_context_chars),
            max_chunks: parse_var(&get, "MAX_DOC_CHUNKS")?.unwrap_or_else(default_max_chunks),
        };

        Ok(Self {
            server,
            upstream,
            resilience,
            api_token: get("GATEWAY_API_TOKEN"),
            documents,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow!("{}", e))
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

fn secs_var<G>(get: &G, key: &str) -> Result<Option<Duration>>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_var::<f64, G>(get, key)? {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .with_context(|| format!("Invalid duration for {}: {}", key, secs)),
        None => Ok(None),
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Serde helper storing durations as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

//! Configuration management for Tollgate.

use serde::{Deserialize, Deserializer, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, TollgateError};

/// Prefix for environment variable overrides, e.g. `TOLLGATE__SERVER__BIND_ADDR`.
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Shared cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Origin allowed by CORS; any origin when unset
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origin: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Quota and window for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl LimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// A limiter section as written in a source; absent fields fall back to
/// that limiter's defaults.
#[derive(Deserialize)]
struct PartialLimit {
    max_requests: Option<u32>,
    window_ms: Option<u64>,
}

impl PartialLimit {
    fn resolve(self, defaults: LimitConfig) -> LimitConfig {
        LimitConfig {
            max_requests: self.max_requests.unwrap_or(defaults.max_requests),
            window_ms: self.window_ms.unwrap_or(defaults.window_ms),
        }
    }
}

fn global_limit<'de, D>(deserializer: D) -> std::result::Result<LimitConfig, D::Error>
where
    D: Deserializer<'de>,
{
    PartialLimit::deserialize(deserializer).map(|p| p.resolve(default_global_limit()))
}

fn auth_limit<'de, D>(deserializer: D) -> std::result::Result<LimitConfig, D::Error>
where
    D: Deserializer<'de>,
{
    PartialLimit::deserialize(deserializer).map(|p| p.resolve(default_auth_limit()))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Limit applied to all inbound traffic
    #[serde(default = "default_global_limit", deserialize_with = "global_limit")]
    pub global: LimitConfig,

    /// Stricter limit for authentication endpoints
    #[serde(default = "default_auth_limit", deserialize_with = "auth_limit")]
    pub auth: LimitConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            global: default_global_limit(),
            auth: default_auth_limit(),
        }
    }
}

fn default_global_limit() -> LimitConfig {
    LimitConfig {
        max_requests: 100,
        window_ms: 60_000,
    }
}

fn default_auth_limit() -> LimitConfig {
    LimitConfig {
        max_requests: 5,
        window_ms: 60_000,
    }
}

/// Shared cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries
    #[serde(default = "default_cache_size")]
    pub max_size: usize,

    /// Time-to-live for entries stored without an explicit TTL
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// How often expired entries are swept
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_size(),
            default_ttl_ms: default_ttl_ms(),
            cleanup_interval_ms: default_cleanup_interval(),
        }
    }
}

fn default_cache_size() -> usize {
    1000
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_cleanup_interval() -> u64 {
    60_000
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TollgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then an optional file, then `TOLLGATE__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TollgateConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TollgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a limiter or the cache unusable.
    pub fn validate(&self) -> Result<()> {
        for (name, limit) in [
            ("global", &self.rate_limiting.global),
            ("auth", &self.rate_limiting.auth),
        ] {
            if limit.max_requests == 0 {
                return Err(TollgateError::Config(format!(
                    "rate_limiting.{name}.max_requests must be positive"
                )));
            }
            if limit.window_ms == 0 {
                return Err(TollgateError::Config(format!(
                    "rate_limiting.{name}.window_ms must be positive"
                )));
            }
        }

        if self.cache.max_size == 0 {
            return Err(TollgateError::Config("cache.max_size must be positive".into()));
        }
        if self.cache.cleanup_interval_ms == 0 {
            return Err(TollgateError::Config(
                "cache.cleanup_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

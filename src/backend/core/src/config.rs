//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (queue lanes)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
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

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Use the in-memory queue backend instead of Redis
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent job executions per lane consumer
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Default retry ceiling for jobs created without an explicit policy
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Base delay for exponential retry backoff
    #[serde(default = "default_retry_base_delay", with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Cap on the computed retry backoff delay
    #[serde(default = "default_retry_max_delay", with = "humantime_serde")]
    pub retry_max_delay: Duration,

    /// Automatically re-enqueue retry-eligible failed jobs
    #[serde(default = "default_auto_retry")]
    pub auto_retry: bool,

    /// Hard bound on a single processor execution
    #[serde(default = "default_job_timeout", with = "humantime_serde")]
    pub job_timeout: Duration,

    /// Interval between stale-worker sweeps
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Heartbeat age beyond which a worker is considered stale
    #[serde(default = "default_worker_stale_timeout", with = "humantime_serde")]
    pub worker_stale_timeout: Duration,

    /// Force-fail the current job of a worker marked stale
    #[serde(default = "default_fail_stale_worker_jobs")]
    pub fail_stale_worker_jobs: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            default_max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            auto_retry: default_auto_retry(),
            job_timeout: default_job_timeout(),
            sweep_interval: default_sweep_interval(),
            worker_stale_timeout: default_worker_stale_timeout(),
            fail_stale_worker_jobs: default_fail_stale_worker_jobs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_concurrency() -> usize { 4 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay() -> Duration { Duration::from_millis(1000) }
fn default_retry_max_delay() -> Duration { Duration::from_secs(3600) }
fn default_auto_retry() -> bool { true }
fn default_job_timeout() -> Duration { Duration::from_secs(300) }
fn default_sweep_interval() -> Duration { Duration::from_secs(300) }
fn default_worker_stale_timeout() -> Duration { Duration::from_secs(30) }
fn default_fail_stale_worker_jobs() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WORKHORSE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("WORKHORSE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.default_max_retries, 3);
        assert_eq!(cfg.retry_base_delay, Duration::from_millis(1000));
        assert!(cfg.auto_retry);
        assert!(cfg.fail_stale_worker_jobs);
    }

    #[test]
    fn test_server_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
    }
}

//! Configuration management for the crawl orchestrator
//!
//! Settings come from built-in defaults, an optional TOML file, `CRAWL_ORCH_*`
//! environment variables and finally command-line flags. Every section is
//! `#[serde(default)]`, so a file only needs the keys it changes:
//!
//! ```toml
//! [crawler]
//! worker_url = "http://127.0.0.1:9000"
//!
//! [schedule]
//! platform_delay_min_secs = 30
//! platform_delay_max_secs = 60
//!
//! [baselines.xhs]
//! sort_type = "popularity_descending"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::models::Platform;
use crate::orchestrator::delay::{DelayPolicy, DelayRange};
use crate::orchestrator::resolve::{ConfigResolver, CrawlerConfigOverlay, CrawlerSettings};
use crate::orchestrator::status::DEFAULT_HISTORY_LIMIT;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Result store configuration
    pub storage: StorageConfig,

    /// Crawler worker configuration
    pub crawler: CrawlerWorkerConfig,

    /// Inter-step delays
    pub schedule: ScheduleConfig,

    /// Job bookkeeping
    pub jobs: JobsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-platform baseline adjustments, keyed by platform code
    pub baselines: BTreeMap<String, CrawlerConfigOverlay>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Log every request through the trace layer
    pub enable_tracing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8000,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

/// Result store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown storage backend '{other}' (memory, sqlite)")),
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: PathBuf::from("data/media_crawler.db"),
        }
    }
}

/// Crawler worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerWorkerConfig {
    /// Base URL of the browser-automation worker
    pub worker_url: String,

    /// Upper bound for a single step, in seconds
    pub request_timeout_secs: u64,
}

impl Default for CrawlerWorkerConfig {
    fn default() -> Self {
        Self {
            worker_url: String::from("http://127.0.0.1:9000"),
            request_timeout_secs: 3600,
        }
    }
}

/// Inter-step delay ranges, inclusive, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub platform_delay_min_secs: u64,
    pub platform_delay_max_secs: u64,
    pub round_delay_min_secs: u64,
    pub round_delay_max_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            platform_delay_min_secs: 60,
            platform_delay_max_secs: 120,
            round_delay_min_secs: 300,
            round_delay_max_secs: 600,
        }
    }
}

/// Job bookkeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Finished jobs kept in memory
    pub history_limit: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields from `CRAWL_ORCH_*` variables that are set
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("CRAWL_ORCH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("CRAWL_ORCH_PORT") {
            self.server.port = port;
        }
        if let Some(backend) = env_parse("CRAWL_ORCH_STORAGE") {
            self.storage.backend = backend;
        }
        if let Ok(path) = std::env::var("CRAWL_ORCH_SQLITE_PATH") {
            self.storage.sqlite_path = path.into();
        }
        if let Ok(url) = std::env::var("CRAWL_ORCH_WORKER_URL") {
            self.crawler.worker_url = url;
        }
        if let Some(secs) = env_parse("CRAWL_ORCH_REQUEST_TIMEOUT") {
            self.crawler.request_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("CRAWL_ORCH_PLATFORM_DELAY_MIN") {
            self.schedule.platform_delay_min_secs = secs;
        }
        if let Some(secs) = env_parse("CRAWL_ORCH_PLATFORM_DELAY_MAX") {
            self.schedule.platform_delay_max_secs = secs;
        }
        if let Some(secs) = env_parse("CRAWL_ORCH_ROUND_DELAY_MIN") {
            self.schedule.round_delay_min_secs = secs;
        }
        if let Some(secs) = env_parse("CRAWL_ORCH_ROUND_DELAY_MAX") {
            self.schedule.round_delay_max_secs = secs;
        }
        if let Some(limit) = env_parse("CRAWL_ORCH_HISTORY_LIMIT") {
            self.jobs.history_limit = limit;
        }
        if let Ok(level) = std::env::var("CRAWL_ORCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CRAWL_ORCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.platform_delay_min_secs > schedule.platform_delay_max_secs {
            anyhow::bail!("platform_delay_min_secs must not exceed platform_delay_max_secs");
        }
        if schedule.round_delay_min_secs > schedule.round_delay_max_secs {
            anyhow::bail!("round_delay_min_secs must not exceed round_delay_max_secs");
        }

        if self.jobs.history_limit == 0 {
            anyhow::bail!("history_limit must be greater than 0");
        }

        if self.crawler.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        let worker_url = url::Url::parse(&self.crawler.worker_url)
            .with_context(|| format!("Invalid worker_url: '{}'", self.crawler.worker_url))?;
        if !matches!(worker_url.scheme(), "http" | "https") {
            anyhow::bail!("worker_url must use http or https");
        }

        for code in self.baselines.keys() {
            if Platform::from_code(code).is_none() {
                anyhow::bail!(
                    "Unknown platform '{}' in [baselines]. Valid platforms: {}",
                    code,
                    Platform::valid_codes()
                );
            }
        }

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }

    /// Delay ranges used between steps
    pub fn delay_policy(&self) -> DelayPolicy {
        let s = &self.schedule;
        DelayPolicy {
            between_platforms: DelayRange::from_secs(
                s.platform_delay_min_secs,
                s.platform_delay_max_secs,
            ),
            between_rounds: DelayRange::from_secs(s.round_delay_min_secs, s.round_delay_max_secs),
        }
    }

    /// Build the per-platform baseline table
    pub fn resolver(&self) -> Result<ConfigResolver> {
        self.baselines.iter().try_fold(
            ConfigResolver::new(CrawlerSettings::default()),
            |resolver, (code, overlay)| {
                let platform: Platform = code.parse().map_err(anyhow::Error::msg)?;
                Ok(resolver.with_platform_override(platform, overlay.clone()))
            },
        )
    }
}

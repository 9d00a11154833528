//! Configuration management.
//!
//! Settings come from defaults, an optional TOML file, `APTEKA_*`
//! environment variables and finally CLI flags, in that order of
//! precedence. `validate()` runs once after merging.

use crate::error::CrawlerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Root of the storefront to crawl.
    pub base_url: String,
    /// Minimum seconds between any two requests, across all workers.
    pub delay_secs: f64,
    pub workers: usize,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    /// Cap on products taken per category (None = unbounded).
    pub max_products: Option<u64>,
    /// Fetch product detail pages for enrichment.
    pub detailed: bool,
    /// Abort when failed/processed exceeds this ratio...
    pub error_rate_threshold: f64,
    /// ...but only after at least this many items were processed.
    pub min_items_for_abort: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.dvago.pk".to_string(),
            delay_secs: 2.0,
            workers: 2,
            max_retries: 3,
            request_timeout_secs: 30,
            max_products: None,
            detailed: true,
            error_rate_threshold: 0.5,
            min_items_for_abort: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub database_file: String,
    pub checkpoint_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("dvago_data"),
            database_file: "products.db".to_string(),
            checkpoint_file: "checkpoint.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Defaults overridden by `APTEKA_*` environment variables.
    pub fn from_env() -> Result<Self, CrawlerError> {
        let mut config = Self::default();
        config.crawler.base_url = env_or("APTEKA_BASE_URL", config.crawler.base_url);
        config.crawler.delay_secs = env_or("APTEKA_DELAY_SECS", config.crawler.delay_secs);
        config.crawler.workers = env_or("APTEKA_WORKERS", config.crawler.workers);
        config.crawler.max_retries = env_or("APTEKA_MAX_RETRIES", config.crawler.max_retries);
        config.crawler.request_timeout_secs =
            env_or("APTEKA_TIMEOUT_SECS", config.crawler.request_timeout_secs);
        if let Ok(v) = std::env::var("APTEKA_MAX_PRODUCTS") {
            config.crawler.max_products = v.parse().ok();
        }
        config.crawler.detailed = env_or("APTEKA_DETAILED", config.crawler.detailed);
        config.crawler.error_rate_threshold =
            env_or("APTEKA_ERROR_RATE_THRESHOLD", config.crawler.error_rate_threshold);
        config.output.output_dir = env_or("APTEKA_OUTPUT_DIR", config.output.output_dir);
        config.logging.level = env_or("APTEKA_LOG_LEVEL", config.logging.level);
        config.logging.format = env_or("APTEKA_LOG_FORMAT", config.logging.format);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CrawlerError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CrawlerError::Config(format!("cannot read config file: {e}")))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| CrawlerError::Config(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CrawlerError> {
        if self.crawler.workers == 0 {
            return Err(CrawlerError::Config("workers must be at least 1".into()));
        }
        if self.crawler.delay_secs < 0.0 {
            return Err(CrawlerError::Config("delay must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.crawler.error_rate_threshold) {
            return Err(CrawlerError::Config(
                "error rate threshold must be within 0.0..=1.0".into(),
            ));
        }
        if self.crawler.request_timeout_secs == 0 {
            return Err(CrawlerError::Config("request timeout must be positive".into()));
        }
        self.base_url()?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, CrawlerError> {
        Url::parse(&self.crawler.base_url)
            .map_err(|e| CrawlerError::Config(format!("invalid base URL: {e}")))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.crawler.delay_secs.max(0.0))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        self.output.output_dir.join(&self.output.database_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output.output_dir.join(&self.output.checkpoint_file)
    }
}

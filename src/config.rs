use crate::error::Result;
use crate::processors::retry::RetryPolicy;
use crate::utils::constants::*;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    #[validate(range(max = 20))]
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory index URL the source directory is populated from when empty.
    pub base_url: Option<String>,
}

/// Everything a run needs, resolved once and handed to the pipeline.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct IngestConfig {
    pub database_url: String,
    pub source_dir: PathBuf,
    pub station_file_name: String,
    pub archive_extension: String,

    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_files: usize,

    #[validate(range(min = 1))]
    pub batch_size: usize,

    #[validate(range(min = 1))]
    pub pool_size: usize,

    /// Only load measurements from this calendar month (any year).
    #[validate(range(min = 1, max = 12))]
    pub measurement_month: Option<u32>,

    #[validate(nested)]
    pub retry: RetryConfig,

    pub remote: RemoteConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/weather".to_string(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            station_file_name: DEFAULT_STATION_FILE.to_string(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            batch_size: DEFAULT_BATCH_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            measurement_month: None,
            retry: RetryConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Defaults, then the optional TOML file, then `DWD_INGEST_*` environment variables
    /// (nested keys joined with `__`, e.g. `DWD_INGEST_RETRY__MAX_RETRIES`).
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: IngestConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn station_file(&self) -> PathBuf {
        self.source_dir.join(&self.station_file_name)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

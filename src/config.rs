use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::browser::ResourceKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub navigation_timeout_ms: u64,
    pub idle_browser_timeout_secs: u64,
    pub extra_args: Vec<String>,
    pub blocked_resource_types: Vec<ResourceKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub directory: Option<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            user_agent: None,
            navigation_timeout_ms: 30_000,
            idle_browser_timeout_secs: 3600,
            extra_args: Vec::new(),
            blocked_resource_types: ResourceKind::NON_ESSENTIAL.to_vec(),
        }
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 2,
            retry_delay_ms: 1000,
            pacing_min_ms: 1000,
            pacing_max_ms: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, ignored by git
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("LISTING_WATCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a single TOML file on top of the built-in defaults.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.navigation_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Scraper navigation_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.batch.concurrency == 0 {
            return Err(ConfigError::Message(
                "Batch concurrency must be greater than 0".into(),
            ));
        }

        if self.batch.pacing_min_ms > self.batch.pacing_max_ms {
            return Err(ConfigError::Message(
                "Batch pacing_min_ms cannot exceed pacing_max_ms".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Message("Logging level cannot be empty".into()));
        }

        Ok(())
    }
}

use crate::constants::{self, env_vars};
use crate::data_fetcher::transport::TransportChain;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub mod paths;
pub mod validation;

use paths::{get_config_path, get_log_dir_path};
use validation::validate_config;

/// Configuration structure for the application.
/// Handles loading, saving, and managing fetch settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the sports data API, without trailing slash.
    pub api_base_url: String,
    /// Page visited to bootstrap cookies and the client identity.
    pub home_url: String,
    /// Path to the log file. If not specified, logs will be written to a default location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,
    /// HTTP timeout in seconds for every network call.
    pub http_timeout_seconds: u64,
    /// Ordered transport strategies used for every request.
    pub transport: TransportChain,
    /// Number of dates fetched at once.
    pub concurrency: usize,
    /// Whether per-event statistics are fetched and merged into rows.
    pub include_statistics: bool,
    /// Pause between consecutive statistics requests of the same date.
    pub statistics_delay_ms: u64,
    /// Identity used by the plain HTTP bootstrap and the shelled transport.
    pub user_agent: String,
    /// Command that runs the rendering engine driver script.
    pub browser_command: String,
    /// Command-line HTTP client for the shelled transport.
    pub curl_command: String,
    pub retry: RetryConfig,
}

/// Retry and backoff tunables.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    pub politeness_delay_ms: u64,
    pub politeness_jitter_ms: u64,
    pub rate_limit_default_seconds: u64,
    pub max_delay_seconds: u64,
    pub max_rate_limit_waits: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: constants::retry::MAX_ATTEMPTS,
            base_delay_ms: constants::retry::BASE_DELAY_MS,
            jitter_ms: constants::retry::JITTER_MS,
            politeness_delay_ms: constants::retry::POLITENESS_DELAY_MS,
            politeness_jitter_ms: constants::retry::POLITENESS_JITTER_MS,
            rate_limit_default_seconds: constants::retry::RATE_LIMIT_DELAY_SECONDS,
            max_delay_seconds: constants::retry::MAX_DELAY_SECONDS,
            max_rate_limit_waits: constants::retry::MAX_RATE_LIMIT_WAITS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: constants::api::BASE_URL.to_string(),
            home_url: constants::api::HOME_URL.to_string(),
            log_file_path: None,
            http_timeout_seconds: constants::DEFAULT_HTTP_TIMEOUT_SECONDS,
            transport: TransportChain::default(),
            concurrency: constants::DEFAULT_CONCURRENCY,
            include_statistics: true,
            statistics_delay_ms: constants::DEFAULT_STATISTICS_DELAY_MS,
            user_agent: constants::client::DEFAULT_USER_AGENT.to_string(),
            browser_command: constants::client::BROWSER_COMMAND.to_string(),
            curl_command: constants::client::CURL_COMMAND.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config file location.
    /// A missing file yields the defaults. Environment variables override
    /// file values.
    ///
    /// # Environment Variables
    /// - `DARTS_API_BASE_URL` - Override API base URL
    /// - `DARTS_LOG_FILE` - Override log file path
    /// - `DARTS_HTTP_TIMEOUT` - Override HTTP timeout in seconds
    /// - `DARTS_TRANSPORT` - Override transport chain
    /// - `DARTS_CONCURRENCY` - Override worker concurrency
    /// - `DARTS_INCLUDE_STATS` - Override statistics fetching
    pub async fn load() -> Result<Self, AppError> {
        let config_path = get_config_path();

        let mut config = if Path::new(&config_path).exists() {
            Self::load_from_path(&config_path).await?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Applies `DARTS_*` environment overrides on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<(), AppError> {
        if let Ok(base_url) = std::env::var(env_vars::API_BASE_URL) {
            self.api_base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(log_file_path) = std::env::var(env_vars::LOG_FILE) {
            self.log_file_path = Some(log_file_path);
        }

        if let Some(timeout) = std::env::var(env_vars::HTTP_TIMEOUT)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.http_timeout_seconds = timeout;
        }

        if let Ok(transport) = std::env::var(env_vars::TRANSPORT) {
            self.transport = transport.parse().map_err(AppError::config_error)?;
        }

        if let Some(concurrency) = std::env::var(env_vars::CONCURRENCY)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            self.concurrency = concurrency;
        }

        if let Ok(flag) = std::env::var(env_vars::INCLUDE_STATS) {
            self.include_statistics = parse_flag(&flag).ok_or_else(|| {
                AppError::config_error(format!(
                    "{} must be true/false/1/0, got '{flag}'",
                    env_vars::INCLUDE_STATS
                ))
            })?;
        }

        Ok(())
    }

    /// Validates the configuration settings
    pub fn validate(&self) -> Result<(), AppError> {
        validate_config(self)
    }

    /// Saves current configuration to the default config file location.
    pub async fn save(&self) -> Result<(), AppError> {
        let config_path = get_config_path();
        self.save_to_path(&config_path).await
    }

    /// Returns the platform-specific path for the config file.
    pub fn get_config_path() -> String {
        paths::get_config_path()
    }

    /// Returns the platform-specific path for the log directory.
    pub fn get_log_dir_path() -> String {
        paths::get_log_dir_path()
    }

    /// Displays current configuration settings to stdout.
    pub async fn display() -> Result<(), AppError> {
        let config_path = get_config_path();
        let log_dir = get_log_dir_path();
        let config = Config::load().await?;

        println!("\nCurrent Configuration");
        println!("────────────────────────────────────");
        println!("Config Location:");
        if Path::new(&config_path).exists() {
            println!("{config_path}");
        } else {
            println!("{config_path} (not present, using defaults)");
        }
        println!("────────────────────────────────────");
        println!("API Base URL:     {}", config.api_base_url);
        println!("Home URL:         {}", config.home_url);
        println!("Transport:        {}", config.transport);
        println!("Concurrency:      {}", config.concurrency);
        println!("Statistics:       {}", config.include_statistics);
        println!("HTTP Timeout:     {} seconds", config.http_timeout_seconds);
        println!(
            "Retry:            {} attempts, {} ms base delay",
            config.retry.max_attempts, config.retry.base_delay_ms
        );
        println!("────────────────────────────────────");
        println!("Log File Location:");
        if let Some(custom_path) = &config.log_file_path {
            println!("{custom_path}");
        } else {
            println!("{log_dir}/darts_fetch.log");
            println!("(Default location)");
        }

        Ok(())
    }

    /// Saves configuration to a custom file path, creating the parent
    /// directory when needed.
    ///
    /// # Errors
    /// * `AppError::Config` - If the provided path has no parent directory
    /// * `AppError::Io` - If there's an I/O error creating directories or writing the file
    /// * `AppError::TomlSerialize` - If there's an error serializing the configuration
    pub async fn save_to_path(&self, path: &str) -> Result<(), AppError> {
        let config_dir = Path::new(path).parent().ok_or_else(|| {
            AppError::config_error(format!("Path '{path}' has no parent directory"))
        })?;

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).await?;
        }
        let mut normalized = self.clone();
        normalized.api_base_url = self.api_base_url.trim_end_matches('/').to_string();

        let content = toml::to_string_pretty(&normalized)?;
        let mut file = fs::File::create(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Loads configuration from a custom file path.
    pub async fn load_from_path(path: &str) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

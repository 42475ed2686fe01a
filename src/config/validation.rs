use super::Config;
use crate::error::AppError;
use std::path::Path;

/// Validates the configuration settings
///
/// # Validation Rules
/// - API base URL and home URL must be http(s) URLs
/// - Concurrency and max attempts must be at least 1
/// - Backoff jitter cannot exceed the base delay
/// - If log file path is provided, it cannot be empty and its parent must be creatable
pub fn validate_config(config: &Config) -> Result<(), AppError> {
    validate_url("API base URL", &config.api_base_url)?;
    validate_url("Home URL", &config.home_url)?;

    if config.concurrency == 0 {
        return Err(AppError::config_error("Concurrency must be at least 1"));
    }

    if config.http_timeout_seconds == 0 {
        return Err(AppError::config_error("HTTP timeout must be at least 1 second"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(AppError::config_error("Retry max_attempts must be at least 1"));
    }
    if retry.jitter_ms > retry.base_delay_ms {
        return Err(AppError::config_error(format!(
            "Retry jitter ({} ms) cannot exceed base delay ({} ms)",
            retry.jitter_ms, retry.base_delay_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(AppError::config_error("User agent cannot be empty"));
    }

    if let Some(log_path) = &config.log_file_path {
        if log_path.is_empty() {
            return Err(AppError::config_error("Log file path cannot be empty"));
        }

        if let Some(parent) = Path::new(log_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::config_error(format!(
                    "Cannot create log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}

fn validate_url(label: &str, url: &str) -> Result<(), AppError> {
    if url.is_empty() {
        return Err(AppError::config_error(format!("{label} cannot be empty")));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::config_error(format!(
            "{label} must start with http:// or https://"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_base_url() {
        let config = Config {
            api_base_url: String::new(),
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_url_without_scheme() {
        let config = Config {
            home_url: "www.sofascore.com".to_string(),
            ..Config::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("Home URL"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_jitter_above_base_delay() {
        let mut config = Config::default();
        config.retry.base_delay_ms = 100;
        config.retry.jitter_ms = 101;
        assert!(validate_config(&config).is_err());

        config.retry.jitter_ms = 100;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_creates_log_parent_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("a").join("b").join("darts.log");
        let config = Config {
            log_file_path: Some(log_path.to_string_lossy().to_string()),
            ..Config::default()
        };
        assert!(validate_config(&config).is_ok());
        assert!(log_path.parent().unwrap().exists());
    }
}

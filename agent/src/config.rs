//! Configuration module for SessionTap Agent.
//!
//! A [`Config`] can be built in code or parsed from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SESSIONTAP_SITE_ID` | Yes | - | Site identifier sent with every batch |
//! | `SESSIONTAP_API_ENDPOINT` | Yes | - | Collector base URL (e.g., `https://collector.example.com`) |
//! | `SESSIONTAP_DEBUG` | No | `false` | Enable debug logging (`1`, `true`, `yes`, `on`) |
//! | `SESSIONTAP_REQUEST_TIMEOUT_SECS` | No | 30 | Per-request timeout for delivery |
//! | `SESSIONTAP_MAX_QUEUE_LEN` | No | unbounded | Drop-oldest bound on buffered events |
//!
//! # Example
//!
//! ```no_run
//! use sessiontap_agent::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Collector: {}", config.api_endpoint);
//! ```

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::delivery::{RetryPolicy, DEFAULT_REQUEST_TIMEOUT_SECS};

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value is missing or empty.
    #[error("missing required configuration value: {0}")]
    MissingValue(String),

    /// A value is present but invalid.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Site identifier, sent as `websiteId`.
    pub site_id: String,

    /// Collector base URL; batches go to `<api_endpoint>/api/events`.
    pub api_endpoint: String,

    /// Whether failures are logged at debug level.
    pub debug_logging: bool,

    /// Per-request timeout for delivery.
    pub request_timeout: Duration,

    /// Optional bound on buffered events. `None` means unbounded.
    pub max_queue_len: Option<usize>,

    /// Delay policy between failed delivery attempts.
    pub retry: RetryPolicy,
}

impl Config {
    /// Creates a configuration with default optional settings.
    #[must_use]
    pub fn new(site_id: impl Into<String>, api_endpoint: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            api_endpoint: api_endpoint.into(),
            debug_logging: false,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_queue_len: None,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_queue_len(mut self, max_queue_len: usize) -> Self {
        self.max_queue_len = Some(max_queue_len);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Checks that all required values are present and sane.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `site_id` or `api_endpoint` is empty
    /// - `api_endpoint` is not an `http://` or `https://` URL
    /// - `request_timeout` is zero
    /// - `max_queue_len` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_id.trim().is_empty() {
            return Err(ConfigError::MissingValue("site_id".to_string()));
        }

        let endpoint = self.api_endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingValue("api_endpoint".to_string()));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "api_endpoint".to_string(),
                message: format!("expected http(s) URL, got '{endpoint}'"),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout".to_string(),
                message: "timeout must be greater than 0".to_string(),
            });
        }

        if self.max_queue_len == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_queue_len".to_string(),
                message: "queue length must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `SESSIONTAP_SITE_ID` or `SESSIONTAP_API_ENDPOINT` is not set
    /// - an optional variable is set but cannot be parsed
    /// - the resulting configuration fails [`Config::validate`]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required
        let site_id = required_var("SESSIONTAP_SITE_ID")?;
        let api_endpoint = required_var("SESSIONTAP_API_ENDPOINT")?;

        let mut config = Self::new(site_id, api_endpoint);

        // Optional: SESSIONTAP_DEBUG (default: false)
        if let Ok(val) = env::var("SESSIONTAP_DEBUG") {
            config.debug_logging = parse_bool("SESSIONTAP_DEBUG", &val)?;
        }

        // Optional: SESSIONTAP_REQUEST_TIMEOUT_SECS (default: 30, must be > 0)
        if let Ok(val) = env::var("SESSIONTAP_REQUEST_TIMEOUT_SECS") {
            let secs = parse_positive("SESSIONTAP_REQUEST_TIMEOUT_SECS", &val)?;
            config.request_timeout = Duration::from_secs(secs as u64);
        }

        // Optional: SESSIONTAP_MAX_QUEUE_LEN (default: unbounded, must be > 0)
        if let Ok(val) = env::var("SESSIONTAP_MAX_QUEUE_LEN") {
            config.max_queue_len = Some(parse_positive("SESSIONTAP_MAX_QUEUE_LEN", &val)?);
        }

        config.validate()?;
        Ok(config)
    }
}

fn required_var(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingValue(key.to_string()))
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
    }
}

fn parse_positive(key: &str, val: &str) -> Result<usize, ConfigError> {
    let parsed = val
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected positive integer, got '{val}'"),
        })?;

    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all SESSIONTAP_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("SESSIONTAP_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("SESSIONTAP_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_missing_site_id() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_API_ENDPOINT", "https://collector.test");

            let err = Config::from_env().unwrap_err();
            assert_eq!(
                err,
                ConfigError::MissingValue("SESSIONTAP_SITE_ID".to_string())
            );
        });
    }

    #[test]
    #[serial]
    fn test_missing_endpoint() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_SITE_ID", "site-1");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingValue(ref s) if s == "SESSIONTAP_API_ENDPOINT"));
        });
    }

    #[test]
    #[serial]
    fn test_minimal_config() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_SITE_ID", "site-1");
            env::set_var("SESSIONTAP_API_ENDPOINT", "https://collector.test");

            let config = Config::from_env().expect("should parse minimal config");

            assert_eq!(config.site_id, "site-1");
            assert_eq!(config.api_endpoint, "https://collector.test");
            assert!(!config.debug_logging);
            assert_eq!(
                config.request_timeout,
                Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
            );
            assert!(config.max_queue_len.is_none());
            assert_eq!(config.retry, RetryPolicy::default());
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_SITE_ID", "site-1");
            env::set_var("SESSIONTAP_API_ENDPOINT", "http://localhost:3000/");
            env::set_var("SESSIONTAP_DEBUG", "yes");
            env::set_var("SESSIONTAP_REQUEST_TIMEOUT_SECS", "5");
            env::set_var("SESSIONTAP_MAX_QUEUE_LEN", "5000");

            let config = Config::from_env().expect("should parse full config");

            assert!(config.debug_logging);
            assert_eq!(config.request_timeout, Duration::from_secs(5));
            assert_eq!(config.max_queue_len, Some(5000));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_debug_flag() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_SITE_ID", "site-1");
            env::set_var("SESSIONTAP_API_ENDPOINT", "https://collector.test");
            env::set_var("SESSIONTAP_DEBUG", "maybe");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "SESSIONTAP_DEBUG"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_queue_len_rejected() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_SITE_ID", "site-1");
            env::set_var("SESSIONTAP_API_ENDPOINT", "https://collector.test");
            env::set_var("SESSIONTAP_MAX_QUEUE_LEN", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "SESSIONTAP_MAX_QUEUE_LEN" && message.contains("greater than 0")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_non_numeric_timeout_rejected() {
        with_clean_env(|| {
            env::set_var("SESSIONTAP_SITE_ID", "site-1");
            env::set_var("SESSIONTAP_API_ENDPOINT", "https://collector.test");
            env::set_var("SESSIONTAP_REQUEST_TIMEOUT_SECS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "SESSIONTAP_REQUEST_TIMEOUT_SECS"
            ));
        });
    }

    #[test]
    fn test_validate_rejects_blank_site() {
        let config = Config::new("  ", "https://collector.test");
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingValue("site_id".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_non_http_endpoint() {
        let config = Config::new("site-1", "ftp://collector.test");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "api_endpoint"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config =
            Config::new("site-1", "https://collector.test").with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::new("site-1", "https://collector.test")
            .with_debug_logging(true)
            .with_max_queue_len(10)
            .with_retry_policy(RetryPolicy::immediate());

        assert!(config.debug_logging);
        assert_eq!(config.max_queue_len, Some(10));
        assert_eq!(config.retry, RetryPolicy::immediate());
        assert!(config.validate().is_ok());
    }
}

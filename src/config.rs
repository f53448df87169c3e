//! Configuration for the error handler, circuit breakers and recovery service.
//!
//! Every struct has production defaults. [`ResilienceConfig::from_env`]
//! overlays `RESILIENCE_*` environment variables on top of them:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RESILIENCE_ENABLE_RETRY` | `handler.enable_retry` |
//! | `RESILIENCE_MAX_RETRIES` | `handler.retry_policy.max_attempts` |
//! | `RESILIENCE_RETRY_DELAY_MS` | `handler.retry_policy.initial_delay` |
//! | `RESILIENCE_MAX_DELAY_MS` | `handler.retry_policy.max_delay` |
//! | `RESILIENCE_EXPONENTIAL_BACKOFF` | `handler.retry_policy.exponential_backoff` |
//! | `RESILIENCE_ENABLE_LOGGING` | `handler.enable_logging` |
//! | `RESILIENCE_ENABLE_INCIDENT_REPORTING` | `handler.enable_incident_reporting` |
//! | `RESILIENCE_ENABLE_USER_NOTIFICATION` | `handler.enable_user_notification` |
//! | `RESILIENCE_INCIDENT_RETENTION` | `handler.incident_retention` |
//! | `RESILIENCE_FAILURE_THRESHOLD` | `circuit_breaker.failure_threshold` |
//! | `RESILIENCE_RESET_TIMEOUT_MS` | `circuit_breaker.reset_timeout` |
//! | `RESILIENCE_MONITORING_PERIOD_MS` | `circuit_breaker.monitoring_period` |

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ErrorCode;
use crate::logging::log_debug;
use crate::recovery::RecoveryConfig;
use crate::retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// A value parsed but is outside its allowed range
    #[error("Invalid configuration: {message}")]
    OutOfRange { message: String },
}

/// Error handler behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// When false, `execute_with_retry` makes a single attempt
    pub enable_retry: bool,
    pub retry_policy: RetryPolicy,
    pub enable_logging: bool,
    /// Gates incident creation in `handle_error`. Security and LGPD
    /// handlers always create incidents
    pub enable_incident_reporting: bool,
    /// When false, results carry a generic user message
    pub enable_user_notification: bool,
    /// Codes that `execute_with_retry` retries
    pub retryable_codes: HashSet<ErrorCode>,
    /// Maximum incidents kept in memory. `None` keeps everything
    pub incident_retention: Option<usize>,
}

impl HandlerConfig {
    pub fn default_retryable_codes() -> HashSet<ErrorCode> {
        HashSet::from([
            ErrorCode::DatabaseError,
            ErrorCode::NetworkError,
            ErrorCode::StorageError,
            ErrorCode::IntegrationError,
            ErrorCode::DataSyncError,
        ])
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            enable_retry: true,
            retry_policy: RetryPolicy::default(),
            enable_logging: true,
            enable_incident_reporting: true,
            enable_user_notification: true,
            retryable_codes: Self::default_retryable_codes(),
            incident_retention: None,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub handler: HandlerConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub recovery: RecoveryConfig,
}

impl ResilienceConfig {
    /// Build configuration from defaults plus `RESILIENCE_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but cannot
    /// be parsed, and [`ConfigError::OutOfRange`] if the result fails
    /// [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let handler = &mut config.handler;

        if let Some(value) = env_flag("RESILIENCE_ENABLE_RETRY")? {
            handler.enable_retry = value;
        }
        if let Some(value) = env_parse::<u32>("RESILIENCE_MAX_RETRIES")? {
            handler.retry_policy.max_attempts = value;
        }
        if let Some(value) = env_millis("RESILIENCE_RETRY_DELAY_MS")? {
            handler.retry_policy.initial_delay = value;
        }
        if let Some(value) = env_millis("RESILIENCE_MAX_DELAY_MS")? {
            handler.retry_policy.max_delay = value;
        }
        if let Some(value) = env_flag("RESILIENCE_EXPONENTIAL_BACKOFF")? {
            handler.retry_policy.exponential_backoff = value;
        }
        if let Some(value) = env_flag("RESILIENCE_ENABLE_LOGGING")? {
            handler.enable_logging = value;
        }
        if let Some(value) = env_flag("RESILIENCE_ENABLE_INCIDENT_REPORTING")? {
            handler.enable_incident_reporting = value;
        }
        if let Some(value) = env_flag("RESILIENCE_ENABLE_USER_NOTIFICATION")? {
            handler.enable_user_notification = value;
        }
        if let Some(value) = env_parse::<usize>("RESILIENCE_INCIDENT_RETENTION")? {
            handler.incident_retention = Some(value);
        }

        let breaker = &mut config.circuit_breaker;
        if let Some(value) = env_parse::<u32>("RESILIENCE_FAILURE_THRESHOLD")? {
            breaker.failure_threshold = value;
        }
        if let Some(value) = env_millis("RESILIENCE_RESET_TIMEOUT_MS")? {
            breaker.reset_timeout = value;
        }
        if let Some(value) = env_millis("RESILIENCE_MONITORING_PERIOD_MS")? {
            breaker.monitoring_period = value;
        }

        config.validate()?;
        log_debug!(config = ?config, "Resilience configuration loaded from environment");
        Ok(config)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.handler.retry_policy;
        if policy.max_attempts == 0 {
            return Err(out_of_range("retry max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&policy.jitter) {
            return Err(out_of_range("retry jitter must be between 0.0 and 1.0"));
        }
        if policy.backoff_multiplier < 1.0 {
            return Err(out_of_range("retry backoff_multiplier must be at least 1.0"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(out_of_range("circuit breaker failure_threshold must be at least 1"));
        }
        if self.recovery.max_attempts == 0 {
            return Err(out_of_range("recovery max_attempts must be at least 1"));
        }
        if self.handler.incident_retention == Some(0) {
            return Err(out_of_range("incident_retention must be at least 1 when set"));
        }
        Ok(())
    }
}

fn out_of_range(message: &str) -> ConfigError {
    ConfigError::OutOfRange {
        message: message.to_string(),
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn env_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}

//! Strategy-driven error recovery.
//!
//! A [`RecoveryStrategy`] recognizes one family of failures and returns a
//! [`RecoveryResult`] verdict saying whether the failure can be retried
//! automatically or needs a human. [`ErrorRecoveryService`] asks each
//! registered strategy in turn (first match wins) and uses the verdict to
//! drive a retry loop with a linear delay.
//!
//! Built-in strategies are consulted in this order: database, integration,
//! storage, network. Strategies added with
//! [`add_strategy`](ErrorRecoveryService::add_strategy) come after them.
//!
//! ```rust,no_run
//! use clinic_resilience::{ErrorContext, ErrorRecoveryService, ServiceError};
//!
//! # async fn example() -> clinic_resilience::ServiceResult<()> {
//! let service = ErrorRecoveryService::default();
//! let context = ErrorContext::new("load_exam_results");
//!
//! let results = service
//!     .execute_with_recovery(
//!         || async { Err::<String, _>(ServiceError::database("Connection reset", "exam_results")) },
//!         &context,
//!     )
//!     .await;
//! assert!(results.is_err());
//! # Ok(())
//! # }
//! ```

mod strategies;

pub use strategies::{
    DatabaseRecoveryStrategy, IntegrationRecoveryStrategy, NetworkRecoveryStrategy,
    StorageRecoveryStrategy,
};

pub(crate) use strategies::extract_status_code;

use crate::cancel::CancelToken;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::config::ResilienceConfig;
use crate::context::ErrorContext;
use crate::error::{ServiceError, ServiceResult};
use crate::logging::{log_debug, log_error, log_warn};
use crate::normalize::normalize_error;
use crate::retry::cancelled;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Verdict of a single strategy invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// The failure was absorbed; the caller may treat the operation as recovered
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Retrying will not help until someone acts
    pub requires_manual_intervention: bool,
}

impl RecoveryResult {
    /// Not recovered yet, but safe to retry automatically.
    pub fn automatic(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            requires_manual_intervention: false,
        }
    }

    pub fn manual(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            requires_manual_intervention: true,
        }
    }

    /// Failure absorbed, e.g. by degrading to another source.
    pub fn recovered(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            requires_manual_intervention: false,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Policy object for one family of failures
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    fn can_handle(&self, error: &ServiceError) -> bool;

    async fn recover(&self, error: &ServiceError, context: &ErrorContext) -> RecoveryResult;
}

/// Recovery loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Orchestrates strategy selection and verdict-driven retries
pub struct ErrorRecoveryService {
    config: RecoveryConfig,
    integration: Arc<IntegrationRecoveryStrategy>,
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl Default for ErrorRecoveryService {
    fn default() -> Self {
        Self::new(RecoveryConfig::default(), CircuitBreakerConfig::default())
    }
}

impl ErrorRecoveryService {
    pub fn new(config: RecoveryConfig, breaker_config: CircuitBreakerConfig) -> Self {
        let integration = Arc::new(IntegrationRecoveryStrategy::new(breaker_config));
        let strategies: Vec<Arc<dyn RecoveryStrategy>> = vec![
            Arc::new(DatabaseRecoveryStrategy),
            integration.clone(),
            Arc::new(StorageRecoveryStrategy),
            Arc::new(NetworkRecoveryStrategy),
        ];
        Self {
            config,
            integration,
            strategies,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.recovery.clone(), config.circuit_breaker.clone())
    }

    /// Register a custom strategy, consulted after every existing one.
    pub fn add_strategy(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        log_debug!(strategy = strategy.name(), "Recovery strategy registered");
        self.strategies.push(strategy);
    }

    /// The integration strategy, for direct breaker-protected calls.
    pub fn integration_strategy(&self) -> Arc<IntegrationRecoveryStrategy> {
        Arc::clone(&self.integration)
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Ask the first strategy that recognizes `error` for a verdict.
    pub async fn attempt_recovery(
        &self,
        error: &ServiceError,
        context: &ErrorContext,
    ) -> RecoveryResult {
        let Some(strategy) = self
            .strategies
            .iter()
            .find(|strategy| strategy.can_handle(error))
        else {
            log_warn!(
                operation = %context.operation,
                error_code = error.code().as_str(),
                "No recovery strategy matched"
            );
            return RecoveryResult::manual(
                "No recovery strategy available. Manual intervention required",
            );
        };

        let verdict = strategy.recover(error, context).await;
        log_debug!(
            operation = %context.operation,
            strategy = strategy.name(),
            error_code = error.code().as_str(),
            success = verdict.success,
            requires_manual_intervention = verdict.requires_manual_intervention,
            message = %verdict.message,
            "Recovery strategy produced verdict"
        );
        verdict
    }

    /// Run `operation`, consulting strategies after each failure.
    ///
    /// Stops with the normalized error when a verdict requires manual
    /// intervention or `max_attempts` is reached.
    pub async fn execute_with_recovery<F, Fut, T, E>(
        &self,
        operation: F,
        context: &ErrorContext,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.execute_with_recovery_until_cancelled(operation, context, &CancelToken::never())
            .await
    }

    /// [`execute_with_recovery`](Self::execute_with_recovery) with a per-call
    /// attempt limit instead of the configured one.
    ///
    /// Breaker state in the integration strategy is shared with every other
    /// call on this service.
    pub async fn execute_with_recovery_attempts<F, Fut, T, E>(
        &self,
        operation: F,
        context: &ErrorContext,
        max_attempts: u32,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.recovery_loop(operation, context, &CancelToken::never(), max_attempts)
            .await
    }

    /// [`execute_with_recovery`](Self::execute_with_recovery) that stops
    /// with a cancellation error as soon as `cancel` fires.
    pub async fn execute_with_recovery_until_cancelled<F, Fut, T, E>(
        &self,
        operation: F,
        context: &ErrorContext,
        cancel: &CancelToken,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.recovery_loop(operation, context, cancel, self.config.max_attempts)
            .await
    }

    async fn recovery_loop<F, Fut, T, E>(
        &self,
        mut operation: F,
        context: &ErrorContext,
        cancel: &CancelToken,
        max_attempts: u32,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(context, attempt).error),
                outcome = operation() => outcome,
            };
            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => normalize_error(error, context),
            };

            let verdict = self.attempt_recovery(&error, context).await;
            if verdict.requires_manual_intervention || attempt >= max_attempts {
                log_error!(
                    operation = %context.operation,
                    attempts = attempt,
                    error_code = error.code().as_str(),
                    requires_manual_intervention = verdict.requires_manual_intervention,
                    error = %error,
                    "Recovery gave up"
                );
                return Err(error);
            }

            let delay = self.config.base_delay * attempt;
            log_debug!(
                operation = %context.operation,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis(),
                "Recovery verdict allows retry"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(context, attempt).error),
                _ = sleep(delay) => {}
            }
        }
    }
}

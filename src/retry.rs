//! Retry logic with exponential backoff
//!
//! This module provides the attempt loop used by the error handler:
//! - Exponential backoff: 1s, 2s, 4s, ... capped at `max_delay`
//! - Flat delays when exponential backoff is disabled
//! - Optional jitter to spread out synchronized retries
//! - Immediate exit on failures the caller marks as non-retryable
//! - Cancellation checked while the operation runs and while sleeping

use crate::cancel::CancelToken;
use crate::context::ErrorContext;
use crate::error::ServiceError;
use crate::logging::{log_debug, log_error};
use crate::normalize::normalize_error;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Retry policy configuration for wrapped operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// When false every retry waits `initial_delay`
    pub exponential_backoff: bool,
    /// Extra random delay as a fraction of the computed delay (0.0..=1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            exponential_backoff: true,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = if self.exponential_backoff {
            let exponent = attempt.saturating_sub(1) as i32;
            let delay_seconds =
                self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
            // Unvalidated policies can produce negative or NaN delays
            Duration::from_secs_f64(delay_seconds.max(0.0).min(self.max_delay.as_secs_f64()))
        } else {
            self.initial_delay
        };

        if self.jitter <= 0.0 {
            return base;
        }
        let jitter = fastrand::f64() * self.jitter.min(1.0);
        Duration::from_secs_f64(base.as_secs_f64() * (1.0 + jitter))
    }
}

/// Terminal failure of a retry loop.
#[derive(Debug)]
pub struct RetryFailure {
    /// Normalized error of the last attempt
    pub error: ServiceError,
    /// Attempts actually made
    pub attempts: u32,
}

/// Attempt loop driven by a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    log_exhaustion: bool,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            log_exhaustion: true,
        }
    }

    /// Turn the error-level exhaustion log on or off. Debug traces are
    /// unaffected.
    pub fn with_exhaustion_logging(mut self, enabled: bool) -> Self {
        self.log_exhaustion = enabled;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn logs_exhaustion(&self) -> bool {
        self.log_exhaustion
    }

    /// Run `operation` until it succeeds, fails with an error rejected by
    /// `is_retryable`, runs out of attempts, or `cancel` fires.
    pub async fn execute<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        context: &ErrorContext,
        cancel: &CancelToken,
        is_retryable: P,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
        P: Fn(&ServiceError) -> bool,
    {
        let start_time = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            log_debug!(
                operation = %context.operation,
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing operation with retry logic"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(context, attempt)),
                outcome = operation() => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    log_debug!(
                        operation = %context.operation,
                        attempt = attempt,
                        duration_ms = start_time.elapsed().as_millis(),
                        "Operation succeeded"
                    );
                    return Ok(value);
                }
                Err(error) => normalize_error(error, context),
            };

            if !is_retryable(&error) {
                log_debug!(
                    operation = %context.operation,
                    error_code = error.code().as_str(),
                    attempt = attempt,
                    "Non-retryable failure, giving up immediately"
                );
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                });
            }

            if attempt >= max_attempts {
                if self.log_exhaustion {
                    log_error!(
                        operation = %context.operation,
                        attempts = attempt,
                        total_duration_ms = start_time.elapsed().as_millis(),
                        error_code = error.code().as_str(),
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                }
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.policy.calculate_delay(attempt);
            log_debug!(
                operation = %context.operation,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis(),
                error = %error,
                "Operation failed, retrying after delay"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(context, attempt)),
                _ = sleep(delay) => {}
            }
        }
    }
}

/// Failure reported when `cancel` fires mid-loop.
pub(crate) fn cancelled(context: &ErrorContext, attempts: u32) -> RetryFailure {
    log_debug!(
        operation = %context.operation,
        attempts = attempts,
        "Retry loop cancelled"
    );
    RetryFailure {
        error: ServiceError::cancelled(context.operation.clone()).with_context(context.clone()),
        attempts,
    }
}

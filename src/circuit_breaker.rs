//! Per-target circuit breaker.
//!
//! One breaker guards one collaborator (usually an external system name).
//! It counts failures and, once `failure_threshold` is reached, stops calling
//! the target until `reset_timeout` has passed since the last failure:
//!
//! ```text
//! Closed --(failures >= threshold)--> Open
//! Open --(cool-down elapsed, checked on next call)--> HalfOpen
//! HalfOpen --(probe succeeds)--> Closed (failures = 0)
//! HalfOpen --(probe fails)--> Open (cool-down restarts)
//! ```
//!
//! Isolated successes while closed do not decay the failure counter; only a
//! successful half-open probe clears it. While a probe is in flight every
//! other call is treated as if the breaker were open.
//!
//! State lives behind a mutex that is never held across an `.await`, so a
//! breaker can be shared between tasks through an `Arc`.

use crate::logging::{log_debug, log_info, log_warn};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Breaker thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures that open the breaker
    pub failure_threshold: u32,
    /// Cool-down after the last failure before a probe is allowed
    pub reset_timeout: Duration,
    /// Reporting window. Informational only
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(300),
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Testing if the target recovered
}

/// Snapshot of a breaker's bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerState {
    pub failures: u32,
    pub last_failure_time: Option<Instant>,
    pub state: CircuitState,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            failures: 0,
            last_failure_time: None,
            state: CircuitState::Closed,
        }
    }
}

/// Outcome of a breaker-protected call that did not produce a value.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The breaker rejected the call without running it
    #[error("Circuit breaker is open for {name}")]
    Open { name: String },

    /// The operation (or its fallback) ran and failed
    #[error("{0}")]
    Failed(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: CircuitBreakerState,
    probe_in_flight: bool,
}

/// Circuit breaker for one protected target
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        log_debug!(
            circuit_breaker = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis(),
            monitoring_period_ms = config.monitoring_period.as_millis(),
            "Circuit breaker created"
        );
        Self {
            name,
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current bookkeeping. Does not trigger the open → half-open check.
    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().snapshot.clone()
    }

    /// Force the breaker back to closed with a clean counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.snapshot = CircuitBreakerState::default();
        inner.probe_in_flight = false;
        log_info!(circuit_breaker = %self.name, "Circuit breaker manually reset");
    }

    /// Run `operation` through the breaker, rejecting it while open.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(operation, None::<fn() -> std::future::Ready<Result<T, E>>>)
            .await
    }

    /// Run `operation` through the breaker, using `fallback` whenever the
    /// breaker is open or the failure just opened it.
    pub async fn execute_with_fallback<F, Fut, FB, FutB, T, E>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T, E>>,
    {
        self.run(operation, Some(fallback)).await
    }

    async fn run<F, Fut, FB, FutB, T, E>(
        &self,
        operation: F,
        fallback: Option<FB>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T, E>>,
    {
        let Some(probe) = self.admit() else {
            return match fallback {
                Some(fallback) => {
                    log_debug!(
                        circuit_breaker = %self.name,
                        "Circuit breaker open, using fallback"
                    );
                    fallback().await.map_err(CircuitError::Failed)
                }
                None => Err(CircuitError::Open {
                    name: self.name.clone(),
                }),
            };
        };

        match operation().await {
            Ok(value) => {
                self.record_success(probe.finish());
                Ok(value)
            }
            Err(error) => {
                let opened = self.record_failure(probe.finish());
                match fallback {
                    Some(fallback) if opened => {
                        log_debug!(
                            circuit_breaker = %self.name,
                            "Circuit breaker opened by this failure, using fallback"
                        );
                        fallback().await.map_err(CircuitError::Failed)
                    }
                    _ => Err(CircuitError::Failed(error)),
                }
            }
        }
    }

    /// Decide whether a call may run. `None` means reject.
    fn admit(&self) -> Option<ProbeGuard<'_>> {
        let mut inner = self.inner.lock();
        match inner.snapshot.state {
            CircuitState::Closed => Some(ProbeGuard::plain(self)),
            CircuitState::HalfOpen if inner.probe_in_flight => None,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Some(ProbeGuard::probe(self))
            }
            CircuitState::Open => {
                let cooled_down = inner
                    .snapshot
                    .last_failure_time
                    .map_or(true, |last| last.elapsed() >= self.config.reset_timeout);
                if !cooled_down {
                    return None;
                }
                log_debug!(
                    circuit_breaker = %self.name,
                    reset_timeout_ms = self.config.reset_timeout.as_millis(),
                    "Circuit breaker attempting recovery"
                );
                inner.snapshot.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                Some(ProbeGuard::probe(self))
            }
        }
    }

    fn record_success(&self, was_probe: bool) {
        let mut inner = self.inner.lock();
        if was_probe && inner.snapshot.state == CircuitState::HalfOpen {
            log_info!(
                circuit_breaker = %self.name,
                "Circuit breaker recovered, returning to closed state"
            );
            inner.snapshot = CircuitBreakerState::default();
        }
        if was_probe {
            inner.probe_in_flight = false;
        }
    }

    /// Returns true when the breaker is open after this failure.
    fn record_failure(&self, was_probe: bool) -> bool {
        let mut inner = self.inner.lock();
        let previous = inner.snapshot.state;
        inner.snapshot.failures += 1;
        inner.snapshot.last_failure_time = Some(Instant::now());

        let reopen_probe = was_probe && previous == CircuitState::HalfOpen;
        if reopen_probe || inner.snapshot.failures >= self.config.failure_threshold {
            if previous != CircuitState::Open {
                log_warn!(
                    circuit_breaker = %self.name,
                    failure_count = inner.snapshot.failures,
                    failure_threshold = self.config.failure_threshold,
                    reset_timeout_ms = self.config.reset_timeout.as_millis(),
                    "Circuit breaker opened due to repeated failures"
                );
            }
            inner.snapshot.state = CircuitState::Open;
        }
        if was_probe {
            inner.probe_in_flight = false;
        }
        inner.snapshot.state == CircuitState::Open
    }
}

/// Admission ticket. Releases the half-open probe slot if the call is
/// dropped before it completes.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    is_probe: bool,
}

impl<'a> ProbeGuard<'a> {
    fn plain(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            is_probe: false,
        }
    }

    fn probe(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            is_probe: true,
        }
    }

    /// Disarm the guard once the call has completed. Returns whether the
    /// call was the half-open probe.
    fn finish(mut self) -> bool {
        std::mem::replace(&mut self.is_probe, false)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.is_probe {
            self.breaker.inner.lock().probe_in_flight = false;
        }
    }
}

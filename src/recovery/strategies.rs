//! Built-in recovery strategies, one per infrastructure error family.

use super::{RecoveryResult, RecoveryStrategy};
use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitError, CircuitState,
};
use crate::context::ErrorContext;
use crate::error::{ErrorKind, ServiceError, ServiceResult, StorageBackend};
use crate::logging::log_debug;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// Database
// ============================================================================

/// Relational store failures, classified by message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseRecoveryStrategy;

#[async_trait]
impl RecoveryStrategy for DatabaseRecoveryStrategy {
    fn name(&self) -> &str {
        "database"
    }

    fn can_handle(&self, error: &ServiceError) -> bool {
        matches!(error.kind(), ErrorKind::Database { .. })
    }

    async fn recover(&self, error: &ServiceError, _context: &ErrorContext) -> RecoveryResult {
        let message = error.message().to_lowercase();

        if message.contains("connection") || message.contains("timeout") {
            RecoveryResult::automatic("Database connection issue detected. Retrying with backoff")
        } else if message.contains("unique")
            || message.contains("foreign key")
            || message.contains("constraint")
        {
            RecoveryResult::manual("Data constraint violation. Manual review of the record is required")
        } else if message.contains("deadlock") {
            RecoveryResult::automatic("Database deadlock detected. Retrying transaction")
        } else {
            RecoveryResult::manual("Unrecognized database error. Manual intervention required")
        }
    }
}

// ============================================================================
// Integration
// ============================================================================

/// Third-party system failures.
///
/// Owns one [`CircuitBreaker`] per external system name, created on first
/// use. `recover` only reads breaker state; breakers are fed by calls made
/// through [`execute_with_circuit_breaker`](Self::execute_with_circuit_breaker).
#[derive(Debug, Default)]
pub struct IntegrationRecoveryStrategy {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl IntegrationRecoveryStrategy {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Breaker for `system`, created with the strategy's config if missing.
    pub fn circuit_breaker(&self, system: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(system.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(system, self.config.clone()))),
        )
    }

    /// State of an existing breaker, without creating one.
    pub fn breaker_state(&self, system: &str) -> Option<CircuitBreakerState> {
        self.breakers.lock().get(system).map(|breaker| breaker.state())
    }

    /// Returns false when no breaker exists for `system`.
    pub fn reset_circuit_breaker(&self, system: &str) -> bool {
        match self.breakers.lock().get(system) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Call `system` through its breaker.
    ///
    /// An open breaker yields a `CIRCUIT_BREAKER_OPEN` error; failures that
    /// are not already taxonomy errors become integration errors for `system`.
    pub async fn execute_with_circuit_breaker<F, Fut, T, E>(
        &self,
        system: &str,
        operation: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let breaker = self.circuit_breaker(system);
        breaker
            .execute(operation)
            .await
            .map_err(|error| into_service_error(system, error))
    }

    /// Like [`execute_with_circuit_breaker`](Self::execute_with_circuit_breaker)
    /// but serves `fallback` while the breaker is open.
    pub async fn execute_with_circuit_breaker_or_fallback<F, Fut, FB, FutB, T, E>(
        &self,
        system: &str,
        operation: F,
        fallback: FB,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let breaker = self.circuit_breaker(system);
        breaker
            .execute_with_fallback(operation, fallback)
            .await
            .map_err(|error| into_service_error(system, error))
    }
}

fn into_service_error<E: Into<anyhow::Error>>(system: &str, error: CircuitError<E>) -> ServiceError {
    match error {
        CircuitError::Open { .. } => ServiceError::circuit_open(system),
        CircuitError::Failed(error) => {
            let error: anyhow::Error = error.into();
            match error.downcast::<ServiceError>() {
                Ok(service_error) => service_error,
                Err(other) => {
                    ServiceError::integration(system, other.to_string()).with_source(other)
                }
            }
        }
    }
}

#[async_trait]
impl RecoveryStrategy for IntegrationRecoveryStrategy {
    fn name(&self) -> &str {
        "integration"
    }

    fn can_handle(&self, error: &ServiceError) -> bool {
        matches!(
            error.kind(),
            ErrorKind::Integration { .. } | ErrorKind::DataSync { .. }
        )
    }

    async fn recover(&self, error: &ServiceError, _context: &ErrorContext) -> RecoveryResult {
        match error.kind() {
            ErrorKind::DataSync { system, entity } => RecoveryResult::automatic(format!(
                "Synchronization of {entity} with {system} will be retried by the scheduled sync"
            )),
            ErrorKind::Integration { system, .. } => {
                let state = self.breaker_state(system).unwrap_or_default();
                log_debug!(
                    system = %system,
                    circuit_state = ?state.state,
                    failures = state.failures,
                    "Integration recovery consulted circuit breaker"
                );
                if state.state == CircuitState::Open {
                    RecoveryResult::automatic(format!(
                        "{system} temporarily unavailable. Retrying after circuit breaker cool-down, using fallback meanwhile"
                    ))
                } else {
                    RecoveryResult::automatic(format!("Retrying {system} integration"))
                }
            }
            _ => RecoveryResult::manual("Not an integration failure"),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// File and cache storage failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageRecoveryStrategy;

#[async_trait]
impl RecoveryStrategy for StorageRecoveryStrategy {
    fn name(&self) -> &str {
        "storage"
    }

    fn can_handle(&self, error: &ServiceError) -> bool {
        matches!(error.kind(), ErrorKind::Storage { .. })
    }

    async fn recover(&self, error: &ServiceError, _context: &ErrorContext) -> RecoveryResult {
        match error.kind() {
            ErrorKind::Storage {
                backend: StorageBackend::Cache,
                ..
            } => RecoveryResult::recovered("Cache unavailable. Falling back to the primary store")
                .with_data(serde_json::json!({ "fallback": "primary_store" })),
            _ => RecoveryResult::manual("File storage failed. The file must be uploaded again"),
        }
    }
}

// ============================================================================
// Network
// ============================================================================

static STATUS_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:status(?:\s+code)?|http)\s*[:=]?\s*(\d{3})\b").ok());

/// HTTP-style status mentioned in a failure message, e.g. `status 503`.
pub(crate) fn extract_status_code(message: &str) -> Option<u16> {
    STATUS_PATTERN
        .as_ref()?
        .captures(message)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Transport failures, classified by message and status code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkRecoveryStrategy;

#[async_trait]
impl RecoveryStrategy for NetworkRecoveryStrategy {
    fn name(&self) -> &str {
        "network"
    }

    fn can_handle(&self, error: &ServiceError) -> bool {
        matches!(error.kind(), ErrorKind::Network { .. })
    }

    async fn recover(&self, error: &ServiceError, _context: &ErrorContext) -> RecoveryResult {
        let message = error.message().to_lowercase();
        let status = match error.kind() {
            ErrorKind::Network {
                status_code: Some(code),
                ..
            } => Some(*code),
            _ => extract_status_code(error.message()),
        };

        if message.contains("timeout") || message.contains("timed out") {
            return RecoveryResult::automatic("Network timeout. Retrying request");
        }
        if message.contains("connection") {
            return RecoveryResult::manual("Network connection lost. Check connectivity before retrying");
        }
        match status {
            Some(code) if code >= 500 => {
                RecoveryResult::automatic(format!("Server error ({code}). Retrying request"))
            }
            Some(429) => RecoveryResult::manual("Rate limit exceeded. Back off before retrying"),
            _ => RecoveryResult::manual("Network error. Manual intervention required"),
        }
    }
}

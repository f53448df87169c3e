//! # clinic-resilience
//!
//! Error-handling and recovery engine for clinical management use cases.
//!
//! ## Key Features
//!
//! - **Error Taxonomy**: Typed [`ServiceError`] kinds with stable codes, severities and
//!   display-safe user messages
//! - **Central Handler**: Normalization, severity-driven logging, retries with exponential
//!   backoff and ordered fallback chains
//! - **Incidents**: Security, LGPD and critical failures are recorded and escalated to the
//!   right stakeholders
//! - **Circuit Breakers**: One breaker per external system, with a single half-open probe
//! - **Recovery Strategies**: Pluggable verdicts for database, integration, storage and
//!   network failures
//! - **Cancellation**: Every retry loop can be stopped through a [`CancelToken`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use clinic_resilience::{ErrorContext, ErrorHandler, ErrorRecoveryService, ServiceError};
//!
//! # async fn example() -> clinic_resilience::ServiceResult<()> {
//! let handler = ErrorHandler::default();
//! let recovery = ErrorRecoveryService::default();
//! let context = ErrorContext::new("sync_appointments")
//!     .with_user("reception-01")
//!     .with_patient("patient-42");
//!
//! // Calls to a partner system go through its circuit breaker
//! let slots = recovery
//!     .integration_strategy()
//!     .execute_with_circuit_breaker("AppointmentSystem", || async {
//!         Ok::<_, ServiceError>(vec!["2024-03-01T09:00"])
//!     })
//!     .await?;
//!
//! // Local failures are retried with backoff
//! let saved = handler
//!     .execute_with_retry(|| async { Ok::<_, ServiceError>(slots.len()) }, &context)
//!     .await?;
//! assert_eq!(saved, 1);
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod cancel;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod incidents;
pub mod normalize;
pub mod recovery;
pub mod retry;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use cancel::{CancelHandle, CancelToken};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitError, CircuitState,
};
pub use config::{ConfigError, HandlerConfig, ResilienceConfig};
pub use context::ErrorContext;
pub use error::{
    ComplianceIssue, ErrorCode, ErrorKind, ErrorRecord, FieldError, ServiceError, ServiceResult,
    Severity, StorageBackend,
};
pub use handler::{
    fallback_operation, ErrorHandler, ErrorHandlingResult, FallbackOperation, RecoveryAction,
};
pub use incidents::{IncidentNotifier, IncidentReport, IncidentStore, Stakeholder, TracingNotifier};
pub use normalize::normalize_error;
pub use recovery::{
    DatabaseRecoveryStrategy, ErrorRecoveryService, IntegrationRecoveryStrategy,
    NetworkRecoveryStrategy, RecoveryConfig, RecoveryResult, RecoveryStrategy,
    StorageRecoveryStrategy,
};
pub use retry::{RetryExecutor, RetryFailure, RetryPolicy};

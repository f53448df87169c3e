//! Error taxonomy for clinical use cases and their collaborators.
//!
//! Every failure that leaves the resilience engine is a [`ServiceError`]: a
//! single kind ([`ErrorKind`]) carrying only its own fields, plus the shared
//! surface every consumer relies on:
//!
//! - a stable machine-readable [`ErrorCode`]
//! - a [`Severity`] that drives logging level and incident creation
//! - a display-safe [`user_message()`](ServiceError::user_message)
//! - an audit-safe [`ErrorRecord`] projection via
//!   [`to_json()`](ServiceError::to_json)
//!
//! # Constructing errors
//!
//! Use the associated constructors instead of building the struct by hand;
//! they fill in the message, timestamp and log the construction:
//!
//! ```rust
//! use clinic_resilience::{ErrorContext, FieldError, ServiceError};
//!
//! let err = ServiceError::validation(vec![FieldError::new(
//!     "birth_date",
//!     "Birth date cannot be in the future",
//!     "FUTURE_DATE",
//! )]);
//! assert_eq!(err.user_message(), "Birth date cannot be in the future");
//!
//! let err = ServiceError::not_found("Patient", "8f14e45f")
//!     .with_context(ErrorContext::new("load_patient"));
//! assert!(!err.user_message().contains("8f14e45f"));
//! ```
//!
//! # Kinds
//!
//! | Kind | Code | Severity |
//! |------|------|----------|
//! | `Validation` | `VALIDATION_ERROR` | Low |
//! | `NotFound` | `NOT_FOUND` | Medium |
//! | `Authorization` | `AUTHORIZATION_ERROR` | High |
//! | `SecurityViolation` | `SECURITY_VIOLATION` | carried by the error |
//! | `Database` | `DATABASE_ERROR` | High |
//! | `Storage` | `STORAGE_ERROR` | High |
//! | `Network` | `NETWORK_ERROR` | Medium |
//! | `Integration` | `INTEGRATION_ERROR` / `CIRCUIT_BREAKER_OPEN` | Medium |
//! | `DataSync` | `DATA_SYNC_ERROR` | Medium |
//! | `ComplianceViolation` | `LGPD_COMPLIANCE_ERROR` | Critical for violations, else High |
//! | `Cancelled` | `OPERATION_CANCELLED` | Low |

use crate::context::ErrorContext;
use crate::logging::log_debug;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Convenient result type for resilience operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Boxed underlying cause carried by infrastructure errors.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

// ============================================================================
// Classification types
// ============================================================================

/// Severity level for logging and incident decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected failure the user can fix (bad input).
    Low,
    /// Degraded collaborator, usually transient.
    Medium,
    /// Action failed and someone should look at it.
    High,
    /// Data integrity or legal exposure. Produces an incident.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Stable machine-readable error codes.
///
/// The string form (see [`as_str`](Self::as_str)) is part of the public
/// contract: retryable sets and audit records are keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    AuthorizationError,
    SecurityViolation,
    DatabaseError,
    StorageError,
    NetworkError,
    IntegrationError,
    CircuitBreakerOpen,
    DataSyncError,
    LgpdComplianceError,
    OperationCancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::AuthorizationError => "AUTHORIZATION_ERROR",
            Self::SecurityViolation => "SECURITY_VIOLATION",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::IntegrationError => "INTEGRATION_ERROR",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::DataSyncError => "DATA_SYNC_ERROR",
            Self::LgpdComplianceError => "LGPD_COMPLIANCE_ERROR",
            Self::OperationCancelled => "OPERATION_CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as submitted by the client
    pub field: String,
    /// Message safe to show next to the field
    pub message: String,
    /// Rule identifier, e.g. `REQUIRED` or `INVALID_CPF`
    pub code: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Backing medium of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Durable file/object storage (uploads, exported reports)
    File,
    /// Cache in front of a primary store
    Cache,
}

/// Data-protection (LGPD) issue behind a compliance error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceIssue {
    /// Processing already happened in breach of the law
    Violation,
    /// No valid consent on record for the processing purpose
    ConsentMissing,
    /// Data kept beyond its retention period
    RetentionExceeded,
    /// More personal data requested than the purpose needs
    DataMinimization,
}

/// The kind of a [`ServiceError`] together with its kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected by a business rule.
    Validation { errors: Vec<FieldError> },

    /// A referenced resource does not exist.
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// The user lacks permission for the action.
    Authorization {
        user_id: String,
        resource: String,
        action: String,
    },

    /// A request looked like an attack or tampering attempt.
    SecurityViolation {
        violation_type: String,
        severity: Severity,
    },

    /// Relational store failure.
    Database { operation: String },

    /// File or cache storage failure.
    Storage {
        operation: String,
        backend: StorageBackend,
    },

    /// Transport failure, optionally with an HTTP-style status.
    Network {
        operation: String,
        status_code: Option<u16>,
    },

    /// Third-party system failure, or a call rejected by its open breaker.
    Integration { system: String, circuit_open: bool },

    /// Synchronisation between the local store and an external system failed.
    DataSync { system: String, entity: String },

    /// Data-protection law (LGPD) requirement not met.
    ComplianceViolation {
        issue: ComplianceIssue,
        data_subject: Option<String>,
    },

    /// The caller cancelled the operation.
    Cancelled { operation: String },
}

impl ErrorKind {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Authorization { .. } => ErrorCode::AuthorizationError,
            Self::SecurityViolation { .. } => ErrorCode::SecurityViolation,
            Self::Database { .. } => ErrorCode::DatabaseError,
            Self::Storage { .. } => ErrorCode::StorageError,
            Self::Network { .. } => ErrorCode::NetworkError,
            Self::Integration {
                circuit_open: true, ..
            } => ErrorCode::CircuitBreakerOpen,
            Self::Integration { .. } => ErrorCode::IntegrationError,
            Self::DataSync { .. } => ErrorCode::DataSyncError,
            Self::ComplianceViolation { .. } => ErrorCode::LgpdComplianceError,
            Self::Cancelled { .. } => ErrorCode::OperationCancelled,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SecurityViolation { severity, .. } => *severity,
            Self::ComplianceViolation {
                issue: ComplianceIssue::Violation,
                ..
            } => Severity::Critical,
            Self::ComplianceViolation { .. } => Severity::High,
            Self::Authorization { .. } => Severity::High,
            Self::Database { .. } | Self::Storage { .. } => Severity::High,
            Self::Integration { .. } | Self::DataSync { .. } => Severity::Medium,
            Self::Validation { .. } | Self::Cancelled { .. } => Severity::Low,
            // Not-found and transport failures have no dedicated rule
            Self::NotFound { .. } | Self::Network { .. } => Severity::Medium,
        }
    }
}

// ============================================================================
// Service error
// ============================================================================

/// Structured failure produced or normalized by the resilience engine.
///
/// `Display` shows the internal message (for logs). Anything shown to an end
/// user must go through [`user_message()`](Self::user_message) instead.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    context: Option<ErrorContext>,
    timestamp: DateTime<Utc>,
    #[source]
    source: Option<BoxedCause>,
}

impl ServiceError {
    fn build(kind: ErrorKind, message: String) -> Self {
        log_debug!(
            error_code = kind.code().as_str(),
            severity = %kind.severity(),
            message = %message,
            "Structured error constructed"
        );
        Self {
            kind,
            message,
            context: None,
            timestamp: Utc::now(),
            source: None,
        }
    }

    // =========================================================================
    // Factory
    // =========================================================================

    pub fn validation(errors: Vec<FieldError>) -> Self {
        let message = match errors.as_slice() {
            [single] => format!("Validation failed for {}: {}", single.field, single.message),
            many => format!("Validation failed for {} fields", many.len()),
        };
        Self::build(ErrorKind::Validation { errors }, message)
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        let message = format!("{resource_type} with id {resource_id} not found");
        Self::build(
            ErrorKind::NotFound {
                resource_type,
                resource_id,
            },
            message,
        )
    }

    pub fn authorization(
        user_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        let resource = resource.into();
        let action = action.into();
        let message = format!("User {user_id} is not authorized to {action} {resource}");
        Self::build(
            ErrorKind::Authorization {
                user_id,
                resource,
                action,
            },
            message,
        )
    }

    pub fn security_violation(
        violation_type: impl Into<String>,
        severity: Severity,
        details: impl Into<String>,
    ) -> Self {
        Self::build(
            ErrorKind::SecurityViolation {
                violation_type: violation_type.into(),
                severity,
            },
            details.into(),
        )
    }

    pub fn database(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Database {
                operation: operation.into(),
            },
            message.into(),
        )
    }

    pub fn storage(
        message: impl Into<String>,
        operation: impl Into<String>,
        backend: StorageBackend,
    ) -> Self {
        Self::build(
            ErrorKind::Storage {
                operation: operation.into(),
                backend,
            },
            message.into(),
        )
    }

    pub fn network(
        message: impl Into<String>,
        operation: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::build(
            ErrorKind::Network {
                operation: operation.into(),
                status_code,
            },
            message.into(),
        )
    }

    pub fn integration(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Integration {
                system: system.into(),
                circuit_open: false,
            },
            message.into(),
        )
    }

    /// Rejection issued by an open circuit breaker guarding `system`.
    pub fn circuit_open(system: impl Into<String>) -> Self {
        let system = system.into();
        let message = format!("Circuit breaker is open for {system}");
        Self::build(
            ErrorKind::Integration {
                system,
                circuit_open: true,
            },
            message,
        )
    }

    pub fn data_sync(
        system: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::build(
            ErrorKind::DataSync {
                system: system.into(),
                entity: entity.into(),
            },
            message.into(),
        )
    }

    pub fn compliance_violation(
        issue: ComplianceIssue,
        details: impl Into<String>,
        data_subject: Option<String>,
    ) -> Self {
        Self::build(
            ErrorKind::ComplianceViolation {
                issue,
                data_subject,
            },
            details.into(),
        )
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let message = format!("Operation {operation} was cancelled");
        Self::build(ErrorKind::Cancelled { operation }, message)
    }

    /// Attach the use-case context.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxedCause>) -> Self {
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// Internal message. Not safe for display; see [`user_message`](Self::user_message).
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        self.context.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Integration {
                circuit_open: true,
                ..
            }
        )
    }

    /// Message suitable for direct display to an end user.
    ///
    /// Never contains error codes, causes, or identifiers of the resource or
    /// user involved.
    pub fn user_message(&self) -> String {
        match &self.kind {
            ErrorKind::Validation { errors } => match errors.as_slice() {
                [] => "The submitted data is invalid".to_string(),
                [single] => single.message.clone(),
                many => format!(
                    "{} errors found. Please review the highlighted fields",
                    many.len()
                ),
            },
            ErrorKind::NotFound { resource_type, .. } => format!(
                "The requested {} could not be found",
                resource_type.to_lowercase()
            ),
            ErrorKind::Authorization { .. } => {
                "You do not have permission to perform this action".to_string()
            }
            ErrorKind::SecurityViolation { .. } => {
                "This request was blocked for security reasons".to_string()
            }
            ErrorKind::ComplianceViolation { .. } => {
                "This operation cannot be completed due to data protection requirements"
                    .to_string()
            }
            ErrorKind::Database { .. } => {
                "A temporary problem occurred while accessing data. Please try again".to_string()
            }
            ErrorKind::Storage {
                backend: StorageBackend::File,
                ..
            } => "The file could not be processed. Please upload it again".to_string(),
            ErrorKind::Storage { .. } => {
                "A temporary storage problem occurred. Please try again".to_string()
            }
            ErrorKind::Network { .. } => {
                "Unable to reach a required service. Please check your connection and try again"
                    .to_string()
            }
            ErrorKind::Integration {
                circuit_open: true, ..
            } => "An external service is temporarily unavailable. Please try again later"
                .to_string(),
            ErrorKind::Integration { .. } => {
                "An external service could not complete the request. Please try again later"
                    .to_string()
            }
            ErrorKind::DataSync { .. } => {
                "Your changes were saved and will be synchronized shortly".to_string()
            }
            ErrorKind::Cancelled { .. } => "The operation was cancelled".to_string(),
        }
    }

    /// Audit-safe projection of this error. The cause chain is omitted.
    pub fn record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code(),
            message: self.message.clone(),
            severity: self.severity(),
            timestamp: self.timestamp,
            context: self.context.clone(),
            details: self.kind.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.record()).unwrap_or(serde_json::Value::Null)
    }
}

/// Serializable snapshot of a [`ServiceError`] for audit logs and incidents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    pub details: ErrorKind,
}

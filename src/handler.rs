//! Central error handler.
//!
//! [`ErrorHandler`] is the façade use cases talk to. It:
//! - normalizes arbitrary failures into [`ServiceError`]
//! - logs them at a level derived from their severity
//! - retries retryable failures with exponential backoff
//! - walks ordered fallback chains
//! - opens incidents for security, LGPD, authorization and critical failures
//! - notifies security and compliance stakeholders
//!
//! The handler is an ordinary value. Build one at the composition root and
//! share it (e.g. in an `Arc`) with the use cases that need it.
//!
//! ```rust,no_run
//! use clinic_resilience::{ErrorContext, ErrorHandler, ServiceError};
//!
//! # async fn example() -> clinic_resilience::ServiceResult<()> {
//! let handler = ErrorHandler::default();
//! let context = ErrorContext::new("list_appointments").with_user("dr-souza");
//!
//! let appointments = handler
//!     .execute_with_retry(
//!         || async { Ok::<_, ServiceError>(vec!["09:00", "10:30"]) },
//!         &context,
//!     )
//!     .await?;
//! assert_eq!(appointments.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancelToken;
use crate::config::{HandlerConfig, ResilienceConfig};
use crate::context::ErrorContext;
use crate::error::{
    ComplianceIssue, ErrorKind, FieldError, ServiceError, ServiceResult, Severity,
};
use crate::incidents::{IncidentNotifier, IncidentReport, IncidentStore, Stakeholder, TracingNotifier};
use crate::logging::{log_at_severity, log_error, log_info, log_warn};
use crate::normalize::normalize_error;
use crate::recovery::extract_status_code;
use crate::retry::RetryExecutor;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Shown instead of specific messages when user notification is disabled.
pub const GENERIC_USER_MESSAGE: &str = "An error occurred while processing your request";

/// What the caller (or the user) should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryAction {
    CorrectInput,
    VerifyResourceId,
    RequestPermission,
    SecurityReviewRequired,
    ComplianceReviewRequired,
    RetryOperation,
    CheckIntegrationStatus,
    ContactSupport,
}

impl RecoveryAction {
    pub fn for_error(error: &ServiceError) -> Self {
        match error.kind() {
            ErrorKind::Validation { .. } => Self::CorrectInput,
            ErrorKind::NotFound { .. } => Self::VerifyResourceId,
            ErrorKind::Authorization { .. } => Self::RequestPermission,
            ErrorKind::SecurityViolation { .. } => Self::SecurityReviewRequired,
            ErrorKind::ComplianceViolation { .. } => Self::ComplianceReviewRequired,
            ErrorKind::Database { .. } | ErrorKind::Storage { .. } => Self::RetryOperation,
            ErrorKind::Network { status_code, .. } => {
                let status = status_code.or_else(|| extract_status_code(error.message()));
                match status {
                    Some(code) if (400..500).contains(&code) && code != 408 && code != 429 => {
                        Self::ContactSupport
                    }
                    _ => Self::RetryOperation,
                }
            }
            ErrorKind::Integration { .. } | ErrorKind::DataSync { .. } => {
                Self::CheckIntegrationStatus
            }
            ErrorKind::Cancelled { .. } => Self::RetryOperation,
        }
    }
}

/// Terminal outcome of handling a failure
#[derive(Debug)]
pub struct ErrorHandlingResult {
    /// Always false; kept so callers can serialize a uniform envelope
    pub success: bool,
    pub error: ServiceError,
    pub retry_attempts: u32,
    pub recovery_action: RecoveryAction,
    pub user_message: String,
    /// Incident opened for this failure, if any
    pub incident_id: Option<Uuid>,
}

/// One link of a fallback chain, see [`fallback_operation`].
pub type FallbackOperation<'a, T> =
    Box<dyn FnOnce() -> BoxFuture<'a, anyhow::Result<T>> + Send + 'a>;

/// Box a closure for [`ErrorHandler::execute_with_fallback`].
pub fn fallback_operation<'a, F, Fut, T, E>(operation: F) -> FallbackOperation<'a, T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<T, E>> + Send + 'a,
    E: Into<anyhow::Error>,
{
    Box::new(move || Box::pin(async move { operation().await.map_err(Into::into) }))
}

/// Central error handler
pub struct ErrorHandler {
    config: HandlerConfig,
    retry: RetryExecutor,
    incidents: IncidentStore,
    notifier: Arc<dyn IncidentNotifier>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(HandlerConfig::default())
    }
}

impl ErrorHandler {
    pub fn new(config: HandlerConfig) -> Self {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(config: HandlerConfig, notifier: Arc<dyn IncidentNotifier>) -> Self {
        Self {
            retry: RetryExecutor::new(config.retry_policy.clone())
                .with_exhaustion_logging(config.enable_logging),
            incidents: IncidentStore::new(config.incident_retention),
            config,
            notifier,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.handler.clone())
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Whether `execute_with_retry` would retry this error.
    pub fn is_retryable(&self, error: &ServiceError) -> bool {
        self.config.enable_retry && self.config.retryable_codes.contains(&error.code())
    }

    // =========================================================================
    // Handling
    // =========================================================================

    /// Normalize, log and classify a failure. Never fails.
    pub fn handle_error(
        &self,
        error: impl Into<anyhow::Error>,
        context: &ErrorContext,
    ) -> ErrorHandlingResult {
        let error = normalize_error(error, context);
        self.shape(error, context, 0, true)
    }

    /// Build a validation error from `field_errors` and handle it. No
    /// incident is ever opened for input mistakes.
    pub fn handle_validation_error(
        &self,
        field_errors: Vec<FieldError>,
        context: &ErrorContext,
    ) -> ErrorHandlingResult {
        let error = ServiceError::validation(field_errors).with_context(context.clone());
        self.shape(error, context, 0, false)
    }

    /// Record a security violation, always opening an incident and
    /// notifying the security team.
    pub async fn handle_security_violation(
        &self,
        violation_type: impl Into<String>,
        severity: Severity,
        details: impl Into<String>,
        context: &ErrorContext,
    ) -> ErrorHandlingResult {
        let error = ServiceError::security_violation(violation_type, severity, details)
            .with_context(context.clone());
        self.escalate(error, context, Stakeholder::SecurityTeam).await
    }

    /// Record an LGPD compliance violation, always opening an incident and
    /// notifying the compliance team. The context's patient is recorded as
    /// the data subject.
    pub async fn handle_lgpd_violation(
        &self,
        issue: ComplianceIssue,
        details: impl Into<String>,
        context: &ErrorContext,
    ) -> ErrorHandlingResult {
        let error = ServiceError::compliance_violation(issue, details, context.patient_id.clone())
            .with_context(context.clone());
        self.escalate(error, context, Stakeholder::ComplianceTeam).await
    }

    async fn escalate(
        &self,
        error: ServiceError,
        context: &ErrorContext,
        stakeholder: Stakeholder,
    ) -> ErrorHandlingResult {
        self.log_failure(&error, context);
        let incident = self.open_incident(&error, context);

        if let Err(notify_error) = self.notifier.notify(stakeholder, &incident).await {
            log_error!(
                incident_id = %incident.id,
                stakeholder = ?stakeholder,
                error = %notify_error,
                "Failed to notify stakeholders of incident"
            );
        }

        self.result(error, 0, Some(incident.id))
    }

    fn shape(
        &self,
        error: ServiceError,
        context: &ErrorContext,
        retry_attempts: u32,
        allow_incident: bool,
    ) -> ErrorHandlingResult {
        self.log_failure(&error, context);

        let incident_id = (allow_incident
            && self.config.enable_incident_reporting
            && requires_incident(&error))
        .then(|| self.open_incident(&error, context).id);

        self.result(error, retry_attempts, incident_id)
    }

    fn result(
        &self,
        error: ServiceError,
        retry_attempts: u32,
        incident_id: Option<Uuid>,
    ) -> ErrorHandlingResult {
        let user_message = if self.config.enable_user_notification {
            error.user_message()
        } else {
            GENERIC_USER_MESSAGE.to_string()
        };
        ErrorHandlingResult {
            success: false,
            recovery_action: RecoveryAction::for_error(&error),
            error,
            retry_attempts,
            user_message,
            incident_id,
        }
    }

    fn log_failure(&self, error: &ServiceError, context: &ErrorContext) {
        if !self.config.enable_logging {
            return;
        }
        log_at_severity!(
            error.severity(),
            operation = %context.operation,
            error_code = error.code().as_str(),
            severity = %error.severity(),
            user_id = ?context.user_id,
            patient_id = ?context.patient_id,
            error = %error,
            "Error handled"
        );
    }

    fn open_incident(&self, error: &ServiceError, context: &ErrorContext) -> IncidentReport {
        let incident = IncidentReport::new(error, context);
        if self.config.enable_logging {
            log_warn!(
                incident_id = %incident.id,
                error_code = error.code().as_str(),
                severity = %incident.severity,
                operation = %context.operation,
                "Incident opened"
            );
        }
        self.incidents.insert(incident.clone());
        incident
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run `operation`, retrying retryable failures with backoff.
    ///
    /// Non-retryable failures are returned after the first attempt.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        context: &ErrorContext,
    ) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.execute_with_retry_until_cancelled(operation, context, &CancelToken::never())
            .await
    }

    pub async fn execute_with_retry_until_cancelled<F, Fut, T, E>(
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
        self.retry
            .execute(operation, context, cancel, |error| self.is_retryable(error))
            .await
            .map_err(|failure| failure.error)
    }

    /// Run `operation` with retries and turn a terminal failure into an
    /// [`ErrorHandlingResult`] (incident included when warranted).
    pub async fn execute_or_handle<F, Fut, T, E>(
        &self,
        operation: F,
        context: &ErrorContext,
    ) -> Result<T, ErrorHandlingResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let cancel = CancelToken::never();
        self.retry
            .execute(operation, context, &cancel, |error| self.is_retryable(error))
            .await
            .map_err(|failure| {
                self.shape(
                    failure.error,
                    context,
                    failure.attempts.saturating_sub(1),
                    true,
                )
            })
    }

    /// Try each operation in order and return the first success.
    ///
    /// Failures are logged but not retried. When every operation fails, the
    /// last normalized error is returned.
    pub async fn execute_with_fallback<T>(
        &self,
        operations: Vec<FallbackOperation<'_, T>>,
        context: &ErrorContext,
    ) -> ServiceResult<T> {
        let total = operations.len();
        let mut last_error = None;

        for (index, operation) in operations.into_iter().enumerate() {
            match operation().await {
                Ok(value) => {
                    if index > 0 && self.config.enable_logging {
                        log_info!(
                            operation = %context.operation,
                            fallback_index = index,
                            "Fallback operation succeeded"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let error = normalize_error(error, context);
                    if self.config.enable_logging {
                        log_warn!(
                            operation = %context.operation,
                            fallback_index = index,
                            total_operations = total,
                            error_code = error.code().as_str(),
                            error = %error,
                            "Fallback operation failed"
                        );
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ServiceError::validation(vec![FieldError::new(
                "operations",
                "At least one operation is required",
                "REQUIRED",
            )])
            .with_context(context.clone())
        }))
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    pub fn incident_reports(&self) -> Vec<IncidentReport> {
        self.incidents.list()
    }

    pub fn incident_report(&self, id: Uuid) -> Option<IncidentReport> {
        self.incidents.get(id)
    }

    pub fn unresolved_incidents(&self) -> Vec<IncidentReport> {
        self.incidents.unresolved()
    }

    /// Mark an incident resolved; repeated calls keep the latest notes.
    pub fn resolve_incident(
        &self,
        id: Uuid,
        notes: impl Into<String>,
    ) -> ServiceResult<IncidentReport> {
        self.incidents.resolve(id, notes)
    }
}

fn requires_incident(error: &ServiceError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::SecurityViolation { .. }
            | ErrorKind::ComplianceViolation { .. }
            | ErrorKind::Authorization { .. }
    ) || error.severity() == Severity::Critical
}

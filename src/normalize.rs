//! Normalization of arbitrary failures into the error taxonomy.
//!
//! Collaborators fail with whatever error type they like; the engine only
//! reasons about [`ServiceError`]. A failure that already *is* a
//! `ServiceError` passes through unchanged. Anything else is classified by
//! looking for keywords in its message, in this priority order:
//!
//! | Message contains | Becomes |
//! |------------------|---------|
//! | `not found` | `NotFound` |
//! | `unauthorized`, `permission` | `Authorization` |
//! | `database`, `query` | `Database` |
//! | `network`, `fetch` | `Network` |
//! | anything else | `Database` (retry-eligible) |
//!
//! The keyword table is advisory. Callers that need an exact classification
//! should return a `ServiceError` themselves.

use crate::context::ErrorContext;
use crate::error::ServiceError;
use crate::logging::log_debug;

const UNKNOWN: &str = "unknown";

/// Convert any failure into a [`ServiceError`] carrying `context`.
///
/// Taxonomy errors keep their own context if they already have one.
pub fn normalize_error(error: impl Into<anyhow::Error>, context: &ErrorContext) -> ServiceError {
    let error: anyhow::Error = error.into();
    match error.downcast::<ServiceError>() {
        Ok(service_error) if service_error.context().is_some() => service_error,
        Ok(service_error) => service_error.with_context(context.clone()),
        Err(other) => classify(other, context),
    }
}

fn classify(error: anyhow::Error, context: &ErrorContext) -> ServiceError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    let operation = context.operation.as_str();

    let normalized = if lowered.contains("not found") {
        ServiceError::not_found("Resource", UNKNOWN)
    } else if lowered.contains("unauthorized") || lowered.contains("permission") {
        let user_id = context.user_id.as_deref().unwrap_or(UNKNOWN);
        ServiceError::authorization(user_id, operation, "access")
    } else if lowered.contains("database") || lowered.contains("query") {
        ServiceError::database(message, operation)
    } else if lowered.contains("network") || lowered.contains("fetch") {
        ServiceError::network(message, operation, None)
    } else {
        log_debug!(
            operation = %operation,
            "Unclassified failure treated as database error"
        );
        ServiceError::database(message, operation)
    };

    normalized
        .with_context(context.clone())
        .with_source(error)
}

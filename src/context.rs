//! Diagnostic context attached to every handling and recovery call.
//!
//! A context describes *who* was doing *what* when a failure happened. It is
//! used for log correlation and incident records only; nothing in the engine
//! branches on its contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Correlation data for a single use-case invocation.
///
/// Handlers and strategies take `&ErrorContext` and clone it into the errors
/// and incidents they produce, so a context is never mutated after it has
/// been handed to the engine.
///
/// # Example
///
/// ```rust
/// use clinic_resilience::ErrorContext;
///
/// let context = ErrorContext::new("schedule_appointment")
///     .with_user("dr-silva")
///     .with_patient("patient-42")
///     .with_metadata("clinic", "north");
/// assert_eq!(context.operation, "schedule_appointment");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Authenticated user performing the operation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Patient whose data the operation touches, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Name of the use-case operation
    pub operation: String,
    /// When the context was created
    pub timestamp: DateTime<Utc>,
    /// Free-form diagnostic metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    /// Create a context for `operation`, timestamped now.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            user_id: None,
            patient_id: None,
            operation: operation.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// Add metadata to this context
    ///
    /// Values that fail to serialize are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}

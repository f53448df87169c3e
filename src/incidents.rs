//! Incident records for failures that need human review.
//!
//! Incidents are created for security violations, LGPD compliance
//! violations, authorization failures and anything of critical severity.
//! The store keeps them in memory in creation order; persisting them is the
//! job of an audit collaborator reading [`IncidentStore::list`].

use crate::context::ErrorContext;
use crate::error::{ErrorRecord, ServiceError, ServiceResult, Severity};
use crate::logging::{log_info, log_warn};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record of a failure requiring review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: Uuid,
    pub error: ErrorRecord,
    pub context: ErrorContext,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
}

impl IncidentReport {
    pub fn new(error: &ServiceError, context: &ErrorContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            error: error.record(),
            context: context.clone(),
            severity: error.severity(),
            timestamp: Utc::now(),
            resolved: false,
            resolution_notes: None,
        }
    }
}

/// Who must hear about an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stakeholder {
    SecurityTeam,
    ComplianceTeam,
}

/// Delivery channel for stakeholder notifications (e-mail, pager, ticketing)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IncidentNotifier: Send + Sync {
    async fn notify(
        &self,
        stakeholder: Stakeholder,
        incident: &IncidentReport,
    ) -> anyhow::Result<()>;
}

/// Notifier that only writes a structured log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl IncidentNotifier for TracingNotifier {
    async fn notify(
        &self,
        stakeholder: Stakeholder,
        incident: &IncidentReport,
    ) -> anyhow::Result<()> {
        log_warn!(
            stakeholder = ?stakeholder,
            incident_id = %incident.id,
            error_code = incident.error.code.as_str(),
            severity = %incident.severity,
            operation = %incident.context.operation,
            "Stakeholders notified of incident"
        );
        Ok(())
    }
}

/// In-memory incident table
///
/// With a retention cap, the oldest *resolved* incidents are evicted once the
/// table grows past it. Unresolved incidents are never evicted.
#[derive(Debug, Default)]
pub struct IncidentStore {
    incidents: RwLock<Vec<IncidentReport>>,
    retention: Option<usize>,
}

impl IncidentStore {
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            incidents: RwLock::new(Vec::new()),
            retention,
        }
    }

    pub fn insert(&self, report: IncidentReport) {
        let mut incidents = self.incidents.write();
        incidents.push(report);

        let Some(limit) = self.retention else {
            return;
        };
        while incidents.len() > limit {
            let Some(position) = incidents.iter().position(|incident| incident.resolved) else {
                break;
            };
            let evicted = incidents.remove(position);
            log_info!(incident_id = %evicted.id, "Resolved incident evicted by retention limit");
        }
    }

    pub fn get(&self, id: Uuid) -> Option<IncidentReport> {
        self.incidents
            .read()
            .iter()
            .find(|incident| incident.id == id)
            .cloned()
    }

    /// All incidents in creation order.
    pub fn list(&self) -> Vec<IncidentReport> {
        self.incidents.read().clone()
    }

    pub fn unresolved(&self) -> Vec<IncidentReport> {
        self.incidents
            .read()
            .iter()
            .filter(|incident| !incident.resolved)
            .cloned()
            .collect()
    }

    /// Mark an incident resolved. Calling again overwrites the notes.
    pub fn resolve(&self, id: Uuid, notes: impl Into<String>) -> ServiceResult<IncidentReport> {
        let mut incidents = self.incidents.write();
        let incident = incidents
            .iter_mut()
            .find(|incident| incident.id == id)
            .ok_or_else(|| ServiceError::not_found("Incident", id.to_string()))?;

        incident.resolved = true;
        incident.resolution_notes = Some(notes.into());
        log_info!(incident_id = %id, "Incident resolved");
        Ok(incident.clone())
    }

    pub fn len(&self) -> usize {
        self.incidents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.read().is_empty()
    }
}

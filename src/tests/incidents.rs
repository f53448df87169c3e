// Unit Tests for Incident Records
//
// UNIT UNDER TEST: IncidentReport, IncidentStore
//
// BUSINESS RESPONSIBILITY:
//   - Keeps a reviewable record of security, compliance and critical failures
//   - Allows resolution with notes, the only mutation of an existing incident
//   - Bounds memory use without ever dropping an open incident
//
// TEST COVERAGE:
//   - Report creation copies error projection, context and severity
//   - Lookup and listing in creation order
//   - Resolution is idempotent in effect and keeps the latest notes
//   - Resolving an unknown incident is a not-found error
//   - Retention evicts only resolved incidents, oldest first

use crate::error::{ComplianceIssue, ErrorCode, ServiceError, Severity};
use crate::incidents::{IncidentReport, IncidentStore};
use crate::tests::helpers::test_context;
use uuid::Uuid;

fn security_incident() -> IncidentReport {
    let error = ServiceError::security_violation("sql_injection", Severity::High, "payload");
    IncidentReport::new(&error, &test_context())
}

#[cfg(test)]
mod incident_report_tests {
    use super::*;

    #[test]
    fn test_report_copies_error_and_context() {
        // Arrange
        let context = test_context();
        let error = ServiceError::compliance_violation(
            ComplianceIssue::Violation,
            "records shared without consent",
            Some("patient-42".to_string()),
        );

        // Act
        let report = IncidentReport::new(&error, &context);

        // Assert
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.error.code, ErrorCode::LgpdComplianceError);
        assert_eq!(report.context, context);
        assert!(!report.resolved);
        assert!(report.resolution_notes.is_none());
    }
}

#[cfg(test)]
mod incident_store_tests {
    use super::*;

    #[test]
    fn test_list_returns_incidents_in_creation_order() {
        // Arrange
        let store = IncidentStore::new(None);
        let first = security_incident();
        let second = security_incident();

        // Act
        store.insert(first.clone());
        store.insert(second.clone());

        // Assert
        let ids: Vec<Uuid> = store.list().iter().map(|incident| incident.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(store.get(second.id), Some(second));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_resolve_twice_keeps_last_notes() {
        // Test verifies resolution is idempotent in effect

        // Arrange
        let store = IncidentStore::new(None);
        let incident = security_incident();
        store.insert(incident.clone());

        // Act
        store.resolve(incident.id, "False positive").expect("Should resolve");
        let resolved = store
            .resolve(incident.id, "Confirmed false positive after review")
            .expect("Should resolve again");

        // Assert
        assert!(resolved.resolved);
        assert_eq!(
            resolved.resolution_notes.as_deref(),
            Some("Confirmed false positive after review")
        );
        assert_eq!(store.get(incident.id), Some(resolved));
        assert!(store.unresolved().is_empty());
    }

    #[test]
    fn test_resolve_unknown_incident_is_not_found() {
        // Arrange
        let store = IncidentStore::new(None);

        // Act
        let result = store.resolve(Uuid::new_v4(), "notes");

        // Assert
        let error = result.unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotFound);
        assert_eq!(error.user_message(), "The requested incident could not be found");
    }

    #[test]
    fn test_retention_evicts_oldest_resolved_only() {
        // Test verifies retention never drops an incident awaiting review

        // Arrange
        let store = IncidentStore::new(Some(2));
        let open = security_incident();
        let resolved_old = security_incident();
        let newest = security_incident();
        store.insert(open.clone());
        store.insert(resolved_old.clone());
        store.resolve(resolved_old.id, "handled").expect("Should resolve");

        // Act
        store.insert(newest.clone());

        // Assert
        assert_eq!(store.len(), 2);
        assert!(store.get(open.id).is_some(), "Open incident must be kept");
        assert!(store.get(resolved_old.id).is_none(), "Oldest resolved should go");
        assert!(store.get(newest.id).is_some());
    }

    #[test]
    fn test_retention_grows_past_limit_when_all_open() {
        // Arrange
        let store = IncidentStore::new(Some(1));

        // Act
        store.insert(security_incident());
        store.insert(security_incident());

        // Assert
        assert_eq!(store.len(), 2, "Unresolved incidents are never evicted");
        assert_eq!(store.unresolved().len(), 2);
    }
}

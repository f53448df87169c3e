//! End-to-end tests for an appointment synchronisation use case
//!
//! These tests drive the public API the way a clinic back-end would: a sync
//! job pulls slots from the partner AppointmentSystem through its circuit
//! breaker, saves them locally with retries, and escalates security and LGPD
//! problems to the right teams.
//!
//! ## Test Organization
//!
//! - **Partner outage**: breaker opens, fallback serves cached slots, partner recovers
//! - **Local persistence**: transient database failures are retried
//! - **Escalation**: security and LGPD incidents reach stakeholders and can be resolved
//!
//! Time-dependent tests run on tokio's paused clock.

mod common;
use common::*;

use clinic_resilience::{
    CircuitState, ComplianceIssue, ErrorCode, ErrorHandler, ErrorRecoveryService, RecoveryAction,
    ServiceError, Severity, Stakeholder,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const APPOINTMENT_SYSTEM: &str = "AppointmentSystem";

// ============================================================================
// Partner outage
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_partner_outage_degrades_to_cached_slots_and_recovers() {
    // Test verifies the whole outage lifecycle for a partner system:
    // failures are handled, the breaker opens, cached data is served, and
    // the partner is used again after the cool-down

    // Arrange
    let config = create_test_config();
    let handler = ErrorHandler::from_config(&config);
    let recovery = ErrorRecoveryService::from_config(&config);
    let partner = recovery.integration_strategy();
    let context = create_sync_context();
    let partner_calls = AtomicU32::new(0);

    // Act - five failing syncs
    for _ in 0..5 {
        let result = partner
            .execute_with_circuit_breaker(APPOINTMENT_SYSTEM, || async {
                partner_calls.fetch_add(1, Ordering::SeqCst);
                Err::<Vec<&str>, _>(anyhow::anyhow!("HTTP 503 from scheduler"))
            })
            .await;
        let handled = handler.handle_error(result.unwrap_err(), &context);
        assert_eq!(handled.recovery_action, RecoveryAction::CheckIntegrationStatus);
        assert!(handled.incident_id.is_none(), "Partner outages are not incidents");
    }

    // Assert - breaker open, verdict automatic, cached slots served
    let verdict = recovery
        .attempt_recovery(
            &ServiceError::integration(APPOINTMENT_SYSTEM, "HTTP 503 from scheduler"),
            &context,
        )
        .await;
    assert!(!verdict.requires_manual_intervention);
    assert!(verdict.message.contains("Retrying"));

    let slots = partner
        .execute_with_circuit_breaker_or_fallback(
            APPOINTMENT_SYSTEM,
            || async {
                partner_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ServiceError>(vec!["live"])
            },
            || async { Ok(vec!["cached-09:00", "cached-10:30"]) },
        )
        .await
        .expect("Fallback should serve cached slots");
    assert_eq!(slots, vec!["cached-09:00", "cached-10:30"]);
    assert_eq!(partner_calls.load(Ordering::SeqCst), 5);

    // Act - partner back after the cool-down
    tokio::time::advance(config.circuit_breaker.reset_timeout).await;
    let slots = partner
        .execute_with_circuit_breaker(APPOINTMENT_SYSTEM, || async {
            partner_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ServiceError>(vec!["live-09:00"])
        })
        .await
        .expect("Probe should reach the partner");

    // Assert
    assert_eq!(slots, vec!["live-09:00"]);
    let state = partner
        .breaker_state(APPOINTMENT_SYSTEM)
        .expect("Breaker should exist");
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_error_is_not_retried_by_handler() {
    // Arrange
    let config = create_test_config();
    let handler = ErrorHandler::from_config(&config);
    let recovery = ErrorRecoveryService::from_config(&config);
    let partner = recovery.integration_strategy();
    let context = create_sync_context();
    for _ in 0..config.circuit_breaker.failure_threshold {
        let _ = partner
            .execute_with_circuit_breaker(APPOINTMENT_SYSTEM, || async {
                Err::<(), _>(anyhow::anyhow!("HTTP 500"))
            })
            .await;
    }
    let attempts = AtomicU32::new(0);

    // Act
    let result = handler
        .execute_with_retry(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                partner
                    .execute_with_circuit_breaker(APPOINTMENT_SYSTEM, || async {
                        Ok::<_, ServiceError>(())
                    })
                    .await
            },
            &context,
        )
        .await;

    // Assert
    let error = result.unwrap_err();
    assert_eq!(error.code(), ErrorCode::CircuitBreakerOpen);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        handler.handle_error(error, &context).user_message,
        "An external service is temporarily unavailable. Please try again later"
    );
}

// ============================================================================
// Local persistence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_database_failures_are_absorbed() {
    // Arrange
    let handler = ErrorHandler::from_config(&create_test_config());
    let attempts = AtomicU32::new(0);

    // Act
    let saved = handler
        .execute_with_retry(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceError::database("Connection failed", "appointments"))
                } else {
                    Ok(12)
                }
            },
            &create_sync_context(),
        )
        .await;

    // Assert
    assert_eq!(saved.unwrap(), 12);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_service_stops_on_constraint_violation() {
    // Arrange
    let recovery = ErrorRecoveryService::from_config(&create_test_config());
    let attempts = AtomicU32::new(0);

    // Act
    let result = recovery
        .execute_with_recovery(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!(
                    "database error: duplicate key violates unique constraint"
                ))
            },
            &create_sync_context(),
        )
        .await;

    // Assert
    assert_eq!(result.unwrap_err().code(), ErrorCode::DatabaseError);
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "Manual verdicts are not retried");
}

// ============================================================================
// Escalation
// ============================================================================

#[tokio::test]
async fn test_security_violation_is_escalated_and_resolved() {
    // Arrange
    let notifier = RecordingNotifier::default();
    let handler = ErrorHandler::with_notifier(
        create_test_config().handler,
        Arc::new(notifier.clone()),
    );
    let context = create_sync_context();

    // Act
    let result = handler
        .handle_security_violation(
            "sql_injection",
            Severity::Critical,
            "Injection attempt in appointment notes",
            &context,
        )
        .await;

    // Assert
    assert_eq!(result.recovery_action, RecoveryAction::SecurityReviewRequired);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Stakeholder::SecurityTeam);

    let incident_id = result.incident_id.expect("Should open an incident");
    let resolved = handler
        .resolve_incident(incident_id, "Input sanitised, attacker IP blocked")
        .expect("Should resolve");
    assert!(resolved.resolved);

    let audit = serde_json::to_value(&resolved).expect("Incident should serialize");
    assert_eq!(audit["error"]["code"], "SECURITY_VIOLATION");
    assert_eq!(audit["severity"], "critical");
    assert_eq!(audit["context"]["operation"], "sync_appointments");
}

#[tokio::test]
async fn test_lgpd_violation_reaches_compliance_team() {
    // Arrange
    let notifier = RecordingNotifier::default();
    let handler = ErrorHandler::with_notifier(
        create_test_config().handler,
        Arc::new(notifier.clone()),
    );

    // Act
    let result = handler
        .handle_lgpd_violation(
            ComplianceIssue::ConsentMissing,
            "Appointment history exported without consent",
            &create_sync_context(),
        )
        .await;

    // Assert
    assert_eq!(result.recovery_action, RecoveryAction::ComplianceReviewRequired);
    assert_eq!(
        result.user_message,
        "This operation cannot be completed due to data protection requirements"
    );
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Stakeholder::ComplianceTeam);
    assert_eq!(handler.unresolved_incidents().len(), 1);
}

#[tokio::test]
async fn test_fallback_chain_reads_from_replica_when_primary_fails() {
    // Arrange
    let handler = ErrorHandler::from_config(&create_test_config());

    // Act
    let agenda = handler
        .execute_with_fallback(
            vec![
                clinic_resilience::fallback_operation(|| async {
                    Err::<&str, _>(ServiceError::database("Connection failed", "primary"))
                }),
                clinic_resilience::fallback_operation(|| async {
                    Ok::<_, ServiceError>("replica agenda")
                }),
            ],
            &create_sync_context(),
        )
        .await;

    // Assert
    assert_eq!(agenda.unwrap(), "replica agenda");
}

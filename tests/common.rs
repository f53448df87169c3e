//! Test helper utilities for clinic-resilience integration tests
//!
//! This module provides reusable fixtures shared across the integration
//! test files. Only the public API is used here.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use async_trait::async_trait;
use clinic_resilience::{
    CircuitBreakerConfig, ErrorContext, HandlerConfig, IncidentNotifier, IncidentReport,
    RecoveryConfig, ResilienceConfig, RetryPolicy, Stakeholder,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Production-shaped configuration with short delays
///
/// Breaker threshold and cool-down keep production values so scenarios match
/// what operators see.
pub fn create_test_config() -> ResilienceConfig {
    ResilienceConfig {
        handler: HandlerConfig {
            retry_policy: create_test_retry_policy(),
            ..HandlerConfig::default()
        },
        circuit_breaker: CircuitBreakerConfig::default(),
        recovery: RecoveryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
    }
}

/// Create test retry policy with fast delays for testing
pub fn create_test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        ..RetryPolicy::default()
    }
}

/// Context for the reception desk syncing the day's appointments
pub fn create_sync_context() -> ErrorContext {
    ErrorContext::new("sync_appointments")
        .with_user("reception-01")
        .with_patient("patient-42")
        .with_metadata("clinic", "north")
}

/// Notifier that records every notification it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(Stakeholder, IncidentReport)>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Stakeholder, IncidentReport)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentNotifier for RecordingNotifier {
    async fn notify(
        &self,
        stakeholder: Stakeholder,
        incident: &IncidentReport,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((stakeholder, incident.clone()));
        Ok(())
    }
}

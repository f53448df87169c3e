//! Test helper utilities for clinic-resilience unit tests
//!
//! Reusable fixtures shared across the test modules.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::config::HandlerConfig;
use crate::context::ErrorContext;
use crate::error::ServiceError;
use crate::handler::ErrorHandler;
use crate::recovery::RecoveryConfig;
use crate::retry::RetryPolicy;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Retry policy matching production timing (1s, 2s, ...) for paused-clock tests
pub fn production_like_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1000),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
        exponential_backoff: true,
        jitter: 0.0,
    }
}

/// Retry policy with short delays
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    }
}

/// Handler config with fast retries and every feature enabled
pub fn fast_handler_config() -> HandlerConfig {
    HandlerConfig {
        retry_policy: fast_retry_policy(),
        ..HandlerConfig::default()
    }
}

pub fn fast_handler() -> ErrorHandler {
    ErrorHandler::new(fast_handler_config())
}

pub fn breaker_config(failure_threshold: u32, reset_timeout: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        reset_timeout,
        ..CircuitBreakerConfig::default()
    }
}

pub fn fast_recovery_config() -> RecoveryConfig {
    RecoveryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    }
}

/// Context for a typical clinical use case
pub fn test_context() -> ErrorContext {
    ErrorContext::new("schedule_appointment")
        .with_user("dr-silva")
        .with_patient("patient-42")
}

/// Shared invocation counter for wrapped operations
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an invocation and return its 1-based number
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn connection_failure() -> ServiceError {
    ServiceError::database("Connection failed", "appointments")
}

// ============================================================================
// Log capture
// ============================================================================

/// Event recorded by [`LogCapture`]
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
}

#[derive(Default)]
struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

struct EventRecorder {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: Subscriber> Layer<S> for EventRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

/// Records events emitted on the current thread while it is alive.
///
/// Use with the default current-thread `#[tokio::test]` runtime.
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub fn start() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = EventRecorder {
            events: Arc::clone(&events),
        };
        let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder));
        Self {
            events,
            _guard: guard,
        }
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.events().iter().any(|event| event.message == message)
    }
}

//! Logging utilities for clinic-resilience
//!
//! Re-exports tracing macros with log_* naming so every module logs the same way.

// Re-export tracing macros with log_* naming
pub use tracing::{debug as log_debug, error as log_error, info as log_info, warn as log_warn};

/// Emit a structured event at the level matching `severity`.
///
/// Critical and high failures log as errors, medium as warnings, low as info.
macro_rules! log_at_severity {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            $crate::error::Severity::Critical | $crate::error::Severity::High => {
                $crate::logging::log_error!($($arg)+)
            }
            $crate::error::Severity::Medium => $crate::logging::log_warn!($($arg)+),
            $crate::error::Severity::Low => $crate::logging::log_info!($($arg)+),
        }
    };
}

pub(crate) use log_at_severity;


// Test modules for clinic-resilience crate
//
// Each source module has a corresponding test file that focuses on
// business behaviour rather than implementation details.

// Shared fixtures for the unit tests
pub mod helpers;

pub mod incidents;

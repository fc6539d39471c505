//! Test infrastructure and device test suites.

pub mod norm_tests;
pub mod newton_schulz_tests;

// Re-export CPU references for use in other tests
pub use test_utils::{cpu_gram, cpu_matmul, cpu_newton_schulz, orthogonality_error};

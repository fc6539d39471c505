//! # CubeCL Muon
//!
//! GPU kernels for the Muon optimizer's orthogonalization step, written
//! with CubeCL.
//!
//! ## Features
//!
//! - **Symmetric product**: `G·Gᵗ` with the transpose fused into the
//!   addressing and a bit-exact mirrored output
//! - **Newton-Schulz**: quintic orthogonalization with fused blend epilogues
//! - **Norms**: Frobenius norm kept on the device
//! - **Mixed precision**: bf16/f16 storage with f32 accumulation
//!
//! ## Example
//!
//! ```ignore
//! use cubecl_muon::{orthogonalize, BF16MixedPrecision, DEFAULT_STEPS};
//!
//! let update = orthogonalize::<Runtime, BF16MixedPrecision>(&client, grad.as_ref(), DEFAULT_STEPS)?;
//! ```

mod error;
mod policy;
mod precision;

/// Host-side operations
pub mod components;

/// Low-level GPU kernels
pub mod kernels;

/// Test data helpers and f64 CPU references. The device suites run under
/// `cargo test` only.
#[cfg(any(test, feature = "export_tests"))]
pub mod tests;

// Re-export public API
pub use error::*;
pub use policy::*;
pub use precision::*;

// Re-export key components
pub use components::matmul::*;
pub use components::newton_schulz::*;
pub use components::norm::*;
pub use components::symmetric::*;

//! Core Muon components.
//!
//! This module contains the host-side operations:
//! - Frobenius norm
//! - Fused symmetric product
//! - Unfused transpose-multiply baseline
//! - Newton-Schulz orthogonalization

pub mod matmul;
pub mod newton_schulz;
pub mod norm;
pub mod symmetric;

pub(crate) mod validation;

//! Precision trait system for the Muon kernels.
//!
//! Matrices live in global memory as `EG` (usually a 16-bit float) while
//! every inner product accumulates in `EA`.

use cubecl_core::prelude::{CubeElement, Float};

/// Precision configuration for Muon operations.
///
/// This trait configures two numeric types:
/// - Global memory (input, output and the iteration's working matrices)
/// - Accumulation precision (inner products, blend epilogues, norms)
///
/// # Example
///
/// ```ignore
/// use cubecl_muon::{MuonPrecision, BF16MixedPrecision};
///
/// fn step<P: MuonPrecision>() {
///     // Uses P::EG for stored matrices
///     // Uses P::EA for accumulation
/// }
/// ```
pub trait MuonPrecision: Send + Sync + 'static {
    /// Global memory type (input/output and intermediate matrices).
    type EG: Float + CubeElement;

    /// Accumulation precision (inner products, reductions).
    type EA: Float + CubeElement;

    /// Relative tolerance of a product entry against an exact reference,
    /// scaled by the norms of the two contributing rows.
    const PRODUCT_TOL: f64 = 1e-4;

    /// Max-abs deviation of `X·Xᵗ` from the identity accepted after the
    /// default number of quintic steps.
    const ORTHO_TOL: f64 = 0.6;
}

/// Standard single precision (f32).
#[derive(Debug, Clone, Copy)]
pub struct F32Precision;

impl MuonPrecision for F32Precision {
    type EG = f32;
    type EA = f32;
}

/// Mixed precision: bf16 storage, fp32 accumulation.
///
/// bfloat16 keeps the fp32 exponent range, so unnormalized gradients do not
/// overflow before the Frobenius scaling is applied.
#[derive(Debug, Clone, Copy)]
pub struct BF16MixedPrecision;

impl MuonPrecision for BF16MixedPrecision {
    type EG = half::bf16;
    type EA = f32;
    const PRODUCT_TOL: f64 = 1e-2;
    const ORTHO_TOL: f64 = 0.65;
}

/// Mixed precision: fp16 storage, fp32 accumulation.
#[derive(Debug, Clone, Copy)]
pub struct F16MixedPrecision;

impl MuonPrecision for F16MixedPrecision {
    type EG = half::f16;
    type EA = f32;
    const PRODUCT_TOL: f64 = 2e-3;
}

//! Low-level GPU kernels for the Muon operations.

pub mod elementwise;
pub mod gemm;
pub mod reduce_ops;
pub mod syrk;

pub use elementwise::*;
pub use gemm::*;
pub use reduce_ops::*;
pub use syrk::*;

//! Strided element-wise copies.
//!
//! Both kernels walk the logical `[rows, cols]` index space of the output
//! and address input and output through their own strides, so a transposed
//! view on either side turns the copy into a transpose.

use cubecl_core as cubecl;
use cubecl_core::prelude::*;

/// Scaled copy: out[i, j] = scale[0] * x[i, j]
///
/// Used to write the Frobenius-normalized matrix straight into the
/// orientation the iteration works in.
#[cube(launch)]
pub fn scale_copy_kernel<EG: Float, EA: Float>(
    input: &Tensor<EG>,
    scale: &Tensor<EA>,
    output: &mut Tensor<EG>,
) {
    let cols = output.shape(1);
    let total = output.shape(0) * cols;

    if ABSOLUTE_POS < total {
        let row = ABSOLUTE_POS / cols;
        let col = ABSOLUTE_POS % cols;
        let value = EA::cast_from(input[row * input.stride(0) + col * input.stride(1)]);
        output[row * output.stride(0) + col * output.stride(1)] = EG::cast_from(value * scale[0]);
    }
}

/// Copy: out[i, j] = x[i, j]
#[cube(launch)]
pub fn strided_copy_kernel<EG: Float>(input: &Tensor<EG>, output: &mut Tensor<EG>) {
    let cols = output.shape(1);
    let total = output.shape(0) * cols;

    if ABSOLUTE_POS < total {
        let row = ABSOLUTE_POS / cols;
        let col = ABSOLUTE_POS % cols;
        output[row * output.stride(0) + col * output.stride(1)] =
            input[row * input.stride(0) + col * input.stride(1)];
    }
}

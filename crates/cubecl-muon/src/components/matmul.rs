//! Unfused `G · Gᵗ` baseline.
//!
//! Materializes `Gᵗ` into its own buffer, then runs the general tiled
//! product over the full output. This is the reference the fused
//! [`symmetric_product`](crate::symmetric_product) is measured and checked
//! against; it is not meant for production use.

use cubecl_core::calculate_cube_count_elemwise;
use cubecl_core::prelude::*;
use cubecl_std::tensor::TensorHandle;

use super::validation::{check_matrix, check_workspace, matrix_bytes};
use crate::kernels::{launch_matmul, strided_copy_kernel};
use crate::{KernelPolicy, MuonPrecision, MuonResult};

/// `G · Gᵗ` computed as transpose-copy followed by a full matmul.
pub fn matmul_transpose_unfused<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
) -> MuonResult<TensorHandle<R>> {
    let view = check_matrix::<R, P>(&g)?;
    let (rows, cols) = (view.rows(), view.cols());
    let elem_size = P::EG::type_size();
    let dtype = P::EG::as_type_native_unchecked();

    let gt_bytes = matrix_bytes(cols, rows, elem_size)?;
    let out_bytes = matrix_bytes(rows, rows, elem_size)?;
    check_workspace::<R, P>(client, &[gt_bytes, out_bytes], &KernelPolicy::default())?;

    tracing::debug!(rows, cols, "unfused matmul transpose");

    let gt = TensorHandle::<R>::empty(client, vec![cols, rows], dtype);
    let source = view.transpose();
    let cube_dim = CubeDim::new_1d(256);
    strided_copy_kernel::launch::<P::EG, R>(
        client,
        calculate_cube_count_elemwise(client, rows * cols, cube_dim),
        cube_dim,
        source.bind::<R>(g.handle, elem_size).as_tensor_arg(1),
        gt.as_arg(1),
    )?;

    let out = TensorHandle::<R>::empty(client, vec![rows, rows], dtype);
    launch_matmul::<R, P::EG, P::EA>(client, &g, &gt.as_ref(), None, &out.as_ref(), 1.0)?;

    Ok(out)
}

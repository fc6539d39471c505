//! Fused symmetric product `S = G · Gᵗ`.
//!
//! The transpose is folded into the kernel's addressing: both operand tiles
//! are read from rows of `G`. Only the lower tile triangle is computed and
//! each value is mirrored from one register, so `S[i][j] == S[j][i]`
//! holds bit for bit.
//!
//! Products accumulate in `P::EA` and round once to `P::EG`.

use cubecl_core::prelude::*;
use cubecl_std::tensor::TensorHandle;

use super::validation::{check_matrix, check_workspace, matrix_bytes};
use crate::kernels::launch_gram;
use crate::{KernelPolicy, MuonPrecision, MuonResult};

/// Symmetric product of a matrix with its own transpose.
///
/// `G` is `[rows, cols]` with any strides; the result is a newly allocated
/// `[rows, rows]` matrix of `P::EG`. `G` is not modified.
///
/// # Errors
///
/// * `InvalidShape` if `G` is not a non-empty rank-2 matrix
/// * `InvalidArgument` if `G`'s element size is not `P::EG`'s
/// * `Device` if the result cannot be allocated or launched
///
/// # Example
///
/// ```ignore
/// let s = symmetric_product::<R, BF16MixedPrecision>(&client, g.as_ref())?;
/// assert_eq!(s.shape, vec![g.shape[0], g.shape[0]]);
/// ```
pub fn symmetric_product<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
) -> MuonResult<TensorHandle<R>> {
    symmetric_product_with_policy::<R, P>(client, g, &KernelPolicy::default())
}

/// [`symmetric_product`] under an explicit resource policy.
///
/// # Errors
///
/// As [`symmetric_product`], plus `Device` if the `[rows, rows]` output
/// exceeds `policy.workspace_limit`.
pub fn symmetric_product_with_policy<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
    policy: &KernelPolicy,
) -> MuonResult<TensorHandle<R>> {
    let view = check_matrix::<R, P>(&g)?;
    let n = view.rows();

    let out_bytes = matrix_bytes(n, n, P::EG::type_size())?;
    check_workspace::<R, P>(client, &[out_bytes], policy)?;

    tracing::debug!(rows = n, cols = view.cols(), "symmetric product");

    let out = TensorHandle::<R>::empty(client, vec![n, n], P::EG::as_type_native_unchecked());
    launch_gram::<R, P::EG, P::EA>(client, &g, None, &out.as_ref(), 1.0)?;

    Ok(out)
}

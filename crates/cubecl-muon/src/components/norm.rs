//! Frobenius norm of a matrix.
//!
//! The norm stays on the device as a one-element `EA` tensor, so the
//! orthogonalization can scale by it without a host round-trip.

use cubecl_core::prelude::*;
use cubecl_std::tensor::TensorHandle;
use cubek_reduce::components::instructions::ReduceOperationConfig;
use cubek_reduce::launch::{LineSizeStrategy, RoutineStrategy};
use cubek_reduce::routines::cube::CubeStrategy;
use cubek_reduce::routines::BlueprintStrategy;
use cubek_reduce::{reduce, ReduceDtypes, ReduceStrategy};

use super::validation::{check_matrix, check_workspace};
use crate::kernels::{finalize_norm_kernel, launch_sum_squared};
use crate::{KernelPolicy, MuonPrecision, MuonResult};

/// Frobenius norm: ||G||_F = sqrt(sum(g_ij^2))
///
/// Returns a 1-element tensor of `P::EA` on the device.
///
/// # Example
///
/// ```ignore
/// let norm = frobenius_norm::<R, F32Precision>(&client, g.as_ref())?;
/// let value = f32::from_bytes(&client.read_one(norm.handle))[0];
/// ```
pub fn frobenius_norm<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
) -> MuonResult<TensorHandle<R>> {
    frobenius_norm_with_policy::<R, P>(client, g, &KernelPolicy::default())
}

/// [`frobenius_norm`] with an explicit resource policy.
pub fn frobenius_norm_with_policy<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
    policy: &KernelPolicy,
) -> MuonResult<TensorHandle<R>> {
    check_matrix::<R, P>(&g)?;

    let scratch = (norm_scratch_len(g.shape, g.strides) * P::EA::type_size()) as u64;
    check_workspace::<R, P>(client, &[scratch], policy)?;

    launch_norm::<R, P>(client, &g, 0.0, false)
}

/// Axis reduced by the first stage: the one with the smaller stride, so the
/// reads along it are contiguous whenever possible.
fn norm_axis(strides: &[usize]) -> usize {
    if strides[1] <= strides[0] {
        1
    } else {
        0
    }
}

/// `EA` elements of device scratch one norm launch allocates: the per-vector
/// partial sums, the total and the result.
pub(crate) fn norm_scratch_len(shape: &[usize], strides: &[usize]) -> usize {
    shape[1 - norm_axis(strides)] + 2
}

/// Run both reduction stages over `g` (any strides).
///
/// With `invert` the result is `1 / (||g|| + eps)` instead of the norm.
pub(crate) fn launch_norm<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: &TensorHandleRef<'_, R>,
    eps: f32,
    invert: bool,
) -> MuonResult<TensorHandle<R>> {
    let accum = P::EA::as_type_native_unchecked();
    let axis = norm_axis(g.strides);

    tracing::trace!(rows = g.shape[0], cols = g.shape[1], axis, "launch frobenius norm");

    // [rows, cols] -> one sum of squares per vector along `axis`
    let mut partial_shape = vec![g.shape[0], g.shape[1]];
    partial_shape[axis] = 1;
    let partials = TensorHandle::<R>::empty(client, partial_shape, accum);
    launch_sum_squared::<R, P::EG, P::EA>(client, g, &partials.as_ref(), axis)?;

    // Partial sums -> [1, 1]
    let total = TensorHandle::<R>::empty(client, vec![1, 1], accum);
    reduce::<R>(
        client,
        partials.as_ref(),
        total.as_ref(),
        1 - axis,
        ReduceStrategy {
            routine: RoutineStrategy::Cube(BlueprintStrategy::Inferred(CubeStrategy {
                use_planes: false,
            })),
            line_size: LineSizeStrategy {
                parallel_output_vectorization: false,
            },
        },
        ReduceOperationConfig::Sum,
        ReduceDtypes {
            input: accum,
            output: accum,
            accumulation: accum,
        },
    )?;

    let output = TensorHandle::<R>::empty(client, vec![1], accum);
    finalize_norm_kernel::launch::<P::EA, R>(
        client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(1),
        total.as_arg(1),
        output.as_arg(1),
        ScalarArg::new(eps),
        invert,
    )?;

    Ok(output)
}

//! Tiled strided matrix product with a blend epilogue.
//!
//! Computes: OUT := alpha * LHS * RHS (+ beta * ADDEND)
//!
//! Every operand, including the output, is addressed through its own
//! strides. Passing a view with swapped strides therefore reads a transposed
//! operand, or writes a transposed result, without a copy.

use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use super::syrk::{tile_count, TILE_K, TILE_M};
use crate::MuonResult;

/// Strided GEMM kernel: OUT := alpha * LHS * RHS + beta * ADDEND
///
/// * `lhs` - [m, k]
/// * `rhs` - [k, n]
/// * `addend` - [m, n], read only when `blend` is set
/// * `out` - [m, n]
#[cube(launch)]
pub fn matmul_kernel<EG: Float, EA: Float>(
    lhs: &Tensor<EG>,
    rhs: &Tensor<EG>,
    addend: &Tensor<EG>,
    out: &mut Tensor<EG>,
    alpha: f32,
    beta: f32,
    #[comptime] blend: bool,
) {
    let tx = UNIT_POS_X as usize;
    let ty = UNIT_POS_Y as usize;
    let row_base = CUBE_POS_Y as usize * TILE_M;
    let col_base = CUBE_POS_X as usize * TILE_M;

    let m = lhs.shape(0);
    let k = lhs.shape(1);
    let n = rhs.shape(1);

    let mut lhs_tile = SharedMemory::<EA>::new(TILE_M * TILE_K);
    let mut rhs_tile = SharedMemory::<EA>::new(TILE_K * TILE_M);

    let mut acc = EA::new(0.0);

    let n_k_tiles = (k + TILE_K - 1) / TILE_K;

    for k_tile in 0..n_k_tiles {
        let k_base = k_tile * TILE_K;

        let lhs_row = row_base + ty;
        let lhs_col = k_base + tx;
        if lhs_row < m && lhs_col < k {
            lhs_tile[ty * TILE_K + tx] =
                EA::cast_from(lhs[lhs_row * lhs.stride(0) + lhs_col * lhs.stride(1)]);
        } else {
            lhs_tile[ty * TILE_K + tx] = EA::new(0.0);
        }

        let rhs_row = k_base + ty;
        let rhs_col = col_base + tx;
        if rhs_row < k && rhs_col < n {
            rhs_tile[ty * TILE_M + tx] =
                EA::cast_from(rhs[rhs_row * rhs.stride(0) + rhs_col * rhs.stride(1)]);
        } else {
            rhs_tile[ty * TILE_M + tx] = EA::new(0.0);
        }

        sync_cube();

        #[unroll]
        for kk in 0..TILE_K {
            acc += lhs_tile[ty * TILE_K + kk] * rhs_tile[kk * TILE_M + tx];
        }

        sync_cube();
    }

    let i = row_base + ty;
    let j = col_base + tx;

    if i < m && j < n {
        let mut value = EA::cast_from(alpha) * acc;
        if blend {
            let c_ij = EA::cast_from(addend[i * addend.stride(0) + j * addend.stride(1)]);
            value += EA::cast_from(beta) * c_ij;
        }
        out[i * out.stride(0) + j * out.stride(1)] = EG::cast_from(value);
    }
}

/// Launch the strided GEMM over the full output.
///
/// `out` must not alias `lhs`, `rhs` or `addend`.
pub fn launch_matmul<R: Runtime, EG: Float + CubeElement, EA: Float>(
    client: &ComputeClient<R>,
    lhs: &TensorHandleRef<'_, R>,
    rhs: &TensorHandleRef<'_, R>,
    addend: Option<(&TensorHandleRef<'_, R>, f32)>,
    out: &TensorHandleRef<'_, R>,
    alpha: f32,
) -> MuonResult<()> {
    let (m, k, n) = (lhs.shape[0], lhs.shape[1], rhs.shape[1]);
    let row_tiles = tile_count(m, client)?;
    let col_tiles = tile_count(n, client)?;

    tracing::trace!(m, k, n, blend = addend.is_some(), "launch matmul");

    let (addend, beta, blend) = match addend {
        Some((addend, beta)) => (addend, beta, true),
        None => (lhs, 0.0, false),
    };

    matmul_kernel::launch::<EG, EA, R>(
        client,
        CubeCount::Static(col_tiles, row_tiles, 1),
        CubeDim::new_2d(TILE_M as u32, TILE_M as u32),
        lhs.as_tensor_arg(1),
        rhs.as_tensor_arg(1),
        addend.as_tensor_arg(1),
        out.as_tensor_arg(1),
        ScalarArg::new(alpha),
        ScalarArg::new(beta),
        blend,
    )?;

    Ok(())
}

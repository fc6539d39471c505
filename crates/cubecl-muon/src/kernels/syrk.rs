//! Fused Gram (SYRK-style) kernel.
//!
//! Computes: OUT := alpha * X * X^T (+ beta * ADDEND)
//!
//! where OUT is square and symmetric.
//!
//! ## Key Optimizations
//!
//! 1. **Fused transpose**: `X^T` is never materialized. Both operand tiles are
//!    loaded from rows of `X`, addressed through its strides.
//! 2. **Triangular computation**: Only cubes on or below the tile diagonal
//!    do any work.
//! 3. **Mirrored write**: Each accumulated value is rounded once and stored
//!    at `(i, j)` and `(j, i)`, so the output is bit-exact symmetric.
//! 4. **Blend epilogue**: With a symmetric addend the kernel also evaluates
//!    `c * A * A + b * A` in one pass (`A * A == A * A^T` when `A = A^T`).
//!
//! ## Algorithm
//!
//! Tiled computation with 16×16 output tiles:
//! ```text
//! for each tile (tile_row, tile_col) where tile_row >= tile_col:
//!   for k_chunk in 0..K step TILE_K:
//!     Load X[tile_row, k_chunk] into shared memory (16 × TILE_K)
//!     Load X[tile_col, k_chunk] into shared memory (16 × TILE_K)
//!     Each unit accumulates its dot product in EA
//!   v = alpha * acc + beta * ADDEND[i, j]
//!   OUT[i, j] = OUT[j, i] = round(v)
//! ```
//!
//! ## Launch Configuration
//!
//! - Cube dim: 16×16 units (one unit per output element)
//! - Cube count: `tiles × tiles` on a 2-D grid, upper tiles exit at once
//! - Shared memory: 2 × (16 × TILE_K) accumulator elements

use cubecl_core as cubecl;
use cubecl_core::prelude::*;

use crate::{MuonError, MuonResult};

/// Tile size for output blocks (TILE_M × TILE_M).
pub const TILE_M: usize = 16;

/// Tile size for the K dimension. Must equal `TILE_M`: every unit loads
/// exactly one element of each operand tile.
pub const TILE_K: usize = 16;

/// Fused Gram kernel: OUT := alpha * X * X^T + beta * ADDEND
///
/// ## Arguments
///
/// * `x` - Input matrix [n, k], any strides
/// * `addend` - Symmetric matrix [n, n], read only when `blend` is set
/// * `out` - Output symmetric matrix [n, n]
/// * `alpha` - Scalar multiplier for X*X^T
/// * `beta` - Scalar multiplier for the addend
/// * `blend` - Whether the addend term is present
#[cube(launch)]
pub fn gram_kernel<EG: Float, EA: Float>(
    x: &Tensor<EG>,
    addend: &Tensor<EG>,
    out: &mut Tensor<EG>,
    alpha: f32,
    beta: f32,
    #[comptime] blend: bool,
) {
    let tile_row = CUBE_POS_Y as usize;
    let tile_col = CUBE_POS_X as usize;

    // The whole cube takes the same branch, so the barriers below stay uniform.
    if tile_row >= tile_col {
        let tx = UNIT_POS_X as usize;
        let ty = UNIT_POS_Y as usize;

        let n = x.shape(0);
        let k = x.shape(1);
        let row_stride = x.stride(0);
        let col_stride = x.stride(1);

        let mut lhs_tile = SharedMemory::<EA>::new(TILE_M * TILE_K);
        let mut rhs_tile = SharedMemory::<EA>::new(TILE_M * TILE_K);

        let mut acc = EA::new(0.0);

        let n_k_tiles = (k + TILE_K - 1) / TILE_K;

        for k_tile in 0..n_k_tiles {
            let k_col = k_tile * TILE_K + tx;

            // Rows of X feeding output row i
            let lhs_row = tile_row * TILE_M + ty;
            if lhs_row < n && k_col < k {
                lhs_tile[ty * TILE_K + tx] =
                    EA::cast_from(x[lhs_row * row_stride + k_col * col_stride]);
            } else {
                lhs_tile[ty * TILE_K + tx] = EA::new(0.0);
            }

            // Rows of X feeding output column j (the fused transpose)
            let rhs_row = tile_col * TILE_M + ty;
            if rhs_row < n && k_col < k {
                rhs_tile[ty * TILE_K + tx] =
                    EA::cast_from(x[rhs_row * row_stride + k_col * col_stride]);
            } else {
                rhs_tile[ty * TILE_K + tx] = EA::new(0.0);
            }

            sync_cube();

            #[unroll]
            for kk in 0..TILE_K {
                acc += lhs_tile[ty * TILE_K + kk] * rhs_tile[tx * TILE_K + kk];
            }

            sync_cube();
        }

        let i = tile_row * TILE_M + ty;
        let j = tile_col * TILE_M + tx;

        if i < n && j < n && i >= j {
            let mut value = EA::cast_from(alpha) * acc;
            if blend {
                let a_ij = EA::cast_from(addend[i * addend.stride(0) + j * addend.stride(1)]);
                value += EA::cast_from(beta) * a_ij;
            }

            let rounded = EG::cast_from(value);
            out[i * out.stride(0) + j * out.stride(1)] = rounded;
            out[j * out.stride(0) + i * out.stride(1)] = rounded;
        }
    }
}

/// Launch the Gram kernel over the full output grid.
///
/// `addend` must be symmetric: only its lower triangle is read.
///
/// ## Arguments
///
/// * `client` - Compute client
/// * `x` - Input matrix [n, k]
/// * `addend` - Optional `(matrix [n, n], beta)` blend term
/// * `out` - Output matrix [n, n]
/// * `alpha` - Scalar for X*X^T
pub fn launch_gram<R: Runtime, EG: Float + CubeElement, EA: Float>(
    client: &ComputeClient<R>,
    x: &TensorHandleRef<'_, R>,
    addend: Option<(&TensorHandleRef<'_, R>, f32)>,
    out: &TensorHandleRef<'_, R>,
    alpha: f32,
) -> MuonResult<()> {
    let n = x.shape[0];
    let tiles = tile_count(n, client)?;

    tracing::trace!(n, k = x.shape[1], tiles, blend = addend.is_some(), "launch gram");

    let (addend, beta, blend) = match addend {
        Some((addend, beta)) => (addend, beta, true),
        None => (x, 0.0, false),
    };

    gram_kernel::launch::<EG, EA, R>(
        client,
        CubeCount::Static(tiles, tiles, 1),
        CubeDim::new_2d(TILE_M as u32, TILE_M as u32),
        x.as_tensor_arg(1),
        addend.as_tensor_arg(1),
        out.as_tensor_arg(1),
        ScalarArg::new(alpha),
        ScalarArg::new(beta),
        blend,
    )?;

    Ok(())
}

/// Number of 16-wide tiles covering `extent`, checked against the grid limit.
pub(crate) fn tile_count<R: Runtime>(extent: usize, client: &ComputeClient<R>) -> MuonResult<u32> {
    let tiles = extent.div_ceil(TILE_M);
    let (max_x, max_y, _) = client.properties().hardware.max_cube_count;

    match u32::try_from(tiles) {
        Ok(tiles) if tiles <= max_x.min(max_y) => Ok(tiles),
        _ => Err(MuonError::device(format!(
            "{tiles} tiles per grid axis exceed the device limit ({max_x}, {max_y})"
        ))),
    }
}

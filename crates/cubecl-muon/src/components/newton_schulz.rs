//! Newton-Schulz quintic orthogonalization.
//!
//! Approximates the orthogonal factor `U·Vᵗ` of `G = U·S·Vᵗ` using only
//! matrix products. The quintic coefficients maximize the slope at zero, so
//! small singular values grow quickly; the price is that the iteration
//! settles into a band around 1 (roughly `[0.7, 1.13]`) instead of
//! converging to it.
//!
//! ## Algorithm
//!
//! ```text
//! X = G (or Gᵗ when rows > cols)
//! X = X / (||X||_F + eps)
//! repeat steps times:
//!   A = X · Xᵗ                      gram kernel
//!   B = c · (A · A) + b · A         gram kernel on A, blend with A
//!   X = B · X + a · X               gemm, blend with X
//! return X (or Xᵗ)
//! ```
//!
//! `A` is exactly symmetric, so `A · A = A · Aᵗ` runs through the same
//! fused kernel as the first product and the `b · A` term is folded into its
//! epilogue. The `a · X` term is folded into the gemm epilogue. Each step
//! is therefore three launches with no separate blend pass.
//!
//! ## Buffers
//!
//! `X` ping-pongs between the output and one `[m, n]` scratch buffer
//! (`m <= n`), `A` and `B` are `[m, m]`. The starting buffer is picked by the
//! parity of `steps` so the last step lands in the output. For a tall input
//! the output is addressed through its transposed view, so no final
//! transpose pass is needed. Peak memory is `2·m·n + 2·m²` elements.

use core::fmt;
use cubecl_core::calculate_cube_count_elemwise;
use cubecl_core::prelude::*;
use cubecl_std::tensor::TensorHandle;

use super::norm::{launch_norm, norm_scratch_len};
use super::validation::{check_matrix, check_workspace, matrix_bytes, MatrixView};
use crate::kernels::{launch_gram, launch_matmul, scale_copy_kernel};
use crate::{KernelPolicy, MuonError, MuonPrecision, MuonResult, OrthogonalizeInfo};

/// Default number of quintic steps.
pub const DEFAULT_STEPS: i32 = 5;

/// Stabilizer added to the Frobenius norm before dividing.
pub const DEFAULT_EPS: f32 = 1e-7;

/// Coefficients of `p(X) = a·X + b·(X·Xᵗ)·X + c·(X·Xᵗ)²·X`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuinticCoefficients {
    /// Linear term.
    pub a: f32,
    /// Cubic term.
    pub b: f32,
    /// Quintic term.
    pub c: f32,
}

impl QuinticCoefficients {
    /// Evaluate the scalar polynomial a singular value follows per step.
    pub fn apply(&self, sigma: f64) -> f64 {
        let s2 = sigma * sigma;
        sigma * (self.a as f64 + s2 * (self.b as f64 + s2 * self.c as f64))
    }

    fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }
}

impl Default for QuinticCoefficients {
    fn default() -> Self {
        Self {
            a: 3.4445,
            b: -4.7750,
            c: 2.0315,
        }
    }
}

impl fmt::Display for QuinticCoefficients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.a, self.b, self.c)
    }
}

/// Configuration for [`orthogonalize_with_config`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonSchulzConfig {
    /// Number of quintic steps. Must be >= 0.
    pub steps: i32,

    /// Polynomial coefficients.
    pub coefficients: QuinticCoefficients,

    /// Added to the Frobenius norm before normalizing.
    pub eps: f32,

    /// Resource policy for this call.
    pub policy: KernelPolicy,
}

impl Default for NewtonSchulzConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            coefficients: QuinticCoefficients::default(),
            eps: DEFAULT_EPS,
            policy: KernelPolicy::default(),
        }
    }
}

impl NewtonSchulzConfig {
    /// Set the number of steps.
    pub fn with_steps(mut self, steps: i32) -> Self {
        self.steps = steps;
        self
    }

    /// Set the polynomial coefficients.
    pub fn with_coefficients(mut self, coefficients: QuinticCoefficients) -> Self {
        self.coefficients = coefficients;
        self
    }

    /// Set the normalization stabilizer.
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Set the resource policy.
    pub fn with_policy(mut self, policy: KernelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validated step count.
    fn validate(&self) -> MuonResult<usize> {
        let steps = usize::try_from(self.steps)
            .map_err(|_| MuonError::argument(format!("steps must be >= 0, got {}", self.steps)))?;

        if !self.coefficients.is_finite() {
            return Err(MuonError::argument(format!(
                "coefficients must be finite, got {}",
                self.coefficients
            )));
        }

        if !self.eps.is_finite() || self.eps < 0.0 {
            return Err(MuonError::argument(format!(
                "eps must be finite and >= 0, got {}",
                self.eps
            )));
        }

        Ok(steps)
    }
}

/// Allocation plan of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Workspace {
    output: u64,
    scratch: u64,
    square: u64,
    iterating: bool,
}

impl Workspace {
    /// `scratch_len` is the norm's scratch in `EA` elements.
    fn plan(
        m: usize,
        n: usize,
        steps: usize,
        scratch_len: usize,
        elem_size: usize,
        accum_size: usize,
    ) -> MuonResult<Self> {
        Ok(Self {
            output: matrix_bytes(m, n, elem_size)?,
            scratch: (scratch_len * accum_size) as u64,
            square: matrix_bytes(m, m, elem_size)?,
            iterating: steps > 0,
        })
    }

    fn buffers(&self) -> Vec<u64> {
        let mut buffers = vec![self.output, self.scratch];
        if self.iterating {
            // Second iterate, then A and B
            buffers.extend([self.output, self.square, self.square]);
        }
        buffers
    }
}

/// Orthogonalize `G` with `steps` quintic iterations and default settings.
///
/// Returns a newly allocated matrix with `G`'s shape. See
/// [`orthogonalize_with_config`] for the error conditions.
///
/// # Example
///
/// ```ignore
/// let update = orthogonalize::<R, BF16MixedPrecision>(&client, grad.as_ref(), DEFAULT_STEPS)?;
/// ```
pub fn orthogonalize<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
    steps: i32,
) -> MuonResult<TensorHandle<R>> {
    let config = NewtonSchulzConfig::default().with_steps(steps);
    orthogonalize_with_config::<R, P>(client, g, &config).map(|(x, _)| x)
}

/// Orthogonalize `G` with a custom configuration.
///
/// # Errors
///
/// Checked in this order, all before any device allocation:
///
/// * `InvalidArgument` if `steps < 0`, the coefficients are not finite, or
///   `eps` is negative or not finite
/// * `InvalidShape` if `G` is not a non-empty rank-2 matrix
/// * `InvalidArgument` if `G`'s element size is not `P::EG`'s
/// * `Device` if the storage type is unsupported, a buffer exceeds the
///   device page size, the total exceeds the policy's workspace limit, or a
///   launch fails
pub fn orthogonalize_with_config<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    g: TensorHandleRef<'_, R>,
    config: &NewtonSchulzConfig,
) -> MuonResult<(TensorHandle<R>, OrthogonalizeInfo)> {
    let steps = config.validate()?;
    let input = check_matrix::<R, P>(&g)?;

    let (rows, cols) = (input.rows(), input.cols());
    let transposed = rows > cols;
    let (m, n) = if transposed { (cols, rows) } else { (rows, cols) };

    let elem_size = P::EG::type_size();
    let dtype = P::EG::as_type_native_unchecked();

    let work_in = if transposed { input.transpose() } else { input };
    let workspace = Workspace::plan(
        m,
        n,
        steps,
        norm_scratch_len(&work_in.shape, &work_in.strides),
        elem_size,
        P::EA::type_size(),
    )?;
    let workspace_bytes = check_workspace::<R, P>(client, &workspace.buffers(), &config.policy)?;

    tracing::debug!(
        rows,
        cols,
        steps,
        transposed,
        workspace_bytes,
        "newton-schulz orthogonalize"
    );

    let work_in_ref = work_in.bind::<R>(g.handle, elem_size);

    let out = TensorHandle::<R>::empty(client, vec![rows, cols], dtype);
    let out_view = MatrixView::of(&out.as_ref());
    let work_out = if transposed { out_view.transpose() } else { out_view };
    let work_out_ref = work_out.bind::<R>(&out.handle, elem_size);

    let scale = launch_norm::<R, P>(client, &work_in_ref, config.eps, true)?;

    let info = OrthogonalizeInfo::new()
        .with_steps(steps)
        .with_transpose(transposed)
        .with_workspace(workspace_bytes);

    if steps == 0 {
        launch_scale_copy::<R, P>(client, &work_in_ref, &scale, &work_out_ref)?;
        return Ok((out, info));
    }

    let spare = TensorHandle::<R>::empty(client, vec![m, n], dtype);
    let gram = TensorHandle::<R>::empty(client, vec![m, m], dtype);
    let blend = TensorHandle::<R>::empty(client, vec![m, m], dtype);

    // Step `i` reads buffer `i % 2` and writes `(i + 1) % 2`; buffer
    // `steps % 2` must be the output.
    let spare_ref = spare.as_ref();
    let buffers = if steps % 2 == 0 {
        [&work_out_ref, &spare_ref]
    } else {
        [&spare_ref, &work_out_ref]
    };

    launch_scale_copy::<R, P>(client, &work_in_ref, &scale, buffers[0])?;

    let QuinticCoefficients { a, b, c } = config.coefficients;

    for step in 0..steps {
        tracing::trace!(step, "quintic step");

        let x = buffers[step % 2];
        let next = buffers[(step + 1) % 2];

        // A = X · Xᵗ
        launch_gram::<R, P::EG, P::EA>(client, x, None, &gram.as_ref(), 1.0)?;

        // B = c · A · A + b · A
        let a_ref = gram.as_ref();
        launch_gram::<R, P::EG, P::EA>(client, &a_ref, Some((&a_ref, b)), &blend.as_ref(), c)?;

        // X = B · X + a · X
        launch_matmul::<R, P::EG, P::EA>(client, &blend.as_ref(), x, Some((x, a)), next, 1.0)?;
    }

    Ok((out, info))
}

fn launch_scale_copy<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    input: &TensorHandleRef<'_, R>,
    scale: &TensorHandle<R>,
    output: &TensorHandleRef<'_, R>,
) -> MuonResult<()> {
    let cube_dim = CubeDim::new_1d(256);
    let total = output.shape[0] * output.shape[1];

    scale_copy_kernel::launch::<P::EG, P::EA, R>(
        client,
        calculate_cube_count_elemwise(client, total, cube_dim),
        cube_dim,
        input.as_tensor_arg(1),
        scale.as_arg(1),
        output.as_tensor_arg(1),
    )?;

    Ok(())
}

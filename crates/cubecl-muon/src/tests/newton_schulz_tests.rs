//! Tests for Newton-Schulz orthogonalization

#[cfg(test)]
mod tests {
    use crate::tests::test_utils::*;
    use crate::{
        orthogonalize, orthogonalize_with_config, BF16MixedPrecision, F32Precision,
        KernelPolicy, MuonError, MuonPrecision, NewtonSchulzConfig, DEFAULT_EPS, DEFAULT_STEPS,
    };
    use cubecl_core::{prelude::*, Runtime};

    type TestRuntime = cubecl_cpu::CpuRuntime;

    fn run<R: Runtime, P: MuonPrecision>(
        client: &ComputeClient<R>,
        values: &[f32],
        rows: usize,
        cols: usize,
        steps: i32,
    ) -> Vec<f64> {
        let input = upload::<R, P>(client, values, rows, cols);
        let result = orthogonalize::<R, P>(client, input.as_ref(), steps)
            .expect("orthogonalize failed");

        assert_eq!(result.shape, vec![rows, cols]);
        download::<R, P>(client, &result)
    }

    fn test_zero_steps_normalizes_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        for (rows, cols) in [(6, 10), (10, 6)] {
            let values = random_matrix(rows, cols, 2);
            let actual = run::<R, F32Precision>(&client, &values, rows, cols, 0);

            let g: Vec<f64> = values.iter().map(|&v| v as f64).collect();
            let norm = g.iter().map(|v| v * v).sum::<f64>().sqrt();
            let expected: Vec<f64> = g.iter().map(|v| v / (norm + DEFAULT_EPS as f64)).collect();

            let diff = max_abs_diff(&actual, &expected);
            assert!(diff < 1e-5, "{rows}x{cols}: diff {diff}");
        }
    }

    fn test_identity_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let actual = run::<R, BF16MixedPrecision>(&client, &identity(4), 4, 4, DEFAULT_STEPS);

        // Every singular value follows the scalar quintic from 0.5 and lands
        // near 0.77; the off-diagonal stays exactly zero.
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                let value = actual[i * 4 + j];
                assert!(
                    (value - expected).abs() < 0.3,
                    "X[{i}][{j}] = {value}"
                );
            }
        }
    }

    fn test_matches_reference_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        for (seed, (rows, cols)) in [(16, 16), (12, 20), (24, 8), (33, 17)].into_iter().enumerate() {
            let values = random_matrix(rows, cols, 100 + seed as u64);
            let actual = run::<R, F32Precision>(&client, &values, rows, cols, DEFAULT_STEPS);

            let g: Vec<f64> = values.iter().map(|&v| v as f64).collect();
            let expected = cpu_newton_schulz(&g, rows, cols, DEFAULT_STEPS as usize);

            let diff = max_abs_diff(&actual, &expected);
            assert!(diff < 5e-4, "{rows}x{cols}: diff {diff}");
        }
    }

    fn test_well_conditioned_impl<R: Runtime, P: MuonPrecision>(device: &R::Device) {
        let client = R::client(device);

        for n in [4, 8, 24] {
            let values = well_conditioned(n, n as u64);
            let actual = run::<R, P>(&client, &values, n, n, DEFAULT_STEPS);

            let (max_abs, _) = orthogonality_error(&actual, n, n);
            assert!(max_abs < P::ORTHO_TOL, "{n}x{n}: |XᵗX - I| = {max_abs}");
        }
    }

    fn test_orientation_invariance_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let (rows, cols) = (9, 21);
        let values = random_matrix(rows, cols, 77);
        let values_t = transpose(&values, rows, cols);

        let wide = run::<R, F32Precision>(&client, &values, rows, cols, DEFAULT_STEPS);
        let tall = run::<R, F32Precision>(&client, &values_t, cols, rows, DEFAULT_STEPS);

        let diff = max_abs_diff(&transpose(&wide, rows, cols), &tall);
        assert!(diff < 1e-4, "orthogonalize(Gᵗ) vs orthogonalize(G)ᵗ: {diff}");
    }

    fn test_strided_input_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        for (rows, cols) in [(11, 18), (18, 11)] {
            let values = random_matrix(rows, cols, 5);
            let input = upload_column_major::<R, F32Precision>(&client, &values, rows, cols);
            let result = orthogonalize::<R, F32Precision>(&client, input.as_ref(), DEFAULT_STEPS)
                .expect("orthogonalize failed");

            let actual = download::<R, F32Precision>(&client, &result);
            let expected = run::<R, F32Precision>(&client, &values, rows, cols, DEFAULT_STEPS);

            let diff = max_abs_diff(&actual, &expected);
            assert!(diff < 1e-4, "{rows}x{cols}: diff {diff}");
        }
    }

    fn test_ones_non_square_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let actual = run::<R, BF16MixedPrecision>(&client, &[1.0; 15], 3, 5, DEFAULT_STEPS);

        assert_eq!(actual.len(), 15);
        assert!(actual.iter().all(|v| v.is_finite()));

        // Rank one: the single singular value follows the scalar quintic from
        // 1, so all entries stay equal and positive.
        let first = actual[0];
        assert!(first > 0.0);
        assert!(actual.iter().all(|&v| (v - first).abs() < 1e-2));
    }

    fn test_zero_matrix_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let actual = run::<R, F32Precision>(&client, &[0.0; 20], 4, 5, DEFAULT_STEPS);
        assert!(actual.iter().all(|&v| v == 0.0));
    }

    fn test_deterministic_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let values = random_matrix(20, 28, 8);
        let input = upload::<R, BF16MixedPrecision>(&client, &values, 20, 28);

        let first = orthogonalize::<R, BF16MixedPrecision>(&client, input.as_ref(), DEFAULT_STEPS)
            .expect("orthogonalize failed");
        let second = orthogonalize::<R, BF16MixedPrecision>(&client, input.as_ref(), DEFAULT_STEPS)
            .expect("orthogonalize failed");

        let first: Vec<u16> = download_raw::<R, BF16MixedPrecision>(&client, &first)
            .iter()
            .map(|v| v.to_bits())
            .collect();
        let second: Vec<u16> = download_raw::<R, BF16MixedPrecision>(&client, &second)
            .iter()
            .map(|v| v.to_bits())
            .collect();
        assert_eq!(first, second);

        // The input is left untouched
        assert_eq!(
            download::<R, BF16MixedPrecision>(&client, &input),
            stored::<BF16MixedPrecision>(&values)
        );
    }

    fn test_step_sweep_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let shapes = [(16, 16), (8, 24), (24, 8)];
        let mut deviation = vec![0.0; 9];

        for (seed, &(rows, cols)) in shapes.iter().enumerate() {
            let values = random_matrix(rows, cols, 200 + seed as u64);
            for steps in 0..=8 {
                let actual = run::<R, F32Precision>(&client, &values, rows, cols, steps);
                assert!(actual.iter().all(|v| v.is_finite()), "steps = {steps}");

                let (_, frobenius) = orthogonality_error(&actual, rows, cols);
                deviation[steps as usize] += frobenius / shapes.len() as f64;
            }
        }

        // Each of the first steps pulls the spectrum closer to 1
        for steps in 1..=4 {
            assert!(
                deviation[steps] < deviation[steps - 1],
                "steps = {steps}: mean deviation {} after {}",
                deviation[steps],
                deviation[steps - 1]
            );
        }

        // The quintic oscillates inside its band once the small singular
        // values have caught up; it must never drift back out.
        for steps in 3..=8 {
            assert!(
                deviation[steps] < 0.5,
                "steps = {steps}: mean deviation {}",
                deviation[steps]
            );
            assert!(deviation[steps] < deviation[0]);
        }
    }

    fn test_negative_steps_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let input = upload::<R, F32Precision>(&client, &identity(4), 4, 4);
        let err = orthogonalize::<R, F32Precision>(&client, input.as_ref(), -1).unwrap_err();
        assert!(matches!(err, MuonError::InvalidArgument { .. }), "{err}");

        // The step count is rejected before the shape is even looked at
        let handle = client.create_from_slice(f32::as_bytes(&[1.0; 8]));
        let cube = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&handle, &[4, 2, 1], &[2, 2, 2], 4)
        };
        let err = orthogonalize::<R, F32Precision>(&client, cube, -1).unwrap_err();
        assert!(matches!(err, MuonError::InvalidArgument { .. }), "{err}");

        let err = orthogonalize::<R, F32Precision>(&client, cube, 5).unwrap_err();
        assert!(matches!(err, MuonError::InvalidShape { .. }), "{err}");
    }

    fn test_workspace_limit_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let input = upload::<R, F32Precision>(&client, &random_matrix(32, 32, 1), 32, 32);

        let tight = NewtonSchulzConfig::default()
            .with_policy(KernelPolicy::default().with_workspace_limit(1024));
        let err = orthogonalize_with_config::<R, F32Precision>(&client, input.as_ref(), &tight)
            .unwrap_err();
        assert!(matches!(err, MuonError::Device { .. }), "{err}");

        let roomy = NewtonSchulzConfig::default()
            .with_policy(KernelPolicy::default().with_workspace_limit(1 << 20));
        let (result, info) =
            orthogonalize_with_config::<R, F32Precision>(&client, input.as_ref(), &roomy)
                .expect("orthogonalize failed");

        assert_eq!(result.shape, vec![32, 32]);
        assert_eq!(info.steps, 5);
        assert!(!info.transposed);
        // Output, one spare iterate, A and B, plus 32 partial sums and two
        // norm scalars
        assert_eq!(info.workspace_bytes, 4 * 32 * 32 * 4 + 34 * 4);
    }

    fn test_info_reports_orientation_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let input = upload::<R, F32Precision>(&client, &random_matrix(12, 4, 3), 12, 4);
        let config = NewtonSchulzConfig::default().with_steps(2);
        let (result, info) =
            orthogonalize_with_config::<R, F32Precision>(&client, input.as_ref(), &config)
                .expect("orthogonalize failed");

        assert_eq!(result.shape, vec![12, 4]);
        assert_eq!(info.steps, 2);
        assert!(info.transposed);
    }

    #[test]
    fn test_ns_zero_steps_normalizes() {
        test_zero_steps_normalizes_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_identity_bf16() {
        test_identity_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_matches_reference_f32() {
        test_matches_reference_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_well_conditioned_f32() {
        test_well_conditioned_impl::<TestRuntime, F32Precision>(&Default::default());
    }

    #[test]
    fn test_ns_well_conditioned_bf16() {
        test_well_conditioned_impl::<TestRuntime, BF16MixedPrecision>(&Default::default());
    }

    #[test]
    fn test_ns_orientation_invariance() {
        test_orientation_invariance_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_strided_input() {
        test_strided_input_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_ones_non_square_bf16() {
        test_ones_non_square_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_zero_matrix() {
        test_zero_matrix_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_deterministic_bf16() {
        test_deterministic_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_step_sweep() {
        test_step_sweep_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_negative_steps() {
        test_negative_steps_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_workspace_limit() {
        test_workspace_limit_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_ns_info_reports_orientation() {
        test_info_reports_orientation_impl::<TestRuntime>(&Default::default());
    }
}

//! Tests for the Frobenius norm

/// CPU reference: Frobenius norm of a row-major matrix
pub fn cpu_frobenius_norm(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::tests::test_utils::{random_matrix, upload, upload_column_major};
    use crate::{
        frobenius_norm, frobenius_norm_with_policy, BF16MixedPrecision, F32Precision, KernelPolicy,
        MuonError,
    };
    use cubecl_core::{prelude::*, Runtime};

    type TestRuntime = cubecl_cpu::CpuRuntime;

    fn read_scalar<R: Runtime>(client: &ComputeClient<R>, handle: cubecl_core::server::Handle) -> f32 {
        let bytes = client.read_one(handle);
        f32::from_bytes(&bytes)[0]
    }

    fn test_frobenius_norm_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        // 2x2 matrix: sqrt(1 + 4 + 9 + 16) = sqrt(30)
        let values = vec![1.0_f32, 2.0, 3.0, 4.0];
        let input = upload::<R, F32Precision>(&client, &values, 2, 2);

        let result = frobenius_norm::<R, F32Precision>(&client, input.as_ref())
            .expect("frobenius_norm failed");

        assert_relative_eq!(
            read_scalar(&client, result.handle),
            cpu_frobenius_norm(&values),
            epsilon = 1e-5
        );
    }

    fn test_frobenius_norm_large_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        // Long rows and more vectors than one cube of units covers
        let (rows, cols) = (300, 1000);
        let values = random_matrix(rows, cols, 42);
        let input = upload::<R, F32Precision>(&client, &values, rows, cols);

        let result = frobenius_norm::<R, F32Precision>(&client, input.as_ref())
            .expect("frobenius_norm failed");

        let expected = values.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
        assert_relative_eq!(
            read_scalar(&client, result.handle) as f64,
            expected,
            max_relative = 1e-4
        );
    }

    fn test_frobenius_norm_strided_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let values = random_matrix(7, 13, 3);
        let input = upload_column_major::<R, F32Precision>(&client, &values, 7, 13);

        let result = frobenius_norm::<R, F32Precision>(&client, input.as_ref())
            .expect("frobenius_norm failed");

        assert_relative_eq!(
            read_scalar(&client, result.handle),
            cpu_frobenius_norm(&values),
            max_relative = 1e-5
        );
    }

    fn test_frobenius_norm_skipped_columns_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        // Every other column of a 5x12 buffer: no axis has unit stride
        let buffer = random_matrix(5, 12, 9);
        let handle = client.create_from_slice(f32::as_bytes(&buffer));
        let input = unsafe { TensorHandleRef::<R>::from_raw_parts(&handle, &[5, 6], &[12, 2], 4) };

        let result = frobenius_norm::<R, F32Precision>(&client, input)
            .expect("frobenius_norm failed");

        let selected: Vec<f32> = buffer.iter().step_by(2).copied().collect();
        assert_relative_eq!(
            read_scalar(&client, result.handle),
            cpu_frobenius_norm(&selected),
            max_relative = 1e-5
        );
    }

    fn test_frobenius_norm_workspace_limit_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let values = vec![1.0_f32, 2.0, 3.0, 4.0];
        let input = upload::<R, F32Precision>(&client, &values, 2, 2);

        // Two partial sums, the total and the result
        let tight = KernelPolicy::default().with_workspace_limit(15);
        let err = frobenius_norm_with_policy::<R, F32Precision>(&client, input.as_ref(), &tight)
            .unwrap_err();
        assert!(matches!(err, MuonError::Device { .. }), "{err}");

        let exact = KernelPolicy::default().with_workspace_limit(16);
        let result = frobenius_norm_with_policy::<R, F32Precision>(&client, input.as_ref(), &exact)
            .expect("frobenius_norm_with_policy failed");
        assert_relative_eq!(read_scalar(&client, result.handle), 30.0_f32.sqrt(), epsilon = 1e-5);
    }

    fn test_frobenius_norm_bf16_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        // 3 * 4 entries of 2.0 (exact in bf16): sqrt(48)
        let values = vec![2.0_f32; 12];
        let input = upload::<R, BF16MixedPrecision>(&client, &values, 3, 4);

        let result = frobenius_norm::<R, BF16MixedPrecision>(&client, input.as_ref())
            .expect("frobenius_norm failed");

        assert_relative_eq!(read_scalar(&client, result.handle), 48.0_f32.sqrt(), epsilon = 1e-5);
    }

    fn test_frobenius_norm_rejects_vector_impl<R: Runtime>(device: &R::Device) {
        let client = R::client(device);

        let handle = client.create_from_slice(f32::as_bytes(&[3.0, 4.0]));
        let input = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&handle, &[1], &[2], std::mem::size_of::<f32>())
        };

        let err = frobenius_norm::<R, F32Precision>(&client, input).unwrap_err();
        assert!(matches!(err, MuonError::InvalidShape { .. }), "{err}");
    }

    #[test]
    fn test_frobenius_norm_f32() {
        test_frobenius_norm_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_frobenius_norm_large_f32() {
        test_frobenius_norm_large_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_frobenius_norm_strided_f32() {
        test_frobenius_norm_strided_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_frobenius_norm_skipped_columns_f32() {
        test_frobenius_norm_skipped_columns_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_frobenius_norm_workspace_limit() {
        test_frobenius_norm_workspace_limit_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_frobenius_norm_bf16() {
        test_frobenius_norm_bf16_impl::<TestRuntime>(&Default::default());
    }

    #[test]
    fn test_frobenius_norm_rejects_vector() {
        test_frobenius_norm_rejects_vector_impl::<TestRuntime>(&Default::default());
    }
}

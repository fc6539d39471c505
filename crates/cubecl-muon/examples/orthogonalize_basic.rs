//! Basic example demonstrating the Muon kernels
//!
//! This example shows how to:
//! 1. Upload a small non-square matrix
//! 2. Compute its symmetric product G·Gᵗ
//! 3. Orthogonalize it and check how close G·Gᵗ of the result is to I
//!
//! Run with: RUST_LOG=cubecl_muon=debug cargo run --example orthogonalize_basic

use cubecl_core::prelude::*;
use cubecl_muon::{
    orthogonalize_with_config, symmetric_product, F32Precision, NewtonSchulzConfig,
};
use cubecl_std::tensor::TensorHandle;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    type Runtime = cubecl_cpu::CpuRuntime;

    let device = Default::default();
    let client = Runtime::client(&device);

    // A 3x5 matrix
    let (rows, cols) = (3, 5);
    #[rustfmt::skip]
    let g_data = vec![
        2.0_f32, 1.0, 0.0, 0.5, 1.0,
        0.0, 1.5, 1.0, 0.0, 0.5,
        1.0, 0.0, 3.0, 1.0, 0.0,
    ];

    println!("Input G ({}×{}):", rows, cols);
    print_matrix(&g_data, rows, cols);

    let g_handle = client.create_from_slice(f32::as_bytes(&g_data));
    let g = TensorHandle::<Runtime>::new(
        g_handle,
        vec![rows, cols],
        vec![cols, 1],
        f32::as_type_native_unchecked(),
    );

    match symmetric_product::<Runtime, F32Precision>(&client, g.as_ref()) {
        Ok(s) => {
            let bytes = client.read_one_tensor(s.as_copy_descriptor());
            println!("\nG·Gᵗ ({}×{}):", rows, rows);
            print_matrix(f32::from_bytes(&bytes), rows, rows);
        }
        Err(e) => {
            println!("✗ symmetric product failed: {}", e);
            return;
        }
    }

    let config = NewtonSchulzConfig::default();
    println!("\nOrthogonalizing with {} steps, coefficients {}...", config.steps, config.coefficients);

    match orthogonalize_with_config::<Runtime, F32Precision>(&client, g.as_ref(), &config) {
        Ok((x, info)) => {
            println!("✓ {}", info);

            let bytes = client.read_one_tensor(x.as_copy_descriptor());
            let x_data = f32::from_bytes(&bytes);

            println!("\nX ({}×{}):", rows, cols);
            print_matrix(x_data, rows, cols);

            let xxt = gram(x_data, rows, cols);
            println!("\nX·Xᵗ (singular values squared land in roughly [0.5, 1.3]):");
            print_matrix(&xxt, rows, rows);
        }
        Err(e) => println!("✗ orthogonalize failed: {}", e),
    }
}

fn gram(x: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0; rows * rows];
    for i in 0..rows {
        for j in 0..rows {
            out[i * rows + j] = (0..cols).map(|k| x[i * cols + k] * x[j * cols + k]).sum();
        }
    }
    out
}

fn print_matrix(data: &[f32], rows: usize, cols: usize) {
    for i in 0..rows {
        print!("  [");
        for j in 0..cols {
            print!("{:8.4}", data[i * cols + j]);
            if j < cols - 1 {
                print!(", ");
            }
        }
        println!("]");
    }
}

//! Argument checks and stride views shared by the public operations.

use cubecl_core::prelude::*;
use cubecl_core::server::Handle;

use crate::{KernelPolicy, MuonError, MuonPrecision, MuonResult};

/// Shape and strides of a rank-2 view, owned so that a transposed view can
/// outlive the expression that built it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MatrixView {
    pub shape: [usize; 2],
    pub strides: [usize; 2],
}

impl MatrixView {
    pub fn of<R: Runtime>(tensor: &TensorHandleRef<'_, R>) -> Self {
        Self {
            shape: [tensor.shape[0], tensor.shape[1]],
            strides: [tensor.strides[0], tensor.strides[1]],
        }
    }

    /// Same memory, rows and columns swapped.
    pub fn transpose(self) -> Self {
        Self {
            shape: [self.shape[1], self.shape[0]],
            strides: [self.strides[1], self.strides[0]],
        }
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    pub fn bind<'a, R: Runtime>(
        &'a self,
        handle: &'a Handle,
        elem_size: usize,
    ) -> TensorHandleRef<'a, R> {
        // Views are only built from validated rank-2 tensors or from buffers
        // allocated with these exact extents.
        unsafe { TensorHandleRef::from_raw_parts(handle, &self.strides, &self.shape, elem_size) }
    }
}

/// Check that `g` is a non-empty rank-2 matrix stored as `P::EG`.
pub(crate) fn check_matrix<R: Runtime, P: MuonPrecision>(
    g: &TensorHandleRef<'_, R>,
) -> MuonResult<MatrixView> {
    if g.shape.len() != 2 {
        return Err(MuonError::shape(format!(
            "expected a rank-2 matrix, got shape {:?}",
            g.shape
        )));
    }

    if g.strides.len() != g.shape.len() {
        return Err(MuonError::shape(format!(
            "strides {:?} do not match shape {:?}",
            g.strides, g.shape
        )));
    }

    if g.shape[0] == 0 || g.shape[1] == 0 {
        return Err(MuonError::shape(format!(
            "rows and cols must be >= 1, got {:?}",
            g.shape
        )));
    }

    let expected = P::EG::type_size();
    if g.elem_size != expected {
        return Err(MuonError::argument(format!(
            "element size {} does not match storage type {} ({} bytes)",
            g.elem_size,
            P::EG::as_type_native_unchecked(),
            expected
        )));
    }

    Ok(MatrixView::of(g))
}

/// Bytes of a `rows × cols` buffer of `elem_size` elements.
pub(crate) fn matrix_bytes(rows: usize, cols: usize, elem_size: usize) -> MuonResult<u64> {
    rows.checked_mul(cols)
        .and_then(|elems| elems.checked_mul(elem_size))
        .map(|bytes| bytes as u64)
        .ok_or_else(|| MuonError::device(format!("{rows}x{cols} buffer overflows the address space")))
}

/// Check a planned set of allocations against the device and the policy.
///
/// Returns the total number of bytes.
pub(crate) fn check_workspace<R: Runtime, P: MuonPrecision>(
    client: &ComputeClient<R>,
    buffers: &[u64],
    policy: &KernelPolicy,
) -> MuonResult<u64> {
    let properties = client.properties();

    let storage = P::EG::as_type_native_unchecked();
    if !properties.supports_type(storage) {
        return Err(MuonError::device(format!(
            "storage type {storage} is not supported by this device"
        )));
    }

    if policy.check_device_limits {
        let max_page = properties.memory.max_page_size;
        if let Some(&largest) = buffers.iter().max() {
            if largest > max_page {
                return Err(MuonError::device(format!(
                    "buffer of {largest} bytes exceeds the device page size of {max_page} bytes"
                )));
            }
        }
    }

    let total = buffers
        .iter()
        .try_fold(0u64, |acc, &bytes| acc.checked_add(bytes))
        .ok_or_else(|| MuonError::device("workspace size overflows u64"))?;

    if let Some(limit) = policy.workspace_limit {
        if total > limit {
            return Err(MuonError::device(format!(
                "workspace of {total} bytes exceeds the policy limit of {limit} bytes"
            )));
        }
    }

    Ok(total)
}

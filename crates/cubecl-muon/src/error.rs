//! Error types and diagnostic information for the Muon kernels.

use core::fmt;
use cubecl_core::prelude::LaunchError;
use cubek_reduce::ReduceError;
use thiserror::Error;

/// Errors that can occur while launching a symmetric product or an
/// orthogonalization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MuonError {
    /// Input dimensionality or shape violates a precondition.
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Description of the shape error
        reason: String,
    },

    /// A scalar argument is out of its valid range.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of the rejected argument
        reason: String,
    },

    /// The device cannot allocate or execute the requested work.
    #[error("Device error: {reason}")]
    Device {
        /// Description of the device failure
        reason: String,
    },
}

impl MuonError {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        MuonError::InvalidShape {
            reason: reason.into(),
        }
    }

    pub(crate) fn argument(reason: impl Into<String>) -> Self {
        MuonError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn device(reason: impl Into<String>) -> Self {
        MuonError::Device {
            reason: reason.into(),
        }
    }
}

impl From<LaunchError> for MuonError {
    fn from(err: LaunchError) -> Self {
        MuonError::device(format!("kernel launch failed: {err}"))
    }
}

impl From<ReduceError> for MuonError {
    fn from(err: ReduceError) -> Self {
        MuonError::device(format!("reduction failed: {err}"))
    }
}

/// Result type for Muon kernel operations.
pub type MuonResult<T> = Result<T, MuonError>;

/// Diagnostic information returned with a successful orthogonalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrthogonalizeInfo {
    /// Number of quintic steps applied.
    pub steps: usize,

    /// Whether the iteration ran on the transposed (wide) orientation.
    pub transposed: bool,

    /// Bytes of device memory allocated for the output and the working set.
    pub workspace_bytes: u64,
}

impl OrthogonalizeInfo {
    /// Create a new OrthogonalizeInfo with default values.
    pub fn new() -> Self {
        Self {
            steps: 0,
            transposed: false,
            workspace_bytes: 0,
        }
    }

    /// Set the number of steps.
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Mark that the input was iterated in transposed orientation.
    pub fn with_transpose(mut self, transposed: bool) -> Self {
        self.transposed = transposed;
        self
    }

    /// Set the allocated workspace size.
    pub fn with_workspace(mut self, bytes: u64) -> Self {
        self.workspace_bytes = bytes;
        self
    }
}

impl Default for OrthogonalizeInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrthogonalizeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrthogonalizeInfo {{ steps: {}", self.steps)?;

        if self.transposed {
            write!(f, ", transposed")?;
        }

        if self.workspace_bytes > 0 {
            write!(
                f,
                ", workspace: {:.2} MB",
                self.workspace_bytes as f64 / 1_000_000.0
            )?;
        }

        write!(f, " }}")
    }
}

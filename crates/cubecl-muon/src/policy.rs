//! Per-call resource policy for the Muon kernels.
//!
//! The policy bounds how much device memory a single call may plan for. It
//! never changes numerical results, and it is always passed explicitly: the
//! crate holds no process-wide state.

use core::fmt;

/// Resource policy of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelPolicy {
    /// Upper bound on the bytes one call may allocate (output included).
    /// `None` leaves only the device's own limits.
    pub workspace_limit: Option<u64>,

    /// Reject buffers larger than the device's maximum page size.
    pub check_device_limits: bool,
}

impl Default for KernelPolicy {
    fn default() -> Self {
        Self {
            workspace_limit: None,
            check_device_limits: true,
        }
    }
}

impl KernelPolicy {
    /// Set the workspace limit.
    pub fn with_workspace_limit(mut self, bytes: u64) -> Self {
        self.workspace_limit = Some(bytes);
        self
    }

    /// Enable or disable the page-size check.
    pub fn with_device_limits(mut self, check: bool) -> Self {
        self.check_device_limits = check;
        self
    }
}

impl fmt::Display for KernelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.workspace_limit {
            Some(limit) => write!(f, "KernelPolicy {{ workspace_limit: {limit} B")?,
            None => write!(f, "KernelPolicy {{ workspace_limit: none")?,
        }
        write!(f, ", device_limits: {} }}", self.check_device_limits)
    }
}

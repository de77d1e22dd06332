/// Errors raised by lumen containers, device handles and kernel dispatch.
///
/// Every variant is detected synchronously, at or before the kernel launch
/// it guards. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum LumenError {
    #[error("device {index} not found ({available} available)")]
    DeviceNotFound { index: usize, available: usize },

    #[error("device mismatch: operand bound to handle {found}, expected handle {expected}")]
    DeviceMismatch { expected: u64, found: u64 },

    #[error("shape mismatch: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid dimensions for {op}: {detail}")]
    InvalidDimensions { op: &'static str, detail: String },

    #[error("kernel {kernel} failed with status {code}")]
    KernelLaunchFailed { kernel: &'static str, code: i32 },

    #[error("device allocation of {bytes} bytes failed (status {code})")]
    AllocationFailed { bytes: usize, code: i32 },

    #[error("accelerator runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("{call} failed with status {code}")]
    Runtime { call: &'static str, code: i32 },

    #[error("program build failed for '{program}': {log}")]
    ProgramBuild { program: String, log: String },
}

impl LumenError {
    /// Whether this is a precondition failure (bad shapes or mixed handles)
    /// rather than a device/runtime fault.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            LumenError::DeviceMismatch { .. }
                | LumenError::ShapeMismatch { .. }
                | LumenError::InvalidDimensions { .. }
        )
    }
}

/// Shorthand for `LumenError::InvalidDimensions`.
pub fn invalid_dimensions(op: &'static str, detail: impl Into<String>) -> LumenError {
    LumenError::InvalidDimensions {
        op,
        detail: detail.into(),
    }
}

/// Status carried by `AllocationFailed` when the request never reached a
/// device runtime: the size overflowed or the host allocator refused it.
pub const HOST_ALLOC_STATUS: i32 = -1;

/// `AllocationFailed` for a size that does not fit in `usize`.
pub fn size_overflow() -> LumenError {
    LumenError::AllocationFailed {
        bytes: usize::MAX,
        code: HOST_ALLOC_STATUS,
    }
}

//! Error types of the benchmark harness.
//!
//! Every failure kind maps to a distinct, non-zero status code (see [`BenchError::status_code`]),
//! which is what the named entry points in [`crate::options`] hand back to their caller.

use thiserror::Error;

/// Result type alias using the harness' [`BenchError`].
pub type Result<T> = std::result::Result<T, BenchError>;

/// Status code returned on success.
pub const STATUS_SUCCESS: i32 = 0;

/// Errors that can occur while staging, dispatching or timing a kernel, or reporting timings.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BenchError {
    /// Device memory could not be reserved.
    #[error("failed to allocate {bytes} bytes of device memory: {reason}")]
    Allocation { bytes: usize, reason: String },

    /// A host/device copy could not be enqueued or completed.
    #[error("failed to transfer {bytes} bytes between host and device: {reason}")]
    Transfer { bytes: usize, reason: String },

    /// The kernel source failed to compile/link, or the entry point is missing.
    #[error("failed to build kernel `{kernel}`: {reason}")]
    Build { kernel: &'static str, reason: String },

    /// The device runtime rejected the kernel launch.
    #[error("failed to launch kernel `{kernel}`: {reason}")]
    Launch { kernel: &'static str, reason: String },

    /// Waiting for the completion of a launch failed.
    #[error("failed to wait for kernel completion: {0}")]
    Sync(String),

    /// The context/device/queue triple is not usable.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Rejected input parameters.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The performance report could not be written.
    #[error("failed to write the performance report: {0}")]
    Report(String),
}

impl BenchError {
    /// Returns the status code identifying this failure kind.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Allocation { .. } => 1,
            Self::Transfer { .. } => 2,
            Self::Build { .. } => 3,
            Self::Launch { .. } => 4,
            Self::Sync(_) => 5,
            Self::DeviceUnavailable(_) => 6,
            Self::InvalidParameters(_) => 7,
            Self::Report(_) => 8,
        }
    }
}

//! Error types for kernel parameter preparation.

use thiserror::Error;

/// Errors reported while validating shapes and preparing kernel parameters.
///
/// Kernels themselves never return errors: once parameters are prepared,
/// execution is infallible apart from caller-contract violations, which are
/// documented as preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Spatial rank outside `1..=3`.
    #[error("Unsupported spatial rank {0}: expected 1, 2 or 3")]
    UnsupportedRank(usize),

    /// A dimension that must be positive was zero.
    #[error("Zero-sized dimension: {0}")]
    ZeroDimension(String),

    /// Shape arrays or channel counts that do not agree with each other.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The derived output extent along a spatial axis is not positive.
    #[error("Non-positive output extent {value} on spatial axis {axis}")]
    EmptyOutput { axis: usize, value: i64 },

    /// A caller-supplied output shape disagrees with the derived one.
    #[error("Output shape mismatch: expected {expected:?}, got {got:?}")]
    OutputShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Pooling padding large enough to produce an empty window.
    #[error("Padding {padding} on spatial axis {axis} must be smaller than kernel extent {kernel}")]
    PaddingExceedsKernel {
        axis: usize,
        padding: usize,
        kernel: usize,
    },

    /// Channel block size that is zero, not a power of two, or too large.
    #[error("Invalid channel block size {0}: must be a power of two from 1 to 64")]
    InvalidBlockSize(usize),

    /// Thread pool construction failure.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Result type for parameter preparation.
pub type Result<T> = std::result::Result<T, KernelError>;

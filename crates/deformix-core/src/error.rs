//! Error types for transform operations.
//!
//! Configuration mistakes (a missing current transform, a malformed grid,
//! a parameter vector of the wrong length) are reported as errors. Points
//! that fall outside a B-spline support region are not errors; they are a
//! regular evaluation result.

use thiserror::Error;

/// Main error type for transform operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// A query was issued on a combination transform without a current transform.
    #[error("No current transform set in the combination transform")]
    NoCurrentTransform,

    /// The requested inverse does not exist or cannot be constructed.
    #[error("Unsupported inverse: {0}")]
    UnsupportedInverse(String),

    /// A parameter vector of the wrong length was supplied.
    #[error("Parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCountMismatch {
        expected: usize,
        actual: usize,
    },

    /// B-spline order outside the supported range.
    #[error("Invalid spline order {0}: supported orders are 1, 2 and 3")]
    InvalidSplineOrder(usize),

    /// Invalid control point grid definition.
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// A matrix that must be inverted is singular.
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// Mutation requested on a transform that is shared with other owners.
    #[error("Shared transform: {0}")]
    SharedTransform(String),

    /// Index past the end of a transform chain.
    #[error("Index {index} out of range for a chain of {len} transforms")]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor data could not be converted.
    #[error("Tensor error: {0}")]
    Tensor(String),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    /// Create an unsupported inverse error.
    pub fn unsupported_inverse(msg: impl Into<String>) -> Self {
        Self::UnsupportedInverse(msg.into())
    }

    /// Create an invalid grid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    /// Create a singular matrix error.
    pub fn singular_matrix(msg: impl Into<String>) -> Self {
        Self::SingularMatrix(msg.into())
    }

    /// Create a shared transform error.
    pub fn shared_transform(msg: impl Into<String>) -> Self {
        Self::SharedTransform(msg.into())
    }

    /// Create a tensor conversion error.
    pub fn tensor(msg: impl Into<String>) -> Self {
        Self::Tensor(msg.into())
    }

    /// Check a parameter vector length.
    pub fn check_parameter_count(expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(Self::ParameterCountMismatch { expected, actual });
        }
        Ok(())
    }
}

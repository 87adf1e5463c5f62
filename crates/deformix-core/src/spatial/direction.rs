//! Direction type for representing grid orientation.
//!
//! Column i of the direction matrix is the physical direction of grid axis i.

use nalgebra::SMatrix;
use serde::{Serialize, Deserialize};

/// Direction matrix representing the orientation of grid axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Create an identity direction matrix (no rotation).
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Create a direction from an nalgebra matrix.
    pub fn from_matrix(matrix: SMatrix<f64, D, D>) -> Self {
        Self(matrix)
    }

    /// Get the inner nalgebra matrix.
    pub fn matrix(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl<const D: usize> Default for Direction<D> {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let d = Direction::<3>::default();
        assert_eq!(*d.matrix(), SMatrix::<f64, 3, 3>::identity());
    }

    #[test]
    fn test_from_matrix_keeps_columns() {
        let d = Direction::<2>::from_matrix(SMatrix::<f64, 2, 2>::new(0.0, -1.0, 1.0, 0.0));
        assert_eq!(d.matrix()[(1, 0)], 1.0);
        assert_eq!(d.matrix()[(0, 1)], -1.0);
    }
}

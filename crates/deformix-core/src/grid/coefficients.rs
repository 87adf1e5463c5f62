//! Borrowed view of one coefficient field on a control point grid.

use crate::error::{Result, TransformError};
use super::GridGeometry;

/// Scalar coefficients of one output dimension, laid out on a grid.
///
/// The view borrows both the geometry and the values; it never copies.
#[derive(Debug, Clone, Copy)]
pub struct CoefficientGrid<'a, const D: usize> {
    geometry: &'a GridGeometry<D>,
    values: &'a [f64],
}

impl<'a, const D: usize> CoefficientGrid<'a, D> {
    /// Create a view, checking that the value count matches the grid.
    pub fn new(geometry: &'a GridGeometry<D>, values: &'a [f64]) -> Result<Self> {
        let expected = geometry.number_of_nodes();
        if values.len() != expected {
            return Err(TransformError::ShapeMismatch {
                expected: geometry.size().to_vec(),
                actual: vec![values.len()],
            });
        }
        Ok(Self { geometry, values })
    }

    /// Geometry of the grid.
    pub fn geometry(&self) -> &'a GridGeometry<D> {
        self.geometry
    }

    /// Raw coefficient buffer, axis 0 fastest.
    pub fn as_slice(&self) -> &'a [f64] {
        self.values
    }

    /// Coefficient at a grid node.
    pub fn value_at(&self, index: [usize; D]) -> Option<f64> {
        self.geometry.linear_offset(index).map(|offset| self.values[offset])
    }
}
